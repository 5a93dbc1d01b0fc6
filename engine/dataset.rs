//! # Dataset
//!
//! The immutable, row-aligned view over a feature matrix and its response that every
//! other part of the engine consumes.
//!
//! - Row alignment: row `i` of the features and row `i` of the response always
//!   describe the same observation. Both matrices are stored as `[row_count, k]`
//!   arrays, so a column of either is one named variable.
//! - Immutability: fields are private and there are no mutating methods. Resampling
//!   produces a new `Dataset` rather than rearranging an existing one, which is what
//!   lets all workers share the caller's dataset by reference.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use std::collections::HashSet;
use thiserror::Error;

/// A validated feature matrix and response matrix with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    feature_names: Vec<String>,
    features: Array2<f64>,
    response_names: Vec<String>,
    response: Array2<f64>,
}

/// Violations of the dataset invariants, raised at construction time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatasetError {
    #[error("The feature matrix has {found} columns, but {expected} feature names were supplied.")]
    FeatureNameCount { expected: usize, found: usize },

    #[error(
        "The response matrix has {found} columns, but {expected} response names were supplied."
    )]
    ResponseNameCount { expected: usize, found: usize },

    #[error(
        "The feature matrix has {features} rows but the response has {response} rows. Every column must have the same length."
    )]
    MismatchedRowCounts { features: usize, response: usize },

    #[error("Column '{column}' has {found} values, but the dataset has {expected} rows.")]
    ColumnLength {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("Column name '{0}' appears more than once.")]
    DuplicateColumn(String),

    #[error("Column '{0}' is used as both a feature and a response.")]
    OverlappingColumn(String),
}

impl Dataset {
    /// Builds a dataset from matrices of shape `[row_count, n_features]` and
    /// `[row_count, n_responses]`.
    pub fn new(
        feature_names: Vec<String>,
        features: Array2<f64>,
        response_names: Vec<String>,
        response: Array2<f64>,
    ) -> Result<Self, DatasetError> {
        if features.ncols() != feature_names.len() {
            return Err(DatasetError::FeatureNameCount {
                expected: feature_names.len(),
                found: features.ncols(),
            });
        }
        if response.ncols() != response_names.len() {
            return Err(DatasetError::ResponseNameCount {
                expected: response_names.len(),
                found: response.ncols(),
            });
        }
        if features.nrows() != response.nrows() {
            return Err(DatasetError::MismatchedRowCounts {
                features: features.nrows(),
                response: response.nrows(),
            });
        }

        let mut feature_set = HashSet::with_capacity(feature_names.len());
        for name in &feature_names {
            if !feature_set.insert(name.as_str()) {
                return Err(DatasetError::DuplicateColumn(name.clone()));
            }
        }
        let mut response_set = HashSet::with_capacity(response_names.len());
        for name in &response_names {
            if feature_set.contains(name.as_str()) {
                return Err(DatasetError::OverlappingColumn(name.clone()));
            }
            if !response_set.insert(name.as_str()) {
                return Err(DatasetError::DuplicateColumn(name.clone()));
            }
        }

        Ok(Self {
            feature_names,
            features,
            response_names,
            response,
        })
    }

    /// Builds a dataset from named columns. Every column must have the same length.
    pub fn from_columns(
        features: Vec<(String, Vec<f64>)>,
        response: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, DatasetError> {
        let row_count = features
            .first()
            .or_else(|| response.first())
            .map_or(0, |(_, values)| values.len());

        for (name, values) in features.iter().chain(response.iter()) {
            if values.len() != row_count {
                return Err(DatasetError::ColumnLength {
                    column: name.clone(),
                    expected: row_count,
                    found: values.len(),
                });
            }
        }

        let (feature_names, feature_matrix) = stack_columns(features, row_count);
        let (response_names, response_matrix) = stack_columns(response, row_count);
        Self::new(
            feature_names,
            feature_matrix,
            response_names,
            response_matrix,
        )
    }

    pub fn row_count(&self) -> usize {
        self.features.nrows()
    }

    pub fn feature_count(&self) -> usize {
        self.features.ncols()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn response_names(&self) -> &[String] {
        &self.response_names
    }

    /// The feature matrix, shape `[row_count, feature_count]`.
    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    /// The response matrix, shape `[row_count, response_names().len()]`.
    pub fn response(&self) -> ArrayView2<'_, f64> {
        self.response.view()
    }

    /// Looks up a feature column by name.
    pub fn feature(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.feature_names
            .iter()
            .position(|n| n == name)
            .map(|j| self.features.column(j))
    }

    /// The response as a vector, when the dataset has exactly one response column.
    pub fn response_vector(&self) -> Option<ArrayView1<'_, f64>> {
        if self.response.ncols() == 1 {
            Some(self.response.column(0))
        } else {
            None
        }
    }

    /// Gathers the given rows, in order and with repetition, into a new dataset.
    /// Callers guarantee every index is below `row_count`.
    pub(crate) fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            features: self.features.select(Axis(0), rows),
            response_names: self.response_names.clone(),
            response: self.response.select(Axis(0), rows),
        }
    }
}

fn stack_columns(columns: Vec<(String, Vec<f64>)>, row_count: usize) -> (Vec<String>, Array2<f64>) {
    let matrix = Array2::from_shape_fn((row_count, columns.len()), |(i, j)| columns[j].1[i]);
    let names = columns.into_iter().map(|(name, _)| name).collect();
    (names, matrix)
}
