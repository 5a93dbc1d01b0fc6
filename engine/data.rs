//! # Data Loading and Validation Module
//!
//! Reads a prepared, fully numeric tab-separated table and turns it into a
//! `Dataset` for the bootstrap engine. Encoding of categorical variables happens
//! upstream; by the time a file reaches this module every selected column must
//! already be a number.
//!
//! - Flexible Schema: the response column is named by the caller. Features are
//!   either an explicit list or every other column, in file order.
//! - User-Centric Errors: failures are assumed to be user-input errors, and the
//!   `DataError` enum names the offending column wherever it can.
//! - Performance: the file is parsed once with the `polars` CSV reader and only the
//!   selected columns are converted to `f64`.

use crate::dataset::{Dataset, DatasetError};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),

    #[error(
        "The column '{column_name}' could not be converted to the expected type '{expected_type}'. It contains non-numeric data. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },

    #[error(
        "Missing or null values were found in the column '{0}'. Bootstrap resampling requires complete data with no missing values."
    )]
    MissingValuesFound(String),

    #[error(
        "A non-finite value (NaN or Infinity) was found in column '{column_name}' at data row {row}. All values must be finite."
    )]
    NonFiniteValuesFound { column_name: String, row: usize },

    #[error("The input file contains no data rows.")]
    NoRows,

    #[error("No feature columns were selected.")]
    NoFeatures,

    #[error("The selected columns do not form a valid dataset: {0}")]
    InvalidDataset(#[from] DatasetError),
}

/// Loads a tab-separated file with a header row.
///
/// `features = None` selects every column except `response`, in file order.
pub fn load_dataset(
    path: &Path,
    response: &str,
    features: Option<&[String]>,
) -> Result<Dataset, DataError> {
    log::info!("Loading data from '{}'", path.display());

    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;

    if df.height() == 0 {
        return Err(DataError::NoRows);
    }

    let file_columns: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    let present: HashSet<&str> = file_columns.iter().map(String::as_str).collect();

    if !present.contains(response) {
        return Err(DataError::ColumnNotFound(response.to_string()));
    }

    let feature_names: Vec<String> = match features {
        Some(selected) => {
            for name in selected {
                if !present.contains(name.as_str()) {
                    return Err(DataError::ColumnNotFound(name.clone()));
                }
            }
            selected.to_vec()
        }
        None => file_columns
            .iter()
            .filter(|name| name.as_str() != response)
            .cloned()
            .collect(),
    };
    if feature_names.is_empty() {
        return Err(DataError::NoFeatures);
    }

    let mut feature_columns = Vec::with_capacity(feature_names.len());
    for name in feature_names {
        let values = numeric_column(&df, &name)?;
        feature_columns.push((name, values));
    }
    let response_column = vec![(response.to_string(), numeric_column(&df, response)?)];

    let dataset = Dataset::from_columns(feature_columns, response_column)?;
    log::info!(
        "Loaded {} rows with {} features and response '{}'",
        dataset.row_count(),
        dataset.feature_count(),
        response
    );
    Ok(dataset)
}

/// Reads one selected column as `f64`, in row order.
///
/// Integer and boolean columns widen to `f64`. A text column either fails the
/// cast or comes back with nulls in the cells that were not numbers; both count
/// as the wrong type. Non-finite values are reported with the first data row
/// (1-based, header excluded) that holds one.
fn numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let column = df.column(column_name)?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }

    let as_float = column
        .cast(&DataType::Float64)
        .ok()
        .filter(|cast| cast.null_count() == 0)
        .ok_or_else(|| DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", column.dtype()),
        })?;

    let chunked = as_float.f64()?.rechunk();
    let values: Vec<f64> = chunked.into_no_null_iter().collect();
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(DataError::NonFiniteValuesFound {
            column_name: column_name.to_string(),
            row: index + 1,
        }),
        None => Ok(values),
    }
}
