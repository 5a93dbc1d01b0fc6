use crate::dataset::Dataset;
use ndarray::Array1;
use thiserror::Error;

/// One fitted weight per feature column, in `Dataset::feature_names` order.
pub type CoefficientVector = Array1<f64>;

/// Why a single fit could not produce coefficients.
#[derive(Error, Debug)]
pub enum FitError {
    #[error("The training data is degenerate: {0}")]
    Degenerate(String),

    #[error("A linear system solve failed. The design matrix may be singular. Error: {0}")]
    Singular(#[from] ndarray_linalg::error::LinalgError),

    #[error(
        "The fit did not converge within {max_iterations} iterations. Last coefficient change was {last_change:.6e}."
    )]
    NonConvergence {
        max_iterations: usize,
        last_change: f64,
    },

    #[error("{0}")]
    Other(String),
}

/// Fits a model to a dataset and reports its coefficient vector.
///
/// Implementations are called concurrently from every worker of a batch, each call
/// with its own resampled dataset, so `fit` takes `&self` and must start from a
/// fresh state every time. The dataset passed in always has exactly one response
/// column.
pub trait ModelFitter: Sync {
    fn fit(&self, dataset: &Dataset) -> Result<CoefficientVector, FitError>;
}

impl<F> ModelFitter for F
where
    F: Fn(&Dataset) -> Result<CoefficientVector, FitError> + Sync,
{
    fn fit(&self, dataset: &Dataset) -> Result<CoefficientVector, FitError> {
        self(dataset)
    }
}
