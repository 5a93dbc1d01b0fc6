//! # Replicate Executor
//!
//! Runs one resample-then-fit replicate and turns everything that can go wrong in
//! it into a value. A replicate never returns `Err` and never unwinds into its
//! caller: resampling errors, fit errors, panics inside the fitter and malformed
//! coefficient vectors all become `ReplicateOutcome::Failure` at that index.

use crate::dataset::Dataset;
use crate::fitter::{CoefficientVector, ModelFitter};
use crate::resample::{ReplicateSpec, resample};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

/// What a replicate produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicateOutcome {
    Success(CoefficientVector),
    Failure(FailureReason),
}

impl ReplicateOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn coefficients(&self) -> Option<&CoefficientVector> {
        match self {
            Self::Success(coefficients) => Some(coefficients),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            Self::Success(_) => None,
            Self::Failure(reason) => Some(reason),
        }
    }
}

/// Why a replicate failed. Messages are captured as text so outcomes stay
/// comparable and cloneable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FailureReason {
    #[error("resampling failed: {0}")]
    Resampling(String),

    #[error("model fit failed: {0}")]
    Fit(String),

    #[error("model fit panicked: {0}")]
    Panicked(String),

    #[error("model returned {found} coefficients for {expected} features")]
    ShapeMismatch { expected: usize, found: usize },
}

/// Executes replicate `spec` against `dataset` with `fitter`.
///
/// A panic inside the fitter is caught, but the process panic hook still runs
/// first. Under the default hook that prints a `thread '...' panicked` line to
/// stderr for every panicking replicate; callers that draw to the terminal should
/// install a quieter hook for the duration of the batch.
pub fn run_replicate<F>(dataset: &Dataset, fitter: &F, spec: ReplicateSpec) -> ReplicateOutcome
where
    F: ModelFitter + ?Sized,
{
    let sample = match resample(dataset, spec) {
        Ok(sample) => sample,
        Err(e) => return ReplicateOutcome::Failure(FailureReason::Resampling(e.to_string())),
    };

    // The fitter only sees its own sample, so nothing it could leave half-updated
    // during a panic is observed afterwards.
    let fitted = panic::catch_unwind(AssertUnwindSafe(|| fitter.fit(&sample)));

    match fitted {
        Ok(Ok(coefficients)) => {
            let expected = dataset.feature_count();
            if coefficients.len() == expected {
                ReplicateOutcome::Success(coefficients)
            } else {
                ReplicateOutcome::Failure(FailureReason::ShapeMismatch {
                    expected,
                    found: coefficients.len(),
                })
            }
        }
        Ok(Err(e)) => ReplicateOutcome::Failure(FailureReason::Fit(e.to_string())),
        Err(payload) => ReplicateOutcome::Failure(FailureReason::Panicked(panic_message(
            payload.as_ref(),
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
