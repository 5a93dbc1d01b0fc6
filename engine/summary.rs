//! # Coefficient Summary
//!
//! Post-processing of a finished batch into the numbers the bootstrap is usually
//! run for: the bootstrap mean, standard error and percentile confidence interval
//! of each coefficient. Only successful replicates contribute.

use crate::results::ResultMatrix;
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use std::io::Write;
use thiserror::Error;

/// Bootstrap statistics for one feature's coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientSummary {
    pub name: String,
    pub mean: f64,
    /// Sample standard deviation of the replicate coefficients (denominator `n - 1`).
    pub std_error: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    /// Number of successful replicates the statistics were computed from.
    pub replicates: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SummaryError {
    #[error("No bootstrap replicate succeeded, so there is nothing to summarize.")]
    NoSuccessfulReplicates,

    #[error("The confidence level must lie strictly between 0 and 1, got {0}.")]
    InvalidConfidence(f64),
}

/// Summarizes every coefficient of `matrix` at the given two-sided confidence level
/// (e.g. `0.95`).
pub fn summarize(
    matrix: &ResultMatrix,
    confidence: f64,
) -> Result<Vec<CoefficientSummary>, SummaryError> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(SummaryError::InvalidConfidence(confidence));
    }
    let draws = matrix.to_array();
    let n = draws.nrows();
    if n == 0 {
        return Err(SummaryError::NoSuccessfulReplicates);
    }

    let alpha = 1.0 - confidence;
    let summaries = matrix
        .feature_names()
        .iter()
        .zip(draws.axis_iter(Axis(1)))
        .map(|(name, column)| {
            let mean = column.sum() / n as f64;
            let std_error = if n > 1 { column.std(1.0) } else { 0.0 };
            let mut sorted = column.to_vec();
            sorted.sort_by(f64::total_cmp);
            CoefficientSummary {
                name: name.clone(),
                mean,
                std_error,
                ci_lower: percentile(&sorted, alpha / 2.0),
                ci_upper: percentile(&sorted, 1.0 - alpha / 2.0),
                replicates: n,
            }
        })
        .collect();
    Ok(summaries)
}

/// Quantile `q` of ascending `sorted`, linearly interpolated between order
/// statistics.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        len => {
            let position = q.clamp(0.0, 1.0) * (len - 1) as f64;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            let weight = position - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * weight
        }
    }
}

/// Writes the summary as a tab-separated table with a header row.
pub fn write_summary_tsv<W: Write>(
    summaries: &[CoefficientSummary],
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    wtr.write_record(["feature", "mean", "std_error", "ci_lower", "ci_upper", "replicates"])?;
    for s in summaries {
        wtr.write_record([
            s.name.clone(),
            s.mean.to_string(),
            s.std_error.to_string(),
            s.ci_lower.to_string(),
            s.ci_upper.to_string(),
            s.replicates.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
