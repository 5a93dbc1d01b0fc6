//! # Resampler
//!
//! Draws one bootstrap sample of a dataset. The generator is seeded from the
//! replicate's seed and nothing else, so the sample for a given index is the same
//! on every run, on any worker, at any pool size.

use crate::dataset::Dataset;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// Identifies one replicate of a batch and the seed its sample is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicateSpec {
    pub index: usize,
    pub seed: u64,
}

impl ReplicateSpec {
    /// The spec for replicate `index` of a batch started at `base_seed`.
    pub fn for_index(index: usize, base_seed: u64) -> Self {
        Self {
            index,
            seed: base_seed.wrapping_add(index as u64),
        }
    }
}

/// The dataset handed to the resampler cannot back a single-target fit.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResamplingError {
    #[error("The dataset must have exactly one response column, but it has {found}.")]
    ResponseColumnCount { found: usize },
}

/// Checks the resampler's input contract without drawing anything.
pub fn validate_resample_input(dataset: &Dataset) -> Result<(), ResamplingError> {
    let found = dataset.response_names().len();
    if found != 1 {
        return Err(ResamplingError::ResponseColumnCount { found });
    }
    Ok(())
}

/// Draws `row_count` row indices uniformly with replacement from `[0, row_count)`.
///
/// Indices are sampled as `u64` so that a seed picks the same rows on 32-bit and
/// 64-bit targets.
pub fn draw_row_indices(row_count: usize, seed: u64) -> Vec<usize> {
    if row_count == 0 {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let upper = row_count as u64;
    (0..row_count)
        .map(|_| rng.gen_range(0..upper) as usize)
        .collect()
}

/// Builds the bootstrap sample for `spec`: the rows picked by
/// [`draw_row_indices`], taken with repetition from both features and response.
pub fn resample(dataset: &Dataset, spec: ReplicateSpec) -> Result<Dataset, ResamplingError> {
    validate_resample_input(dataset)?;
    let rows = draw_row_indices(dataset.row_count(), spec.seed);
    Ok(dataset.select_rows(&rows))
}
