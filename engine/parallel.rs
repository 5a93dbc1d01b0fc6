//! # Parallel Engine
//!
//! Fans a batch of bootstrap replicates out over a bounded worker pool and gathers
//! the outcomes back in replicate order.
//!
//! - Reproducibility: replicate `i` always uses seed `base_seed + i`. Which worker
//!   runs it, and when, has no effect on its sample or its outcome, so a batch
//!   gives identical results at every pool size.
//! - Ordering: replicates are dispatched as an indexed parallel iterator and
//!   collected into a `Vec`, which places every outcome at its own index no matter
//!   the completion order.
//! - Bounded resources: the pool is built with exactly the resolved worker count,
//!   so at most that many fits are in flight, however large the batch.
//! - Failure policy: validation problems abort before any replicate runs. Once the
//!   batch starts, it always runs to completion; failed replicates are recorded at
//!   their index and never retried.

use crate::dataset::Dataset;
use crate::fitter::ModelFitter;
use crate::progress::{BatchProgressObserver, NoopBatchProgress};
use crate::replicate::{ReplicateOutcome, run_replicate};
use crate::resample::{ReplicateSpec, ResamplingError, validate_resample_input};
use crate::results::ResultMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

/// Seed of replicate 0 when the caller does not choose one.
pub const DEFAULT_BASE_SEED: u64 = 0;

/// Number of replicates in a batch when the caller does not choose one.
pub const DEFAULT_REPLICATES: usize = 1000;

/// Batch-level settings for one bootstrap run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Number of replicates, `B`. Must be at least 1.
    pub replicates: usize,
    /// Size of the worker pool. 0 means one worker per available CPU.
    pub workers: usize,
    /// Seed of replicate 0; replicate `i` uses `base_seed + i`.
    pub base_seed: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            replicates: DEFAULT_REPLICATES,
            workers: 0,
            base_seed: DEFAULT_BASE_SEED,
        }
    }
}

impl BootstrapConfig {
    pub fn new(replicates: usize) -> Self {
        Self {
            replicates,
            ..Self::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_base_seed(mut self, base_seed: u64) -> Self {
        self.base_seed = base_seed;
        self
    }

    /// The number of worker threads a batch under this config will use.
    pub fn resolved_workers(&self) -> usize {
        let requested = if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        };
        requested.min(self.replicates).max(1)
    }

    /// The specs of every replicate in the batch, in index order.
    pub fn replicate_specs(&self) -> impl Iterator<Item = ReplicateSpec> + '_ {
        (0..self.replicates).map(|index| ReplicateSpec::for_index(index, self.base_seed))
    }
}

/// Errors that stop a batch before any replicate is dispatched.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("The dataset cannot be resampled: {0}")]
    Resampling(#[from] ResamplingError),

    #[error("Failed to build the worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Runs a bootstrap batch: `config.replicates` resample-then-fit replicates on a
/// pool of `config.workers` threads.
pub fn run_batch<F>(
    dataset: &Dataset,
    fitter: &F,
    config: &BootstrapConfig,
) -> Result<ResultMatrix, EngineError>
where
    F: ModelFitter + ?Sized,
{
    run_batch_with_progress(dataset, fitter, config, &NoopBatchProgress)
}

/// [`run_batch`], reporting each finished replicate to `progress`.
pub fn run_batch_with_progress<F, P>(
    dataset: &Dataset,
    fitter: &F,
    config: &BootstrapConfig,
    progress: &P,
) -> Result<ResultMatrix, EngineError>
where
    F: ModelFitter + ?Sized,
    P: BatchProgressObserver + ?Sized,
{
    // --- 1. Validate before dispatching anything ---
    if config.replicates == 0 {
        return Err(EngineError::InvalidArgument(
            "the number of bootstrap replicates must be at least 1, got 0".to_string(),
        ));
    }
    validate_resample_input(dataset)?;

    // --- 2. Build the bounded pool ---
    let workers = config.resolved_workers();
    log::trace!(
        "Requested {} workers, resolved to {} for {} replicates",
        config.workers,
        workers,
        config.replicates
    );
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("bootfit-worker-{i}"))
        .build()?;

    log::info!(
        "Starting bootstrap batch: {} replicates of {} rows x {} features on {} workers (base seed {})",
        config.replicates,
        dataset.row_count(),
        dataset.feature_count(),
        workers,
        config.base_seed
    );
    let start = Instant::now();
    progress.on_batch_start(config.replicates);

    // --- 3. Dispatch and collect in index order ---
    let base_seed = config.base_seed;
    let outcomes: Vec<ReplicateOutcome> = pool.install(|| {
        (0..config.replicates)
            .into_par_iter()
            .map(|index| {
                let spec = ReplicateSpec::for_index(index, base_seed);
                let outcome = run_replicate(dataset, fitter, spec);
                if let ReplicateOutcome::Failure(reason) = &outcome {
                    log::debug!("Replicate {} (seed {}) failed: {}", index, spec.seed, reason);
                }
                progress.on_replicate_finish(index, outcome.is_success());
                outcome
            })
            .collect()
    });

    let matrix = ResultMatrix::new(dataset.feature_names().to_vec(), base_seed, outcomes);
    let failures = matrix.failure_count();
    progress.on_batch_finish(failures);

    if failures > 0 {
        log::warn!(
            "{} of {} bootstrap replicates failed and are excluded from the successes.",
            failures,
            matrix.len()
        );
    }
    log::info!(
        "Bootstrap batch finished in {:.2?}: {} succeeded, {} failed",
        start.elapsed(),
        matrix.success_count(),
        failures
    );

    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitter::{CoefficientVector, FitError};
    use crate::replicate::FailureReason;
    use crate::resample::resample;
    use ndarray::{Array2, Axis};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn dataset(n: usize) -> Dataset {
        let x1: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let x2: Vec<f64> = (0..n).map(|i| ((i * 7) % 11) as f64).collect();
        let y: Vec<f64> = (0..n).map(|i| (i % 2) as f64).collect();
        Dataset::from_columns(
            vec![("x1".to_string(), x1), ("x2".to_string(), x2)],
            vec![("y".to_string(), y)],
        )
        .unwrap()
    }

    fn means(ds: &Dataset) -> Result<CoefficientVector, FitError> {
        ds.features()
            .mean_axis(Axis(0))
            .ok_or_else(|| FitError::Degenerate("empty sample".to_string()))
    }

    #[test]
    fn zero_replicates_is_an_invalid_argument() {
        let err = run_batch(&dataset(5), &means, &BootstrapConfig::new(0)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn multi_column_response_fails_before_dispatch() {
        let ds = Dataset::new(
            vec!["x".to_string()],
            Array2::zeros((4, 1)),
            vec!["y1".to_string(), "y2".to_string()],
            Array2::zeros((4, 2)),
        )
        .unwrap();
        let calls = AtomicUsize::new(0);
        let counting = |d: &Dataset| {
            calls.fetch_add(1, Ordering::SeqCst);
            means(d)
        };
        let err = run_batch(&ds, &counting, &BootstrapConfig::new(3)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Resampling(ResamplingError::ResponseColumnCount { found: 2 })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn results_do_not_depend_on_pool_size() {
        let ds = dataset(40);
        let base = BootstrapConfig::new(64).with_base_seed(17);
        let serial = run_batch(&ds, &means, &base.with_workers(1)).unwrap();
        let parallel = run_batch(&ds, &means, &base.with_workers(4)).unwrap();
        let all = run_batch(&ds, &means, &base).unwrap();
        assert_eq!(serial, parallel);
        assert_eq!(serial, all);
    }

    #[test]
    fn every_index_matches_its_seed() {
        let ds = dataset(30);
        let config = BootstrapConfig::new(12).with_workers(3).with_base_seed(100);
        let matrix = run_batch(&ds, &means, &config).unwrap();

        assert_eq!(matrix.len(), 12);
        for spec in config.replicate_specs() {
            assert_eq!(spec.seed, 100 + spec.index as u64);
            assert_eq!(matrix.seed_of(spec.index), spec.seed);
            let expected = means(&resample(&ds, spec).unwrap()).unwrap();
            assert_eq!(matrix.get(spec.index).unwrap().coefficients(), Some(&expected));
        }
    }

    #[test]
    fn one_failing_seed_leaves_the_rest_untouched() {
        let ds = dataset(30);
        let config = BootstrapConfig::new(10).with_workers(4);
        let poisoned = resample(&ds, ReplicateSpec::for_index(6, config.base_seed)).unwrap();
        let fragile = move |d: &Dataset| {
            if *d == poisoned {
                Err(FitError::Other("refusing seed 6".to_string()))
            } else {
                means(d)
            }
        };

        let clean = run_batch(&ds, &means, &config).unwrap();
        let matrix = run_batch(&ds, &fragile, &config).unwrap();

        assert_eq!(matrix.len(), 10);
        assert_eq!(matrix.failure_count(), 1);
        assert_eq!(matrix.successes().len(), 9);
        assert_eq!(
            matrix.get(6).unwrap().failure(),
            Some(&FailureReason::Fit("refusing seed 6".to_string()))
        );
        for i in (0..10).filter(|&i| i != 6) {
            assert_eq!(matrix.get(i), clean.get(i));
        }
    }

    #[test]
    fn concurrent_fits_never_exceed_the_worker_count() {
        let ds = dataset(20);
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let slow = |d: &Dataset| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            active.fetch_sub(1, Ordering::SeqCst);
            means(d)
        };

        let matrix = run_batch(&ds, &slow, &BootstrapConfig::new(40).with_workers(2)).unwrap();
        assert_eq!(matrix.success_count(), 40);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn progress_sees_every_replicate_once() {
        struct Counter {
            started: AtomicUsize,
            finished: AtomicUsize,
            failures: AtomicUsize,
        }
        impl BatchProgressObserver for Counter {
            fn on_batch_start(&self, total_replicates: usize) {
                self.started.store(total_replicates, Ordering::SeqCst);
            }
            fn on_replicate_finish(&self, index: usize, succeeded: bool) {
                let _ = (index, succeeded);
                self.finished.fetch_add(1, Ordering::SeqCst);
            }
            fn on_batch_finish(&self, failures: usize) {
                self.failures.store(failures, Ordering::SeqCst);
            }
        }

        let counter = Counter {
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            failures: AtomicUsize::new(usize::MAX),
        };
        run_batch_with_progress(&dataset(10), &means, &BootstrapConfig::new(25), &counter)
            .unwrap();
        assert_eq!(counter.started.load(Ordering::SeqCst), 25);
        assert_eq!(counter.finished.load(Ordering::SeqCst), 25);
        assert_eq!(counter.failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn single_replicate_batch() {
        let matrix = run_batch(&dataset(8), &means, &BootstrapConfig::new(1)).unwrap();
        assert_eq!(matrix.len(), 1);
        assert!(matrix.get(0).unwrap().is_success());
    }

    #[test]
    fn worker_resolution() {
        assert_eq!(BootstrapConfig::new(10).with_workers(3).resolved_workers(), 3);
        assert_eq!(BootstrapConfig::new(2).with_workers(8).resolved_workers(), 2);
        assert!(BootstrapConfig::new(1000).resolved_workers() >= 1);
    }
}
