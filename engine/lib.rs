#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

// Core resampling engine, leaves first.
pub mod dataset;
pub mod resample;
pub mod fitter;
pub mod replicate;
pub mod parallel;
pub mod results;

// Caller-side tooling built on the core.
pub mod config;
pub mod data;
pub mod models;
pub mod progress;
pub mod summary;

pub use dataset::{Dataset, DatasetError};
pub use fitter::{CoefficientVector, FitError, ModelFitter};
pub use parallel::{
    BootstrapConfig, DEFAULT_BASE_SEED, EngineError, run_batch, run_batch_with_progress,
};
pub use replicate::{FailureReason, ReplicateOutcome, run_replicate};
pub use resample::{ReplicateSpec, ResamplingError, resample};
pub use results::ResultMatrix;
