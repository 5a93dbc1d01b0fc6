use crate::dataset::Dataset;
use crate::fitter::{CoefficientVector, FitError, ModelFitter};
use crate::models::{LinearRegression, LogisticRegression};
use crate::parallel::BootstrapConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Default two-sided confidence level of the summary intervals.
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// Which built-in estimator a run fits, with its settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimatorSpec {
    Linear(LinearRegression),
    Logistic(LogisticRegression),
}

impl Default for EstimatorSpec {
    fn default() -> Self {
        Self::Linear(LinearRegression::default())
    }
}

impl ModelFitter for EstimatorSpec {
    fn fit(&self, dataset: &Dataset) -> Result<CoefficientVector, FitError> {
        match self {
            Self::Linear(model) => model.fit(dataset),
            Self::Logistic(model) => model.fit(dataset),
        }
    }
}

/// Everything a bootstrap run needs besides the data, as stored in a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub confidence: f64,
    pub bootstrap: BootstrapConfig,
    pub model: EstimatorSpec,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            bootstrap: BootstrapConfig::default(),
            model: EstimatorSpec::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl RunConfig {
    /// Checks the settings that would otherwise only fail once a run has started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bootstrap.replicates == 0 {
            return Err(ConfigError::Invalid(
                "bootstrap.replicates must be at least 1".to_string(),
            ));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "confidence must lie strictly between 0 and 1, got {}",
                self.confidence
            )));
        }
        if let EstimatorSpec::Logistic(model) = &self.model {
            if model.max_iterations == 0 {
                return Err(ConfigError::Invalid(
                    "model.max_iterations must be at least 1".to_string(),
                ));
            }
            if model.l2_penalty < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "model.l2_penalty must be non-negative, got {}",
                    model.l2_penalty
                )));
            }
        }
        Ok(())
    }

    /// Saves the config in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads and validates a config from a TOML file. Missing keys take defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }
}
