//! Experiment configuration.
//!
//! Handles YAML loading with per-field defaults and range validation. Every
//! count that drives the loop is checked up front so a run never starts with a
//! configuration it cannot honour.

use crate::error::ExperimentError;
use crate::metrics::{Metric, StatConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid metric type: {0}")]
    InvalidMetric(String),

    #[error(transparent)]
    Invalid(#[from] ExperimentError),
}

/// Active learning experiment configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentConfig {
    /// Random seed for reproducibility
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Seed training examples drawn per class
    #[serde(default = "default_initial_examples_per_class")]
    pub initial_examples_per_class: usize,
    /// Examples labeled per iteration (the cluster count N)
    #[serde(default = "default_examples_to_label")]
    pub examples_to_label_per_iteration: usize,
    /// Number of train/select cycles after initialization
    #[serde(default = "default_num_iterations")]
    pub num_iterations: usize,
    /// Candidates presampled before scoring and clustering
    #[serde(default = "default_presample_size")]
    pub presample_size: usize,
    /// Monte Carlo trials for the significance estimate
    #[serde(default = "default_monte_carlo_samples")]
    pub monte_carlo_samples: usize,
    /// Independent random-baseline replicates
    #[serde(default = "default_random_baseline_replicates")]
    pub random_baseline_replicates: usize,
    /// Worker threads for independent trials (0 = one per core)
    #[serde(default)]
    pub workers: usize,
    /// Fail instead of shrinking the batch when fewer than N candidates remain
    #[serde(default)]
    pub strict_batch_size: bool,
    /// Also exclude every presampled-but-unselected candidate from later cycles
    #[serde(default)]
    pub stricter_exclusion: bool,
    /// Metric used for the learning-curve comparison
    #[serde(default = "default_primary_metric")]
    pub primary_metric: Metric,
    /// Significance threshold
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Bootstrap resamples for confidence intervals
    #[serde(default = "default_bootstrap_n")]
    pub bootstrap_n: usize,
    /// Confidence level for intervals
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

const fn default_seed() -> u64 {
    42
}
const fn default_initial_examples_per_class() -> usize {
    20
}
const fn default_examples_to_label() -> usize {
    20
}
const fn default_num_iterations() -> usize {
    5
}
const fn default_presample_size() -> usize {
    1000
}
const fn default_monte_carlo_samples() -> usize {
    100
}
const fn default_random_baseline_replicates() -> usize {
    3
}
const fn default_primary_metric() -> Metric {
    Metric::Auc
}
const fn default_alpha() -> f64 {
    0.05
}
const fn default_bootstrap_n() -> usize {
    10_000
}
const fn default_confidence() -> f64 {
    0.95
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            initial_examples_per_class: default_initial_examples_per_class(),
            examples_to_label_per_iteration: default_examples_to_label(),
            num_iterations: default_num_iterations(),
            presample_size: default_presample_size(),
            monte_carlo_samples: default_monte_carlo_samples(),
            random_baseline_replicates: default_random_baseline_replicates(),
            workers: 0,
            strict_batch_size: false,
            stricter_exclusion: false,
            primary_metric: default_primary_metric(),
            alpha: default_alpha(),
            bootstrap_n: default_bootstrap_n(),
            confidence: default_confidence(),
        }
    }
}

impl ExperimentConfig {
    /// Load configuration from a YAML file and validate it
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string and validate it
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed or fails validation.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every option is in range
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` naming the first offending option.
    pub fn validate(&self) -> Result<(), ExperimentError> {
        let positive = [
            ("initial_examples_per_class", self.initial_examples_per_class),
            (
                "examples_to_label_per_iteration",
                self.examples_to_label_per_iteration,
            ),
            ("monte_carlo_samples", self.monte_carlo_samples),
            ("random_baseline_replicates", self.random_baseline_replicates),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ExperimentError::InvalidConfiguration(format!(
                    "{name} must be positive"
                )));
            }
        }

        if self.presample_size < self.examples_to_label_per_iteration {
            return Err(ExperimentError::InvalidConfiguration(format!(
                "presample_size ({}) must be at least examples_to_label_per_iteration ({})",
                self.presample_size, self.examples_to_label_per_iteration
            )));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(ExperimentError::InvalidConfiguration(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(ExperimentError::InvalidConfiguration(format!(
                "confidence must be in (0, 1), got {}",
                self.confidence
            )));
        }

        Ok(())
    }

    /// Seed training-set size (both classes)
    #[must_use]
    pub const fn seed_training_size(&self) -> usize {
        self.initial_examples_per_class * 2
    }

    /// Statistics settings derived from this configuration
    #[must_use]
    pub const fn stat_config(&self) -> StatConfig {
        StatConfig {
            bootstrap_n: self.bootstrap_n,
            confidence: self.confidence,
            alpha: self.alpha,
            seed: self.seed,
        }
    }
}
