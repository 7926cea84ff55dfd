//! Seeded Gaussian-mixture data for binary classification.
//!
//! Each class is a mixture of `clusters_per_class` isotropic Gaussians. Class
//! centers sit at `±class_separation / 2` on the first axis; the clusters of a
//! class are spread `cluster_spacing` apart along the second axis. All other
//! dimensions carry pure noise.

use crate::data::{Dataset, Example, ExampleId, Features, Label};
use crate::error::{ExperimentError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Parameters of the generated mixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// Number of examples, split evenly between the classes
    pub n_examples: usize,
    /// Feature dimension (at least 1)
    pub dim: usize,
    /// Gaussian clusters per class
    pub clusters_per_class: usize,
    /// Distance between the class centers on the first axis
    pub class_separation: f64,
    /// Distance between neighbouring cluster centers on the second axis
    pub cluster_spacing: f64,
    /// Standard deviation of every coordinate
    pub noise: f64,
    /// First example id; ids are consecutive from here
    pub id_offset: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            n_examples: 1000,
            dim: 2,
            clusters_per_class: 2,
            class_separation: 4.0,
            cluster_spacing: 8.0,
            noise: 1.0,
            id_offset: 0,
        }
    }
}

impl SyntheticConfig {
    fn validate(&self) -> Result<()> {
        if self.dim == 0 || self.clusters_per_class == 0 {
            return Err(ExperimentError::InvalidConfiguration(
                "synthetic data needs dim > 0 and clusters_per_class > 0".to_string(),
            ));
        }
        if !(self.noise.is_finite() && self.noise >= 0.0) {
            return Err(ExperimentError::InvalidConfiguration(format!(
                "noise must be a finite non-negative number, got {}",
                self.noise
            )));
        }
        Ok(())
    }

    /// Center of cluster `cluster` of `label`
    #[allow(clippy::cast_precision_loss)]
    fn center(&self, label: Label, cluster: usize) -> Vec<f64> {
        let mut center = vec![0.0; self.dim];
        center[0] = match label {
            Label::Negative => -self.class_separation / 2.0,
            Label::Positive => self.class_separation / 2.0,
        };
        if self.dim > 1 {
            let mid = (self.clusters_per_class - 1) as f64 / 2.0;
            center[1] = (cluster as f64 - mid) * self.cluster_spacing;
        }
        center
    }
}

/// Standard normal draw via the Box–Muller transform
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Generate a dataset. Labels alternate 0, 1, 0, ... and clusters cycle within
/// each class, so class and cluster sizes differ by at most one.
///
/// # Errors
///
/// Returns `InvalidConfiguration` for a zero dimension, zero clusters or
/// negative noise.
pub fn generate(config: &SyntheticConfig, seed: u64) -> Result<Dataset> {
    config.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let examples = (0..config.n_examples)
        .map(|i| {
            let label = Label::ALL[i % 2];
            let cluster = (i / 2) % config.clusters_per_class;
            let values = config
                .center(label, cluster)
                .into_iter()
                .map(|c| config.noise.mul_add(standard_normal(&mut rng), c))
                .collect();
            Example::new(
                ExampleId(config.id_offset + i as u64),
                Features::new(values),
                label,
            )
        })
        .collect();

    Dataset::from_examples(examples)
        .map_err(|e| ExperimentError::InvalidInput(format!("generated dataset is invalid: {e}")))
}
