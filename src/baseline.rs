//! Random-selection baseline.
//!
//! Replays the active run's training-size trajectory, growing the seed set with
//! uniformly random pool examples instead of selected ones. Within a replicate
//! the draws are nested: the examples added to reach size `s` are a prefix of
//! those added to reach any larger size.

use crate::config::ExperimentConfig;
use crate::data::Example;
use crate::error::{ExperimentError, Result};
use crate::metrics::{compute_mean, Metric, PerformanceRecord};
use crate::model::{Evaluator, Trainer};
use crate::parallel::{draw_random, fork_seeds, run_trials};
use rand::RngCore;
use serde::Serialize;
use tracing::{debug, info};

/// Learning curve of one replicate, one record per trajectory size
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaselineReplicate {
    pub replicate: usize,
    pub curve: Vec<PerformanceRecord>,
}

/// All replicates for one trajectory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaselineCurves {
    pub ts_sizes: Vec<usize>,
    pub replicates: Vec<BaselineReplicate>,
}

impl BaselineCurves {
    /// Mean of `metric` across replicates at each trajectory size
    #[must_use]
    pub fn mean_curve(&self, metric: Metric) -> Vec<f64> {
        (0..self.ts_sizes.len())
            .map(|step| {
                let values: Vec<f64> = self
                    .replicates
                    .iter()
                    .filter_map(|r| r.curve.get(step).and_then(|p| p.get(metric)))
                    .collect();
                compute_mean(&values)
            })
            .collect()
    }
}

/// Runs independent random-growth replicates
pub struct RandomBaseline<'a, T, E> {
    trainer: &'a T,
    evaluator: &'a E,
    replicates: usize,
    workers: usize,
}

impl<'a, T, E> RandomBaseline<'a, T, E>
where
    T: Trainer,
    E: Evaluator<T::Model>,
{
    #[must_use]
    pub const fn new(trainer: &'a T, evaluator: &'a E, replicates: usize, workers: usize) -> Self {
        Self {
            trainer,
            evaluator,
            replicates,
            workers,
        }
    }

    #[must_use]
    pub const fn from_config(config: &ExperimentConfig, trainer: &'a T, evaluator: &'a E) -> Self {
        Self::new(
            trainer,
            evaluator,
            config.random_baseline_replicates,
            config.workers,
        )
    }

    /// Run every replicate over `ts_sizes`.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if there are no replicates or no sizes.
    /// - `InsufficientData` if a size is below the seed size or above seed
    ///   plus pool.
    /// - The first failing replicate's training or evaluation error.
    pub fn run<R: RngCore + ?Sized>(
        &self,
        seed_training: &[Example],
        pool: &[Example],
        test: &[Example],
        ts_sizes: &[usize],
        rng: &mut R,
    ) -> Result<BaselineCurves> {
        if self.replicates == 0 {
            return Err(ExperimentError::InvalidInput(
                "at least one baseline replicate is required".to_string(),
            ));
        }
        if ts_sizes.is_empty() {
            return Err(ExperimentError::InvalidInput(
                "training-size trajectory is empty".to_string(),
            ));
        }
        let seed_size = seed_training.len();
        let max_size = seed_size + pool.len();
        if let Some(&bad) = ts_sizes.iter().find(|&&s| s < seed_size || s > max_size) {
            return Err(ExperimentError::InsufficientData(format!(
                "training size {bad} is outside the reachable range {seed_size}..={max_size}"
            )));
        }
        let max_added = ts_sizes.iter().max().map_or(0, |&s| s - seed_size);

        info!(
            replicates = self.replicates,
            sizes = ts_sizes.len(),
            "Running random baseline"
        );

        let seeds = fork_seeds(rng, self.replicates);
        let replicates = run_trials(self.workers, &seeds, |replicate, rng| {
            let order = draw_random(pool, max_added, rng)?;
            let mut curve = Vec::with_capacity(ts_sizes.len());
            for &size in ts_sizes {
                let mut training = seed_training.to_vec();
                training.extend(order[..size - seed_size].iter().map(|&e| e.clone()));
                let model = self.trainer.fit(&training)?;
                curve.push(self.evaluator.evaluate(&model, test, size)?);
            }
            debug!(replicate, "Baseline replicate done");
            Ok(BaselineReplicate { replicate, curve })
        })?;

        Ok(BaselineCurves {
            ts_sizes: ts_sizes.to_vec(),
            replicates,
        })
    }
}
