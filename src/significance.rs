//! Monte Carlo significance of active over random selection.
//!
//! With `N = final_training_size - seed_training_size`, each of `T` trials draws
//! `N` random pool examples, appends them to the seed set, retrains and
//! evaluates. For every metric the empirical p-value is the fraction of trials
//! that match or beat the active model:
//!
//! ```text
//! p = #{ t : metric(trial t) >= metric(active) } / T
//! ```
//!
//! Per-metric decisions use a Bonferroni-corrected threshold. The learning
//! curves of the active run and the random baseline are compared separately
//! with a paired t-test.

use crate::config::ExperimentConfig;
use crate::data::Example;
use crate::error::{ExperimentError, Result};
use crate::metrics::{
    bonferroni_correction, paired_t_test, AggregatedMetric, Metric, MetricsCollector,
    PerformanceRecord, SignificanceResult, StatConfig,
};
use crate::model::{Evaluator, Trainer};
use crate::parallel::{draw_random, fork_seeds, run_trials};
use rand::RngCore;
use serde::Serialize;
use tracing::{debug, info};

/// Fraction of `trials` whose value is greater than or equal to `active`.
///
/// `samples` holds the values of the trials that reported the metric; trials
/// without a value count as below `active`. Ties count towards the p-value.
/// Returns 1.0 when no trial was run.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn empirical_p_value(samples: &[f64], active: f64, trials: usize) -> f64 {
    let trials = trials.max(samples.len());
    if trials == 0 {
        return 1.0;
    }
    let at_least = samples.iter().filter(|&&s| s >= active).count();
    at_least as f64 / trials as f64
}

/// Significance of one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSignificance {
    pub metric: Metric,
    /// Value reached by the actively trained model
    pub active: f64,
    /// Random trials summarised, with a bootstrap CI of their mean
    pub random: AggregatedMetric,
    pub p_value: f64,
    /// Mean of (random - active) over trials
    pub mean_difference: f64,
    /// `p_value` below the corrected threshold
    pub significant: bool,
}

/// Result of the full Monte Carlo test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonteCarloResult {
    /// Examples added on top of the seed set in every trial
    pub increment: usize,
    pub trials: Vec<PerformanceRecord>,
    /// Bonferroni-corrected threshold applied to every metric
    pub corrected_alpha: f64,
    pub metrics: Vec<MetricSignificance>,
}

impl MonteCarloResult {
    #[must_use]
    pub fn metric(&self, metric: Metric) -> Option<&MetricSignificance> {
        self.metrics.iter().find(|m| m.metric == metric)
    }
}

/// Monte Carlo estimator over a fixed seed set and pool
pub struct MonteCarloEstimator<'a, T, E> {
    trainer: &'a T,
    evaluator: &'a E,
    trials: usize,
    workers: usize,
    stat_config: StatConfig,
}

impl<'a, T, E> MonteCarloEstimator<'a, T, E>
where
    T: Trainer,
    E: Evaluator<T::Model>,
{
    #[must_use]
    pub const fn new(
        trainer: &'a T,
        evaluator: &'a E,
        trials: usize,
        workers: usize,
        stat_config: StatConfig,
    ) -> Self {
        Self {
            trainer,
            evaluator,
            trials,
            workers,
            stat_config,
        }
    }

    #[must_use]
    pub const fn from_config(config: &ExperimentConfig, trainer: &'a T, evaluator: &'a E) -> Self {
        Self::new(
            trainer,
            evaluator,
            config.monte_carlo_samples,
            config.workers,
            config.stat_config(),
        )
    }

    /// Run the trials and test every metric the active model reported.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `trials` is zero.
    /// - `InsufficientData` if the final size is below the seed size or the
    ///   increment exceeds the pool.
    /// - The first failing trial's training or evaluation error.
    pub fn run<R: RngCore + ?Sized>(
        &self,
        seed_training: &[Example],
        pool: &[Example],
        test: &[Example],
        final_training_size: usize,
        active: &PerformanceRecord,
        rng: &mut R,
    ) -> Result<MonteCarloResult> {
        if self.trials == 0 {
            return Err(ExperimentError::InvalidInput(
                "at least one Monte Carlo trial is required".to_string(),
            ));
        }
        let increment = final_training_size
            .checked_sub(seed_training.len())
            .ok_or_else(|| {
                ExperimentError::InsufficientData(format!(
                    "final training size {final_training_size} is below the seed size {}",
                    seed_training.len()
                ))
            })?;
        if increment > pool.len() {
            return Err(ExperimentError::InsufficientData(format!(
                "increment {increment} exceeds the pool of {}",
                pool.len()
            )));
        }

        info!(trials = self.trials, increment, "Running Monte Carlo trials");

        let seeds = fork_seeds(rng, self.trials);
        let trials = run_trials(self.workers, &seeds, |trial, rng| {
            let mut training = seed_training.to_vec();
            training.extend(draw_random(pool, increment, rng)?.into_iter().cloned());
            let model = self.trainer.fit(&training)?;
            let record = self.evaluator.evaluate(&model, test, training.len())?;
            debug!(trial, "Monte Carlo trial done");
            Ok(record)
        })?;

        Ok(self.summarise(increment, trials, active))
    }

    fn summarise(
        &self,
        increment: usize,
        trials: Vec<PerformanceRecord>,
        active: &PerformanceRecord,
    ) -> MonteCarloResult {
        let mut collector = MetricsCollector::new();
        for record in &trials {
            collector.record(record);
        }

        let corrected_alpha = bonferroni_correction(self.stat_config.alpha, active.metrics.len());
        let metrics = active
            .metrics
            .iter()
            .map(|(&metric, &active_value)| {
                let p_value =
                    empirical_p_value(collector.values(metric), active_value, trials.len());
                let random = collector.compute(metric, &self.stat_config);
                MetricSignificance {
                    metric,
                    active: active_value,
                    random,
                    p_value,
                    mean_difference: random.mean - active_value,
                    significant: p_value < corrected_alpha,
                }
            })
            .collect();

        MonteCarloResult {
            increment,
            trials,
            corrected_alpha,
            metrics,
        }
    }
}

/// Learning-curve comparison on one metric
#[derive(Debug, Clone, Serialize)]
pub struct CurveComparison {
    pub metric: Metric,
    pub ts_sizes: Vec<usize>,
    pub active: Vec<f64>,
    pub random: Vec<f64>,
    /// `None` when the curves are too short or differ by a constant
    pub test: Option<SignificanceResult>,
}

/// Paired t-test of the active curve against the mean random curve
#[must_use]
pub fn compare_curves(
    metric: Metric,
    ts_sizes: &[usize],
    active: &[f64],
    random: &[f64],
    alpha: f64,
) -> CurveComparison {
    CurveComparison {
        metric,
        ts_sizes: ts_sizes.to_vec(),
        active: active.to_vec(),
        random: random.to_vec(),
        test: paired_t_test(active, random, alpha),
    }
}
