//! Experiment execution engine.
//!
//! Runs the active-learning loop, then validates it against random selection:
//! the random baseline replays the training-size trajectory and the Monte Carlo
//! estimator tests the final model. One `ChaCha8Rng` seeded from the
//! configuration drives the whole run.

use crate::baseline::{BaselineCurves, RandomBaseline};
use crate::config::ExperimentConfig;
use crate::data::{Dataset, Example};
use crate::error::ExperimentError;
use crate::experiment::{ActiveLearner, ExperimentOutcome, LoopFailure};
use crate::model::{Evaluator, Trainer};
use crate::significance::{compare_curves, CurveComparison, MonteCarloEstimator, MonteCarloResult};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Errors that can occur while running an experiment.
///
/// Every variant keeps what was computed before the failure: the partial loop
/// history, or the completed active-learning outcome when a validation stage
/// fails.
#[derive(Debug)]
pub enum RunnerError<M> {
    /// The active-learning loop aborted
    Loop(LoopFailure<M>),
    /// The random baseline failed after the loop completed
    Baseline {
        error: ExperimentError,
        outcome: Box<ExperimentOutcome<M>>,
    },
    /// The Monte Carlo test failed after the loop completed
    MonteCarlo {
        error: ExperimentError,
        outcome: Box<ExperimentOutcome<M>>,
    },
}

impl<M> RunnerError<M> {
    /// The underlying experiment error
    #[must_use]
    pub const fn error(&self) -> &ExperimentError {
        match self {
            Self::Loop(failure) => &failure.error,
            Self::Baseline { error, .. } | Self::MonteCarlo { error, .. } => error,
        }
    }

    /// Error kind name, e.g. `InsufficientData`
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.error().kind()
    }

    /// The completed loop outcome, if the failure came after the loop
    #[must_use]
    pub fn outcome(&self) -> Option<&ExperimentOutcome<M>> {
        match self {
            Self::Loop(_) => None,
            Self::Baseline { outcome, .. } | Self::MonteCarlo { outcome, .. } => {
                Some(outcome.as_ref())
            }
        }
    }
}

impl<M> fmt::Display for RunnerError<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loop(failure) => write!(f, "{failure}"),
            Self::Baseline { error, .. } => write!(f, "Random baseline failed: {error}"),
            Self::MonteCarlo { error, .. } => write!(f, "Monte Carlo estimation failed: {error}"),
        }
    }
}

impl<M: fmt::Debug> std::error::Error for RunnerError<M> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error())
    }
}

impl<M> From<LoopFailure<M>> for RunnerError<M> {
    fn from(failure: LoopFailure<M>) -> Self {
        Self::Loop(failure)
    }
}

/// Everything one experiment produces
#[derive(Debug, Clone)]
pub struct ExperimentResults<M> {
    pub outcome: ExperimentOutcome<M>,
    pub baseline: BaselineCurves,
    pub monte_carlo: MonteCarloResult,
    /// Active vs mean random curve on the primary metric
    pub curve_comparison: CurveComparison,
    pub elapsed: Duration,
}

/// Runs complete experiments for one configuration
pub struct ExperimentRunner<'a, T, E> {
    config: &'a ExperimentConfig,
    trainer: &'a T,
    evaluator: &'a E,
}

impl<'a, T, E> ExperimentRunner<'a, T, E>
where
    T: Trainer,
    E: Evaluator<T::Model>,
{
    #[must_use]
    pub const fn new(config: &'a ExperimentConfig, trainer: &'a T, evaluator: &'a E) -> Self {
        Self {
            config,
            trainer,
            evaluator,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ExperimentConfig {
        self.config
    }

    /// Run the loop, the random baseline and the Monte Carlo test
    ///
    /// # Errors
    ///
    /// Returns the first error from any stage; nothing is retried. A loop
    /// failure carries the partial history, and a baseline or Monte Carlo
    /// failure carries the completed loop outcome.
    pub fn run(
        &self,
        labeled: &Dataset,
        pool: &[Example],
    ) -> Result<ExperimentResults<T::Model>, RunnerError<T::Model>> {
        let start = Instant::now();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        info!(
            seed = self.config.seed,
            labeled = labeled.len(),
            pool = pool.len(),
            iterations = self.config.num_iterations,
            batch = self.config.examples_to_label_per_iteration,
            "Starting experiment"
        );

        let learner = ActiveLearner::new(self.config, self.trainer, self.evaluator);
        let outcome = learner.run(labeled, pool, &mut rng).map_err(|failure| {
            warn!(
                phase = %failure.phase,
                kind = failure.kind(),
                records = failure.history.len(),
                "Active learning aborted"
            );
            RunnerError::from(failure)
        })?;

        let baseline = match RandomBaseline::from_config(self.config, self.trainer, self.evaluator)
            .run(
                &outcome.seed_training,
                pool,
                &outcome.test,
                &outcome.ts_sizes,
                &mut rng,
            ) {
            Ok(baseline) => baseline,
            Err(error) => {
                warn!(kind = error.kind(), "Random baseline aborted");
                return Err(RunnerError::Baseline {
                    error,
                    outcome: Box::new(outcome),
                });
            }
        };

        let monte_carlo = match MonteCarloEstimator::from_config(
            self.config,
            self.trainer,
            self.evaluator,
        )
        .run(
            &outcome.seed_training,
            pool,
            &outcome.test,
            outcome.training.len(),
            outcome.final_performance(),
            &mut rng,
        ) {
            Ok(result) => result,
            Err(error) => {
                warn!(kind = error.kind(), "Monte Carlo estimation aborted");
                return Err(RunnerError::MonteCarlo {
                    error,
                    outcome: Box::new(outcome),
                });
            }
        };

        let metric = self.config.primary_metric;
        let active_curve: Vec<f64> = outcome
            .history
            .iter()
            .map(|r| r.performance.get(metric).unwrap_or(f64::NAN))
            .collect();
        let curve_comparison = compare_curves(
            metric,
            &outcome.ts_sizes,
            &active_curve,
            &baseline.mean_curve(metric),
            self.config.alpha,
        );

        let elapsed = start.elapsed();
        info!(
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "Experiment finished"
        );

        Ok(ExperimentResults {
            outcome,
            baseline,
            monte_carlo,
            curve_comparison,
            elapsed,
        })
    }
}
