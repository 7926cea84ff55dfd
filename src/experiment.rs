//! Active-learning loop controller.
//!
//! Drives the train → evaluate → select → reveal cycle. All accumulators (the
//! training set, the excluded identifiers and the history) live in one
//! [`LoopState`] owned by a single [`ActiveLearner::run`] call.
//!
//! ```text
//! Initializing ──► Iterating{1} ──► ... ──► Iterating{n} ──► Completed
//!      │                 │                        │
//!      └─────────────────┴──── error ─────────────┴──► LoopFailure (partial history)
//! ```

use crate::config::ExperimentConfig;
use crate::data::{Dataset, Example, ExampleId};
use crate::error::{ExperimentError, Result};
use crate::metrics::PerformanceRecord;
use crate::model::{Evaluator, Trainer};
use crate::selector::{CaseSelector, SelectionBatch};
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

/// Where the loop is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum LoopPhase {
    /// Seed split, seed model and first selection
    Initializing,
    /// One reveal → retrain → evaluate → select cycle (1-based)
    Iterating { cycle: usize },
    /// All cycles done
    Completed,
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => f.write_str("initialization"),
            Self::Iterating { cycle } => write!(f, "cycle {cycle}"),
            Self::Completed => f.write_str("completion"),
        }
    }
}

/// Identifiers already surfaced for labeling. Only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludedSet(HashSet<ExampleId>);

impl ExcludedSet {
    #[must_use]
    pub fn contains(&self, id: ExampleId) -> bool {
        self.0.contains(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ExampleId> + '_ {
        self.0.iter().copied()
    }

    fn extend(&mut self, ids: impl IntoIterator<Item = ExampleId>) {
        self.0.extend(ids);
    }
}

/// One cycle: the model trained this cycle, its score and the batch it chose
#[derive(Debug, Clone)]
pub struct IterationRecord<M> {
    /// 0 for the seed model
    pub cycle: usize,
    /// Training-set size the model was fitted on
    pub training_size: usize,
    pub model: M,
    pub performance: PerformanceRecord,
    pub batch: SelectionBatch,
}

/// Append-only record of a completed run; always holds the seed record
#[derive(Debug, Clone)]
pub struct ExperimentHistory<M> {
    initial: IterationRecord<M>,
    cycles: Vec<IterationRecord<M>>,
}

impl<M> ExperimentHistory<M> {
    /// The seed-model record (cycle 0)
    #[must_use]
    pub const fn initial(&self) -> &IterationRecord<M> {
        &self.initial
    }

    /// The most recent record
    #[must_use]
    pub fn last(&self) -> &IterationRecord<M> {
        self.cycles.last().unwrap_or(&self.initial)
    }

    /// Records in cycle order, seed record first
    pub fn iter(&self) -> impl Iterator<Item = &IterationRecord<M>> {
        std::iter::once(&self.initial).chain(self.cycles.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cycles.len() + 1
    }

    /// Never true; the seed record is always present
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Training-set size at every record
    #[must_use]
    pub fn ts_sizes(&self) -> Vec<usize> {
        self.iter().map(|r| r.training_size).collect()
    }

    #[must_use]
    pub fn into_records(self) -> Vec<IterationRecord<M>> {
        std::iter::once(self.initial).chain(self.cycles).collect()
    }
}

/// Everything a completed run leaves behind
#[derive(Debug, Clone)]
pub struct ExperimentOutcome<M> {
    pub history: ExperimentHistory<M>,
    /// Training-set size trajectory, one entry per history record
    pub ts_sizes: Vec<usize>,
    /// Balanced seed training set
    pub seed_training: Vec<Example>,
    /// Final training set (seed plus every revealed batch)
    pub training: Vec<Example>,
    /// Fixed held-out test set
    pub test: Vec<Example>,
    pub excluded: ExcludedSet,
}

impl<M> ExperimentOutcome<M> {
    /// Model fitted in the last cycle
    #[must_use]
    pub fn final_model(&self) -> &M {
        &self.history.last().model
    }

    #[must_use]
    pub fn final_performance(&self) -> &PerformanceRecord {
        &self.history.last().performance
    }

    #[must_use]
    pub fn seed_performance(&self) -> &PerformanceRecord {
        &self.history.initial().performance
    }
}

/// A failed run: where it stopped, why, and what had been recorded so far
#[derive(Debug)]
pub struct LoopFailure<M> {
    pub phase: LoopPhase,
    pub error: ExperimentError,
    pub history: Vec<IterationRecord<M>>,
}

impl<M> LoopFailure<M> {
    /// Error kind name, e.g. `InsufficientData`
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.error.kind()
    }
}

impl<M> fmt::Display for LoopFailure<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "active learning failed during {} ({}): {} [{} records kept]",
            self.phase,
            self.error.kind(),
            self.error,
            self.history.len()
        )
    }
}

impl<M: fmt::Debug> std::error::Error for LoopFailure<M> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Mutable accumulators of one run
#[derive(Debug)]
struct LoopState {
    phase: LoopPhase,
    training: Vec<Example>,
    excluded: ExcludedSet,
}

impl LoopState {
    fn enter(&mut self, phase: LoopPhase) {
        debug!(from = %self.phase, to = %phase, "Loop phase change");
        self.phase = phase;
    }

    /// Oracle step: the batch's true labels become visible
    fn reveal(&mut self, batch: &SelectionBatch) {
        self.training.extend(batch.examples().cloned());
    }
}

/// Runs the active-learning loop with a given trainer and evaluator
pub struct ActiveLearner<'a, T, E> {
    config: &'a ExperimentConfig,
    trainer: &'a T,
    evaluator: &'a E,
    selector: CaseSelector,
}

impl<'a, T, E> ActiveLearner<'a, T, E>
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
            selector: CaseSelector::from_config(config),
        }
    }

    /// Run the loop.
    ///
    /// `labeled` is split into the balanced seed set and the test set; `pool`
    /// is the unlabeled pool whose labels are revealed only on selection.
    ///
    /// # Errors
    ///
    /// Any error aborts the run. The returned [`LoopFailure`] names the phase
    /// and carries every record completed before the failure.
    pub fn run<R: Rng + ?Sized>(
        &self,
        labeled: &Dataset,
        pool: &[Example],
        rng: &mut R,
    ) -> std::result::Result<ExperimentOutcome<T::Model>, LoopFailure<T::Model>> {
        let mut records: Vec<IterationRecord<T::Model>> = Vec::new();
        let mut state = LoopState {
            phase: LoopPhase::Initializing,
            training: Vec::new(),
            excluded: ExcludedSet::default(),
        };

        let fail = |phase, error, history| LoopFailure {
            phase,
            error,
            history,
        };

        let (seed_training, test) = match self.initialize(labeled, pool, rng) {
            Ok(split) => split,
            Err(error) => return Err(fail(state.phase, error, records)),
        };
        state.training.clone_from(&seed_training);

        match self.cycle(0, &mut state, &test, pool, rng) {
            Ok(record) => records.push(record),
            Err(error) => return Err(fail(state.phase, error, records)),
        }

        for cycle in 1..=self.config.num_iterations {
            state.enter(LoopPhase::Iterating { cycle });
            if let Some(previous) = records.last() {
                state.reveal(&previous.batch);
            }
            match self.cycle(cycle, &mut state, &test, pool, rng) {
                Ok(record) => records.push(record),
                Err(error) => return Err(fail(state.phase, error, records)),
            }
        }
        state.enter(LoopPhase::Completed);

        let mut records = records.into_iter();
        let Some(initial) = records.next() else {
            return Err(fail(
                state.phase,
                ExperimentError::InvalidInput("no seed record was produced".to_string()),
                Vec::new(),
            ));
        };
        let history = ExperimentHistory {
            initial,
            cycles: records.collect(),
        };
        let ts_sizes = history.ts_sizes();

        info!(
            cycles = history.len() - 1,
            final_training = state.training.len(),
            excluded = state.excluded.len(),
            "Active learning completed"
        );

        Ok(ExperimentOutcome {
            history,
            ts_sizes,
            seed_training,
            training: state.training,
            test,
            excluded: state.excluded,
        })
    }

    /// Validate inputs and split off the seed training set
    fn initialize<R: Rng + ?Sized>(
        &self,
        labeled: &Dataset,
        pool: &[Example],
        rng: &mut R,
    ) -> Result<(Vec<Example>, Vec<Example>)> {
        self.config.validate()?;

        let labeled_ids: HashSet<ExampleId> = labeled.iter().map(Example::id).collect();
        let mut pool_ids = HashSet::with_capacity(pool.len());
        for example in pool {
            if labeled_ids.contains(&example.id()) || !pool_ids.insert(example.id()) {
                return Err(ExperimentError::InvalidInput(format!(
                    "example id {} appears more than once across the labeled set and the pool",
                    example.id()
                )));
            }
        }

        let (seed, test) = labeled.split_balanced(self.config.initial_examples_per_class, rng)?;
        if test.is_empty() {
            return Err(ExperimentError::InsufficientData(
                "no labeled examples left for the test set".to_string(),
            ));
        }

        info!(
            seed = seed.len(),
            test = test.len(),
            pool = pool.len(),
            "Seed split done"
        );
        Ok((seed, test))
    }

    /// Retrain, evaluate, restrict the pool, select and exclude
    fn cycle<R: Rng + ?Sized>(
        &self,
        cycle: usize,
        state: &mut LoopState,
        test: &[Example],
        pool: &[Example],
        rng: &mut R,
    ) -> Result<IterationRecord<T::Model>> {
        let training_size = state.training.len();
        let model = self.trainer.fit(&state.training)?;
        let performance = self.evaluator.evaluate(&model, test, training_size)?;

        let candidates: Vec<&Example> = pool
            .iter()
            .filter(|e| !state.excluded.contains(e.id()))
            .collect();
        let n = self.selector.batch_size();
        if candidates.is_empty() {
            return Err(ExperimentError::InsufficientData(
                "no unlabeled candidates remain after exclusions".to_string(),
            ));
        }
        if candidates.len() < n {
            if self.config.strict_batch_size {
                return Err(ExperimentError::InsufficientData(format!(
                    "{} candidates remain, {n} requested",
                    candidates.len()
                )));
            }
            warn!(
                cycle,
                remaining = candidates.len(),
                requested = n,
                "Candidate pool smaller than batch size, shrinking batch"
            );
        }

        let batch = self.selector.select(&model, &candidates, rng)?;
        if self.config.stricter_exclusion {
            state.excluded.extend(batch.presampled().iter().copied());
        } else {
            state.excluded.extend(batch.ids());
        }

        let primary = self.config.primary_metric;
        info!(
            cycle,
            training_size,
            metric = %primary,
            value = performance.get(primary).unwrap_or(f64::NAN),
            selected = batch.len(),
            mean_entropy = batch.mean_entropy(),
            "Cycle complete"
        );

        Ok(IterationRecord {
            cycle,
            training_size,
            model,
            performance,
            batch,
        })
    }
}
