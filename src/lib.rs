//! # Active Learning Eval
//!
//! Diversity-aware uncertainty sampling for pool-based active learning on
//! binary classification, validated against random selection with Monte Carlo
//! resampling.
//!
//! ## Method
//!
//! Each cycle trains a classifier on the current training set, presamples the
//! unlabeled pool, scores the presample by predictive entropy, clusters it with
//! Ward linkage into as many groups as examples to label, and reveals the most
//! uncertain example of every cluster. Examples are never surfaced twice.
//!
//! ## Validation
//!
//! - A random baseline replays the same training-size trajectory with uniformly
//!   random draws over several independent replicates.
//! - A Monte Carlo test repeats the final increment with random examples and
//!   reports, per metric, the fraction of trials that match or beat active
//!   selection.
//!
//! ## Architecture
//!
//! ```text
//! Labeled set ──► seed split ──► Trainer ──► Model
//!                                   ▲           │
//!                                   │           ▼
//!   reveal labels ◄── SelectionBatch ◄── CaseSelector (entropy + Ward)
//!                                               │
//!                                         ExcludedSet
//!        ↓
//! RandomBaseline (replicates) + MonteCarloEstimator (trials)
//!        ↓
//! Report (JSON / markdown / text)
//! ```

pub mod baseline;
pub mod classifier;
pub mod cluster;
pub mod config;
pub mod data;
pub mod entropy;
pub mod error;
pub mod experiment;
pub mod metrics;
pub mod model;
mod parallel;
pub mod report;
pub mod runner;
pub mod selector;
pub mod significance;
pub mod synthetic;

pub use baseline::{BaselineCurves, BaselineReplicate, RandomBaseline};
pub use classifier::{roc_auc, BinaryEvaluator, LogisticModel, LogisticRegressionTrainer};
pub use cluster::{cluster_ward, ClusterId};
pub use config::{ConfigError, ExperimentConfig};
pub use data::{DataError, Dataset, Example, ExampleId, Features, Label};
pub use entropy::entropy;
pub use error::{ExperimentError, TrainingError};
pub use experiment::{
    ActiveLearner, ExcludedSet, ExperimentHistory, ExperimentOutcome, IterationRecord,
    LoopFailure, LoopPhase,
};
pub use metrics::{
    bonferroni_correction, bootstrap_ci, paired_t_test, AggregatedMetric, ConfusionMatrix,
    EffectSize, Metric, MetricsCollector, PerformanceRecord, SignificanceResult, StatConfig,
};
pub use model::{Evaluator, Model, Trainer};
pub use report::{ExperimentReport, ReportBuilder, ReportMetadata, ReportSummary};
pub use runner::{ExperimentResults, ExperimentRunner, RunnerError};
pub use selector::{select, CaseSelector, ScoredCandidate, SelectionBatch};
pub use significance::{
    compare_curves, empirical_p_value, CurveComparison, MetricSignificance, MonteCarloEstimator,
    MonteCarloResult,
};
pub use synthetic::{generate, SyntheticConfig};
