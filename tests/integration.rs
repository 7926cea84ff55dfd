//! Integration tests for the active-learning-eval CLI and library.
//!
//! These tests verify end-to-end functionality including:
//! - The full loop on a separable synthetic pool
//! - Exclusion and training-growth bookkeeping across cycles
//! - Monte Carlo p-values with controlled collaborators
//! - Reproducibility under a fixed seed
//! - CLI commands work correctly

#![allow(clippy::unwrap_used)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::float_cmp)]

use active_learning_eval::{
    generate, select, ActiveLearner, BinaryEvaluator, ConfusionMatrix, Dataset, Evaluator,
    Example, ExampleId, ExperimentConfig, ExperimentRunner, Features, LogisticRegressionTrainer,
    LoopPhase, Metric, Model, MonteCarloEstimator, PerformanceRecord, StatConfig,
    SyntheticConfig, Trainer, TrainingError,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::process::Command;

// ============================================================================
// Fixtures
// ============================================================================

/// Two Gaussian clusters per class, overlapping on the class axis, padded
/// with pure-noise dimensions so a 40-example seed model is visibly weaker.
fn scenario_config(n_examples: usize, id_offset: u64) -> SyntheticConfig {
    SyntheticConfig {
        n_examples,
        dim: 30,
        clusters_per_class: 2,
        class_separation: 2.0,
        cluster_spacing: 8.0,
        noise: 1.0,
        id_offset,
    }
}

fn scenario_inputs() -> (Dataset, Vec<Example>) {
    let labeled = generate(&scenario_config(1000, 0), 100).unwrap();
    let pool = generate(&scenario_config(10_000, 1_000_000), 200).unwrap();
    (labeled, pool.examples().to_vec())
}

fn small_inputs() -> (Dataset, Vec<Example>) {
    let labeled = generate(
        &SyntheticConfig {
            n_examples: 100,
            ..SyntheticConfig::default()
        },
        1,
    )
    .unwrap();
    let pool = generate(
        &SyntheticConfig {
            n_examples: 400,
            id_offset: 50_000,
            ..SyntheticConfig::default()
        },
        2,
    )
    .unwrap();
    (labeled, pool.examples().to_vec())
}

fn small_config() -> ExperimentConfig {
    ExperimentConfig {
        initial_examples_per_class: 5,
        examples_to_label_per_iteration: 5,
        num_iterations: 3,
        presample_size: 80,
        monte_carlo_samples: 10,
        random_baseline_replicates: 2,
        bootstrap_n: 200,
        ..ExperimentConfig::default()
    }
}

// ============================================================================
// Active learning loop
// ============================================================================

#[test]
fn test_scenario_forty_seed_five_iterations() {
    let (labeled, pool) = scenario_inputs();
    let config = ExperimentConfig {
        initial_examples_per_class: 20,
        examples_to_label_per_iteration: 20,
        num_iterations: 5,
        presample_size: 1000,
        ..ExperimentConfig::default()
    };
    let trainer = LogisticRegressionTrainer::new();
    let evaluator = BinaryEvaluator::default();

    let outcome = ActiveLearner::new(&config, &trainer, &evaluator)
        .run(&labeled, &pool, &mut ChaCha8Rng::seed_from_u64(config.seed))
        .unwrap();

    assert_eq!(outcome.ts_sizes, vec![40, 60, 80, 100, 120, 140]);
    assert_eq!(outcome.training.len(), 140);
    assert_eq!(outcome.test.len(), 960);
    for record in outcome.history.iter() {
        assert_eq!(record.batch.len(), 20);
        assert_eq!(record.batch.presampled().len(), 1000);
    }

    let seed_auc = outcome.seed_performance().get(Metric::Auc).unwrap();
    let final_auc = outcome.final_performance().get(Metric::Auc).unwrap();
    assert!(
        final_auc > seed_auc,
        "final AUC {final_auc} should beat seed AUC {seed_auc}"
    );
}

#[test]
fn test_no_reselection_and_monotonic_growth() {
    let (labeled, pool) = small_inputs();
    let config = ExperimentConfig {
        num_iterations: 6,
        ..small_config()
    };
    let trainer = LogisticRegressionTrainer::new();
    let evaluator = BinaryEvaluator::default();

    let outcome = ActiveLearner::new(&config, &trainer, &evaluator)
        .run(&labeled, &pool, &mut ChaCha8Rng::seed_from_u64(3))
        .unwrap();

    let mut seen: HashSet<ExampleId> = HashSet::new();
    for record in outcome.history.iter() {
        let ids: Vec<ExampleId> = record.batch.ids().collect();
        assert!(ids.len() <= 5);
        for id in ids {
            assert!(seen.insert(id), "example {id} surfaced twice");
        }
    }

    assert!(outcome.ts_sizes.windows(2).all(|w| w[1] == w[0] + 5));

    // Training holds the seed set plus every revealed batch, and no pool
    // example enters training without being excluded first.
    let training_ids: HashSet<ExampleId> = outcome.training.iter().map(Example::id).collect();
    assert_eq!(training_ids.len(), outcome.training.len());
    for example in &outcome.training {
        let from_pool = example.id().0 >= 50_000;
        assert_eq!(from_pool, outcome.excluded.contains(example.id()));
    }
}

#[test]
fn test_failure_keeps_partial_history() {
    let (labeled, pool) = small_inputs();
    let config = ExperimentConfig {
        strict_batch_size: true,
        ..small_config()
    };
    let trainer = LogisticRegressionTrainer::new();
    let evaluator = BinaryEvaluator::default();

    // 12 candidates: cycles 0 and 1 take 5 each, cycle 2 finds only 2.
    let failure = ActiveLearner::new(&config, &trainer, &evaluator)
        .run(&labeled, &pool[..12], &mut ChaCha8Rng::seed_from_u64(3))
        .unwrap_err();

    assert_eq!(failure.phase, LoopPhase::Iterating { cycle: 2 });
    assert_eq!(failure.kind(), "InsufficientData");
    assert_eq!(failure.history.len(), 2);
    assert_eq!(failure.history[1].training_size, 15);
    assert!(failure.to_string().contains("cycle 2"));
}

#[test]
fn test_selector_presample_draws_distinct_ids() {
    let (labeled, pool) = small_inputs();
    let (seed, _) = labeled
        .split_balanced(10, &mut ChaCha8Rng::seed_from_u64(0))
        .unwrap();
    let model = LogisticRegressionTrainer::new().fit(&seed).unwrap();
    let refs: Vec<&Example> = pool.iter().collect();

    let batch = select(&model, &refs, 10, 150, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();

    assert_eq!(batch.presampled().len(), 150);
    let distinct: HashSet<&ExampleId> = batch.presampled().iter().collect();
    assert_eq!(distinct.len(), 150);
    assert_eq!(batch.len(), 10);
}

// ============================================================================
// Monte Carlo estimator
// ============================================================================

#[derive(Debug)]
struct ConstantModel;

impl Model for ConstantModel {
    fn n_features(&self) -> usize {
        2
    }

    fn predict_proba(&self, inputs: &[&Features]) -> Result<Vec<Vec<f64>>, TrainingError> {
        Ok(vec![vec![0.5, 0.5]; inputs.len()])
    }
}

struct ConstantTrainer;

impl Trainer for ConstantTrainer {
    type Model = ConstantModel;

    fn fit(&self, training: &[Example]) -> Result<ConstantModel, TrainingError> {
        if training.is_empty() {
            return Err(TrainingError::EmptyTrainingSet);
        }
        Ok(ConstantModel)
    }
}

/// Every model scores the same, whatever it was trained on
struct ConstantEvaluator(f64);

impl Evaluator<ConstantModel> for ConstantEvaluator {
    fn evaluate(
        &self,
        _model: &ConstantModel,
        _test: &[Example],
        tss: usize,
    ) -> Result<PerformanceRecord, TrainingError> {
        Ok(PerformanceRecord::new(tss, ConfusionMatrix::default())
            .with_metric(Metric::Accuracy, self.0)
            .with_metric(Metric::Auc, self.0))
    }
}

#[test]
fn test_monte_carlo_identical_trials_p_value_one() {
    let (labeled, pool) = small_inputs();
    let seed: Vec<Example> = labeled.examples()[..40].to_vec();
    let active = PerformanceRecord::new(140, ConfusionMatrix::default())
        .with_metric(Metric::Accuracy, 0.8)
        .with_metric(Metric::Auc, 0.8);

    let result = MonteCarloEstimator::new(
        &ConstantTrainer,
        &ConstantEvaluator(0.8),
        100,
        0,
        StatConfig::default(),
    )
    .run(&seed, &pool, &[], 140, &active, &mut ChaCha8Rng::seed_from_u64(5))
    .unwrap();

    assert_eq!(result.trials.len(), 100);
    assert_eq!(result.increment, 100);
    for metric in &result.metrics {
        assert_eq!(metric.p_value, 1.0);
        assert!(metric.mean_difference.abs() < 1e-12);
        assert!(!metric.significant);
    }
}

#[test]
fn test_full_experiment_p_values_in_range() {
    let (labeled, pool) = small_inputs();
    let config = small_config();
    let trainer = LogisticRegressionTrainer::new();
    let evaluator = BinaryEvaluator::default();

    let results = ExperimentRunner::new(&config, &trainer, &evaluator)
        .run(&labeled, &pool)
        .unwrap();

    assert_eq!(results.monte_carlo.increment, 15);
    for metric in &results.monte_carlo.metrics {
        assert!((0.0..=1.0).contains(&metric.p_value));
        let samples: Vec<f64> = results
            .monte_carlo
            .trials
            .iter()
            .filter_map(|t| t.get(metric.metric))
            .collect();
        let expected = samples.iter().filter(|&&v| v >= metric.active).count() as f64
            / results.monte_carlo.trials.len() as f64;
        assert_eq!(metric.p_value, expected);
    }
    assert_eq!(results.baseline.mean_curve(Metric::Auc).len(), 4);
}

#[test]
fn test_experiment_reproducible_with_seed() {
    let (labeled, pool) = small_inputs();
    let trainer = LogisticRegressionTrainer::new();
    let evaluator = BinaryEvaluator::default();

    let run = |config: &ExperimentConfig| {
        ExperimentRunner::new(config, &trainer, &evaluator)
            .run(&labeled, &pool)
            .unwrap()
    };
    let batches = |results: &active_learning_eval::ExperimentResults<_>| {
        results
            .outcome
            .history
            .iter()
            .map(|r| r.batch.ids().collect::<Vec<_>>())
            .collect::<Vec<_>>()
    };

    let config = small_config();
    let a = run(&config);
    let b = run(&ExperimentConfig {
        workers: 1,
        ..small_config()
    });
    assert_eq!(batches(&a), batches(&b));
    assert_eq!(a.monte_carlo, b.monte_carlo);
    assert_eq!(a.baseline, b.baseline);

    let c = run(&ExperimentConfig {
        seed: 7,
        ..small_config()
    });
    assert_ne!(batches(&a), batches(&c));
}

// ============================================================================
// CLI Integration Tests
// ============================================================================

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_active-learning-eval"))
}

#[test]
fn test_cli_help_command() {
    let output = cli().arg("--help").output().expect("Failed to execute CLI");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("run"), "Help should list run command");
    assert!(stdout.contains("generate"), "Help should list generate command");
    assert!(
        stdout.contains("check-config"),
        "Help should list check-config command"
    );
}

#[test]
fn test_cli_generate_then_run() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let labeled = temp_dir.path().join("labeled.jsonl");
    let pool = temp_dir.path().join("pool.jsonl");
    let config = temp_dir.path().join("experiment.yaml");
    let report = temp_dir.path().join("report.json");

    for (path, examples, offset, seed) in [(&labeled, "80", "0", "1"), (&pool, "300", "1000", "2")]
    {
        let status = cli()
            .args(["generate", "--output"])
            .arg(path)
            .args(["--examples", examples, "--id-offset", offset, "--seed", seed])
            .status()
            .expect("Failed to execute CLI");
        assert!(status.success());
    }
    assert_eq!(Dataset::load_jsonl(&pool).unwrap().len(), 300);

    std::fs::write(
        &config,
        "initial_examples_per_class: 5\n\
         examples_to_label_per_iteration: 5\n\
         num_iterations: 2\n\
         presample_size: 50\n\
         monte_carlo_samples: 5\n\
         random_baseline_replicates: 2\n\
         bootstrap_n: 100\n",
    )
    .unwrap();

    let output = cli()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .arg("--labeled")
        .arg(&labeled)
        .arg("--pool")
        .arg(&pool)
        .args(["--format", "json", "--output"])
        .arg(&report)
        .output()
        .expect("Failed to execute CLI");
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["summary"]["final_training_size"], 20);
    assert_eq!(json["learning_curve"].as_array().unwrap().len(), 3);
    assert_eq!(json["monte_carlo"]["trials"], 5);
}

fn write_small_config(path: &std::path::Path) {
    std::fs::write(
        path,
        "initial_examples_per_class: 5\n\
         examples_to_label_per_iteration: 5\n\
         num_iterations: 1\n\
         presample_size: 40\n\
         monte_carlo_samples: 3\n\
         random_baseline_replicates: 1\n\
         bootstrap_n: 50\n",
    )
    .unwrap();
}

#[test]
fn test_cli_metric_override() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = temp_dir.path().join("experiment.yaml");
    let report = temp_dir.path().join("report.json");
    write_small_config(&config);

    let output = cli()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .arg("--output")
        .arg(&report)
        .args([
            "--synthetic",
            "--synthetic-labeled",
            "60",
            "--synthetic-pool",
            "120",
            "--metric",
            "Accuracy",
            "--format",
            "json",
        ])
        .output()
        .expect("Failed to execute CLI");
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["summary"]["primary_metric"], "accuracy");
}

#[test]
fn test_cli_rejects_unknown_metric() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = temp_dir.path().join("experiment.yaml");
    write_small_config(&config);

    let output = cli()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .args(["--synthetic", "--metric", "bleu"])
        .output()
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid metric type: bleu"), "stderr: {stderr}");
}

#[test]
fn test_cli_check_config_rejects_invalid() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = temp_dir.path().join("bad.yaml");
    std::fs::write(&config, "examples_to_label_per_iteration: 50\npresample_size: 10\n").unwrap();

    let output = cli()
        .args(["check-config", "--config"])
        .arg(&config)
        .output()
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("presample_size"), "stderr: {stderr}");
}

#[test]
fn test_cli_check_config_prints_defaults() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = temp_dir.path().join("ok.yaml");
    std::fs::write(&config, "seed: 9\n").unwrap();

    let output = cli()
        .args(["check-config", "--config"])
        .arg(&config)
        .output()
        .expect("Failed to execute CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Configuration OK"));
    assert!(stdout.contains("seed: 9"));
    assert!(stdout.contains("presample_size: 1000"));
}
