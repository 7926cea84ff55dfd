//! Report generation for experiment results.
//!
//! Generates reports showing:
//! - Learning curves of active selection and the random baseline
//! - Monte Carlo significance per metric
//! - Curve comparison on the primary metric

use crate::config::ExperimentConfig;
use crate::metrics::{Metric, StatConfig};
use crate::runner::ExperimentResults;
use crate::significance::{CurveComparison, MetricSignificance};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use tabled::{Table, Tabled};

/// Full experiment report
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub metadata: ReportMetadata,
    pub summary: ReportSummary,
    /// One point per history record
    pub learning_curve: Vec<CurvePoint>,
    pub monte_carlo: MonteCarloSummary,
    pub curve_comparison: CurveComparison,
}

/// Report metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    /// Report title
    pub title: String,
    /// Report generation timestamp
    pub generated_at: DateTime<Utc>,
    /// Framework version
    pub framework_version: String,
    /// Wall-clock duration of the experiment
    pub elapsed_ms: u64,
    /// Configuration the experiment ran with
    pub config: ExperimentConfig,
    /// Statistical configuration used
    pub stat_config: StatConfigSummary,
}

/// Statistical configuration summary
#[derive(Debug, Clone, Serialize)]
pub struct StatConfigSummary {
    /// Bootstrap resamples
    pub bootstrap_n: usize,
    /// Confidence level
    pub confidence: f64,
    /// Significance threshold
    pub alpha: f64,
}

impl From<&StatConfig> for StatConfigSummary {
    fn from(config: &StatConfig) -> Self {
        Self {
            bootstrap_n: config.bootstrap_n,
            confidence: config.confidence,
            alpha: config.alpha,
        }
    }
}

/// Headline numbers on the primary metric
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub primary_metric: Metric,
    pub cycles: usize,
    pub seed_training_size: usize,
    pub final_training_size: usize,
    /// Seed-only model
    pub seed_value: f64,
    /// Final active model
    pub final_value: f64,
    /// Mean over the Monte Carlo random trials
    pub random_mean: f64,
    pub p_value: f64,
    pub significant: bool,
}

/// One learning-curve step
#[derive(Debug, Clone, Serialize)]
pub struct CurvePoint {
    pub cycle: usize,
    pub training_size: usize,
    /// Examples selected after this model was trained
    pub selected: usize,
    pub mean_entropy: f64,
    pub active: BTreeMap<Metric, f64>,
    /// Mean across baseline replicates at the same size
    pub random_mean: BTreeMap<Metric, f64>,
}

/// Monte Carlo test without the raw trials
#[derive(Debug, Clone, Serialize)]
pub struct MonteCarloSummary {
    pub trials: usize,
    pub increment: usize,
    pub corrected_alpha: f64,
    pub metrics: Vec<MetricSignificance>,
}

/// Report builder for constructing full reports
pub struct ReportBuilder {
    title: String,
    config: ExperimentConfig,
}

impl ReportBuilder {
    /// Create a new report builder
    #[must_use]
    pub fn new(title: &str, config: &ExperimentConfig) -> Self {
        Self {
            title: title.to_string(),
            config: config.clone(),
        }
    }

    /// Build the full report
    #[must_use]
    pub fn build<M>(&self, results: &ExperimentResults<M>) -> ExperimentReport {
        let outcome = &results.outcome;
        let metric = self.config.primary_metric;

        let metrics: Vec<Metric> = outcome.final_performance().metrics.keys().copied().collect();
        let random_curves: BTreeMap<Metric, Vec<f64>> = metrics
            .iter()
            .map(|&m| (m, results.baseline.mean_curve(m)))
            .collect();

        let learning_curve = outcome
            .history
            .iter()
            .enumerate()
            .map(|(step, record)| CurvePoint {
                cycle: record.cycle,
                training_size: record.training_size,
                selected: record.batch.len(),
                mean_entropy: record.batch.mean_entropy(),
                active: record.performance.metrics.clone(),
                random_mean: random_curves
                    .iter()
                    .filter_map(|(&m, curve)| curve.get(step).map(|&v| (m, v)))
                    .collect(),
            })
            .collect();

        let primary = results.monte_carlo.metric(metric);
        let summary = ReportSummary {
            primary_metric: metric,
            cycles: outcome.history.len() - 1,
            seed_training_size: outcome.seed_training.len(),
            final_training_size: outcome.training.len(),
            seed_value: outcome.seed_performance().get(metric).unwrap_or(f64::NAN),
            final_value: outcome.final_performance().get(metric).unwrap_or(f64::NAN),
            random_mean: primary.map_or(f64::NAN, |m| m.random.mean),
            p_value: primary.map_or(1.0, |m| m.p_value),
            significant: primary.is_some_and(|m| m.significant),
        };

        ExperimentReport {
            metadata: ReportMetadata {
                title: self.title.clone(),
                generated_at: Utc::now(),
                framework_version: env!("CARGO_PKG_VERSION").to_string(),
                elapsed_ms: u64::try_from(results.elapsed.as_millis()).unwrap_or(u64::MAX),
                config: self.config.clone(),
                stat_config: StatConfigSummary::from(&self.config.stat_config()),
            },
            summary,
            learning_curve,
            monte_carlo: MonteCarloSummary {
                trials: results.monte_carlo.trials.len(),
                increment: results.monte_carlo.increment,
                corrected_alpha: results.monte_carlo.corrected_alpha,
                metrics: results.monte_carlo.metrics.clone(),
            },
            curve_comparison: results.curve_comparison.clone(),
        }
    }
}

/// Learning-curve table row
#[derive(Tabled)]
struct CurveTableRow {
    #[tabled(rename = "Cycle")]
    cycle: usize,
    #[tabled(rename = "Training size")]
    training_size: usize,
    #[tabled(rename = "Active")]
    active: String,
    #[tabled(rename = "Random (mean)")]
    random: String,
    #[tabled(rename = "Selected")]
    selected: usize,
    #[tabled(rename = "Mean entropy")]
    entropy: String,
}

/// Monte Carlo table row
#[derive(Tabled)]
struct MonteCarloTableRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Active")]
    active: String,
    #[tabled(rename = "Random mean [CI]")]
    random: String,
    #[tabled(rename = "Diff (random - active)")]
    difference: String,
    #[tabled(rename = "p-value")]
    p_value: String,
    #[tabled(rename = "Significant")]
    significant: String,
}

fn format_value(value: Option<&f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"))
}

const fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

impl ExperimentReport {
    /// Render report as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn curve_table(&self) -> String {
        let metric = self.summary.primary_metric;
        let rows: Vec<CurveTableRow> = self
            .learning_curve
            .iter()
            .map(|p| CurveTableRow {
                cycle: p.cycle,
                training_size: p.training_size,
                active: format_value(p.active.get(&metric)),
                random: format_value(p.random_mean.get(&metric)),
                selected: p.selected,
                entropy: format!("{:.4}", p.mean_entropy),
            })
            .collect();
        Table::new(rows).to_string()
    }

    fn monte_carlo_table(&self) -> String {
        let rows: Vec<MonteCarloTableRow> = self
            .monte_carlo
            .metrics
            .iter()
            .map(|m| MonteCarloTableRow {
                metric: m.metric.to_string(),
                active: format!("{:.4}", m.active),
                random: format!(
                    "{:.4} [{:.4}-{:.4}]",
                    m.random.mean, m.random.ci.0, m.random.ci.1
                ),
                difference: format!("{:+.4}", m.mean_difference),
                p_value: format!("{:.3}", m.p_value),
                significant: yes_no(m.significant).to_string(),
            })
            .collect();
        Table::new(rows).to_string()
    }

    /// Render report as markdown
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        let s = &self.summary;

        writeln!(output, "# {}", self.metadata.title).ok();
        writeln!(output).ok();
        writeln!(
            output,
            "**Generated:** {}",
            self.metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
        .ok();
        writeln!(
            output,
            "**Framework Version:** {}",
            self.metadata.framework_version
        )
        .ok();
        writeln!(output).ok();

        writeln!(output, "## Summary").ok();
        writeln!(output).ok();
        writeln!(output, "| Metric | Value |").ok();
        writeln!(output, "|--------|-------|").ok();
        writeln!(output, "| Primary metric | {} |", s.primary_metric).ok();
        writeln!(output, "| Cycles | {} |", s.cycles).ok();
        writeln!(
            output,
            "| Training size | {} → {} |",
            s.seed_training_size, s.final_training_size
        )
        .ok();
        writeln!(output, "| Seed model | {:.4} |", s.seed_value).ok();
        writeln!(output, "| Final active model | {:.4} |", s.final_value).ok();
        writeln!(output, "| Random selection (mean) | {:.4} |", s.random_mean).ok();
        writeln!(output, "| Monte Carlo p-value | {:.3} |", s.p_value).ok();
        writeln!(output, "| Significant | {} |", yes_no(s.significant)).ok();
        writeln!(output).ok();

        writeln!(output, "## Learning Curve ({})", s.primary_metric).ok();
        writeln!(output).ok();
        writeln!(output, "{}", self.curve_table()).ok();
        writeln!(output).ok();

        writeln!(output, "## Monte Carlo Significance").ok();
        writeln!(output).ok();
        writeln!(
            output,
            "{} trials of {} random examples; Bonferroni-corrected α = {:.4}",
            self.monte_carlo.trials, self.monte_carlo.increment, self.monte_carlo.corrected_alpha
        )
        .ok();
        writeln!(output).ok();
        writeln!(output, "{}", self.monte_carlo_table()).ok();
        writeln!(output).ok();

        writeln!(output, "## Curve Comparison").ok();
        writeln!(output).ok();
        match &self.curve_comparison.test {
            Some(test) => {
                writeln!(output, "| t-stat | p-value | Effect Size | Significant |").ok();
                writeln!(output, "|--------|---------|-------------|-------------|").ok();
                writeln!(
                    output,
                    "| {:.3} | {:.4} | {} ({:.2}) | {} |",
                    test.t_statistic,
                    test.p_value,
                    test.effect_size,
                    test.cohens_d,
                    yes_no(test.is_significant)
                )
                .ok();
            }
            None => {
                writeln!(output, "Not enough curve points with varying differences.").ok();
            }
        }
        writeln!(output).ok();

        let config = &self.metadata.config;
        writeln!(output, "## Configuration").ok();
        writeln!(output).ok();
        writeln!(output, "- Seed: {}", config.seed).ok();
        writeln!(
            output,
            "- Seed examples per class: {}",
            config.initial_examples_per_class
        )
        .ok();
        writeln!(
            output,
            "- Examples per iteration: {}",
            config.examples_to_label_per_iteration
        )
        .ok();
        writeln!(output, "- Presample size: {}", config.presample_size).ok();
        writeln!(
            output,
            "- Stricter exclusion: {}",
            yes_no(config.stricter_exclusion)
        )
        .ok();
        writeln!(
            output,
            "- Bootstrap resamples: {}",
            self.metadata.stat_config.bootstrap_n
        )
        .ok();
        writeln!(
            output,
            "- Confidence level: {}%",
            self.metadata.stat_config.confidence * 100.0
        )
        .ok();
        writeln!(
            output,
            "- Significance threshold (α): {}",
            self.metadata.stat_config.alpha
        )
        .ok();

        output
    }

    /// Render report as plain text
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut output = String::new();
        let rule = "───────────────────────────────────────────────────────────────";
        let s = &self.summary;

        writeln!(
            output,
            "═══════════════════════════════════════════════════════════════"
        )
        .ok();
        writeln!(output, "  {}", self.metadata.title).ok();
        writeln!(
            output,
            "═══════════════════════════════════════════════════════════════"
        )
        .ok();
        writeln!(output).ok();

        writeln!(output, "SUMMARY ({})", s.primary_metric).ok();
        writeln!(output, "{rule}").ok();
        writeln!(
            output,
            "  Training size:    {} -> {}",
            s.seed_training_size, s.final_training_size
        )
        .ok();
        writeln!(output, "  Seed model:       {:.4}", s.seed_value).ok();
        writeln!(output, "  Final model:      {:.4}", s.final_value).ok();
        writeln!(output, "  Random (mean):    {:.4}", s.random_mean).ok();
        writeln!(output, "  p-value:          {:.3}", s.p_value).ok();
        writeln!(
            output,
            "  Significant:      {}",
            yes_no(s.significant).to_uppercase()
        )
        .ok();
        writeln!(output).ok();

        writeln!(output, "LEARNING CURVE").ok();
        writeln!(output, "{rule}").ok();
        writeln!(output, "{}", self.curve_table()).ok();
        writeln!(output).ok();

        writeln!(output, "MONTE CARLO ({} trials)", self.monte_carlo.trials).ok();
        writeln!(output, "{rule}").ok();
        writeln!(output, "{}", self.monte_carlo_table()).ok();

        output
    }
}
