//! Performance records and statistical computation.
//!
//! Implements the statistics used to compare active and random selection:
//! - Bootstrap confidence intervals (percentile method)
//! - Paired t-test over learning curves with Cohen's d effect size
//! - Bonferroni correction across metrics

use crate::config::ConfigError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::BTreeMap;
use std::fmt;

/// Named scalar metrics reported by an evaluator (higher is better for all)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Fraction of correct predictions
    Accuracy,
    /// Area under the ROC curve
    Auc,
    /// Positive predictive value
    Precision,
    /// True positive rate
    Recall,
    /// Harmonic mean of precision and recall
    F1,
}

impl Metric {
    /// Every metric, in report order
    pub const ALL: [Self; 5] = [
        Self::Accuracy,
        Self::Auc,
        Self::Precision,
        Self::Recall,
        Self::F1,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Accuracy => "accuracy",
            Self::Auc => "auc",
            Self::Precision => "precision",
            Self::Recall => "recall",
            Self::F1 => "f1",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Metric {
    type Err = ConfigError;

    /// Parse metric from string
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidMetric` if the string doesn't match a known metric.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accuracy" | "acc" => Ok(Self::Accuracy),
            "auc" | "roc_auc" | "roc-auc" => Ok(Self::Auc),
            "precision" => Ok(Self::Precision),
            "recall" | "sensitivity" => Ok(Self::Recall),
            "f1" | "f1_score" => Ok(Self::F1),
            _ => Err(ConfigError::InvalidMetric(s.to_string())),
        }
    }
}

/// Binary confusion matrix with class 1 as the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionMatrix {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }
}

/// Performance of one model on the test set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    /// Training-set size the model was fitted on
    pub tss: usize,
    /// Scalar metrics
    pub metrics: BTreeMap<Metric, f64>,
    /// Confusion matrix at the decision threshold
    pub confusion: ConfusionMatrix,
}

impl PerformanceRecord {
    /// Create a record with no metrics yet
    #[must_use]
    pub const fn new(tss: usize, confusion: ConfusionMatrix) -> Self {
        Self {
            tss,
            metrics: BTreeMap::new(),
            confusion,
        }
    }

    /// Builder-style metric insertion
    #[must_use]
    pub fn with_metric(mut self, metric: Metric, value: f64) -> Self {
        self.metrics.insert(metric, value);
        self
    }

    /// Value of a metric, if the evaluator reported it
    #[must_use]
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).copied()
    }
}

/// Collects per-metric samples across independent trials
#[derive(Debug, Default)]
pub struct MetricsCollector {
    samples: BTreeMap<Metric, Vec<f64>>,
    count: usize,
}

impl MetricsCollector {
    /// Create a new metrics collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every metric of one performance record
    pub fn record(&mut self, record: &PerformanceRecord) {
        for (&metric, &value) in &record.metrics {
            self.samples.entry(metric).or_default().push(value);
        }
        self.count += 1;
    }

    /// Number of records seen
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Samples recorded for a metric
    #[must_use]
    pub fn values(&self, metric: Metric) -> &[f64] {
        self.samples.get(&metric).map_or(&[][..], Vec::as_slice)
    }

    /// Metrics with at least one sample
    pub fn metrics(&self) -> impl Iterator<Item = Metric> + '_ {
        self.samples.keys().copied()
    }

    /// Aggregate one metric
    #[must_use]
    pub fn compute(&self, metric: Metric, config: &StatConfig) -> AggregatedMetric {
        let values = self.values(metric);
        AggregatedMetric {
            mean: compute_mean(values),
            std: compute_std(values),
            ci: bootstrap_ci(values, config),
            sample_count: values.len(),
        }
    }
}

/// Summary of one metric across trials
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetric {
    /// Mean across trials
    pub mean: f64,
    /// Sample standard deviation
    pub std: f64,
    /// Bootstrap confidence interval for the mean (lower, upper)
    pub ci: (f64, f64),
    /// Number of trials
    pub sample_count: usize,
}

/// Compute mean of samples
#[allow(clippy::cast_precision_loss)]
pub(crate) fn compute_mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Compute standard deviation of samples
#[allow(clippy::cast_precision_loss)]
pub(crate) fn compute_std(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let mean = compute_mean(samples);
    let variance =
        samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (samples.len() - 1) as f64;
    variance.sqrt()
}

/// Statistical configuration for significance reporting
#[derive(Debug, Clone)]
pub struct StatConfig {
    /// Number of bootstrap resamples
    pub bootstrap_n: usize,
    /// Confidence level (e.g., 0.95)
    pub confidence: f64,
    /// Significance threshold
    pub alpha: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for StatConfig {
    fn default() -> Self {
        Self {
            bootstrap_n: 10_000,
            confidence: 0.95,
            alpha: 0.05,
            seed: 42,
        }
    }
}

/// Percentile bootstrap interval for the mean of `samples`.
///
/// Degenerate inputs (fewer than two samples, zero resamples) collapse to the
/// sample mean. The resampling stream is seeded from `config.seed`, so the
/// interval is a pure function of its inputs.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]
pub fn bootstrap_ci(samples: &[f64], config: &StatConfig) -> (f64, f64) {
    let n = samples.len();
    if n < 2 || config.bootstrap_n == 0 {
        let mean = compute_mean(samples);
        return (mean, mean);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut means: Vec<f64> = (0..config.bootstrap_n)
        .map(|_| (0..n).map(|_| samples[rng.gen_range(0..n)]).sum::<f64>() / n as f64)
        .collect();
    means.sort_by(f64::total_cmp);

    let tail = (1.0 - config.confidence) / 2.0;
    let last = means.len() - 1;
    let at = |q: f64| means[((q * means.len() as f64) as usize).min(last)];
    (at(tail), at(1.0 - tail))
}

/// Cohen's d magnitude buckets (0.2 / 0.5 / 0.8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectSize {
    Negligible,
    Small,
    Medium,
    Large,
}

impl EffectSize {
    #[must_use]
    pub fn from_cohens_d(d: f64) -> Self {
        match d.abs() {
            x if x < 0.2 => Self::Negligible,
            x if x < 0.5 => Self::Small,
            x if x < 0.8 => Self::Medium,
            _ => Self::Large,
        }
    }
}

impl fmt::Display for EffectSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Negligible => "negligible",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        })
    }
}

/// Outcome of a two-sided paired t-test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceResult {
    pub t_statistic: f64,
    pub p_value: f64,
    pub degrees_of_freedom: f64,
    /// `p_value < alpha`
    pub is_significant: bool,
    /// Mean difference over the standard deviation of differences
    pub cohens_d: f64,
    pub effect_size: EffectSize,
}

/// Two-sided paired t-test of `a` against `b` (positive t when `a` is higher).
///
/// `None` when the inputs differ in length, hold fewer than two pairs, or
/// differ by a constant so the statistic is undefined.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn paired_t_test(a: &[f64], b: &[f64], alpha: f64) -> Option<SignificanceResult> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }

    let differences: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - y).collect();
    let mean = compute_mean(&differences);
    let std = compute_std(&differences);
    if std < f64::EPSILON {
        return None;
    }

    let df = (differences.len() - 1) as f64;
    let t_statistic = mean / (std / (differences.len() as f64).sqrt());
    let p_value = 2.0 * StudentsT::new(0.0, 1.0, df).ok()?.sf(t_statistic.abs());
    let cohens_d = mean / std;

    Some(SignificanceResult {
        t_statistic,
        p_value,
        degrees_of_freedom: df,
        is_significant: p_value < alpha,
        cohens_d,
        effect_size: EffectSize::from_cohens_d(cohens_d),
    })
}

/// Per-comparison threshold keeping the family-wise error at `alpha`
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bonferroni_correction(alpha: f64, num_comparisons: usize) -> f64 {
    alpha / num_comparisons.max(1) as f64
}

#[cfg(test)]
#[allow(
    clippy::float_cmp,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::unwrap_used
)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn record(tss: usize, accuracy: f64, auc: f64) -> PerformanceRecord {
        PerformanceRecord::new(tss, ConfusionMatrix::default())
            .with_metric(Metric::Accuracy, accuracy)
            .with_metric(Metric::Auc, auc)
    }

    // =========================================================================
    // Metric and record tests
    // =========================================================================

    #[test]
    fn test_metric_parsing() {
        assert_eq!(Metric::from_str("accuracy").unwrap(), Metric::Accuracy);
        assert_eq!(Metric::from_str("AUC").unwrap(), Metric::Auc);
        assert_eq!(Metric::from_str("roc_auc").unwrap(), Metric::Auc);
        assert_eq!(Metric::from_str("f1_score").unwrap(), Metric::F1);
        assert_eq!(Metric::from_str("recall").unwrap(), Metric::Recall);
        assert!(matches!(
            Metric::from_str("bleu"),
            Err(ConfigError::InvalidMetric(_))
        ));
    }

    #[test]
    fn test_metric_display_matches_serde() {
        for metric in Metric::ALL {
            let json = serde_json::to_string(&metric).unwrap();
            assert_eq!(json, format!("\"{metric}\""));
        }
    }

    #[test]
    fn test_performance_record_get() {
        let r = record(40, 0.8, 0.9);
        assert_eq!(r.get(Metric::Accuracy), Some(0.8));
        assert_eq!(r.get(Metric::F1), None);
        assert_eq!(r.tss, 40);
    }

    #[test]
    fn test_confusion_total() {
        let cm = ConfusionMatrix {
            true_positive: 3,
            false_positive: 1,
            true_negative: 4,
            false_negative: 2,
        };
        assert_eq!(cm.total(), 10);
    }

    // =========================================================================
    // MetricsCollector tests
    // =========================================================================

    #[test]
    fn test_metrics_collector_empty() {
        let collector = MetricsCollector::new();
        assert!(collector.is_empty());
        assert!(collector.values(Metric::Auc).is_empty());
        let agg = collector.compute(Metric::Auc, &StatConfig::default());
        assert_eq!(agg.sample_count, 0);
        assert!(agg.mean.abs() < f64::EPSILON);
    }

    #[test]
    fn test_metrics_collector_with_records() {
        let mut collector = MetricsCollector::new();
        for i in 0..10 {
            collector.record(&record(60, 0.7 + i as f64 * 0.01, 0.8));
        }

        assert_eq!(collector.len(), 10);
        assert_eq!(collector.values(Metric::Accuracy).len(), 10);
        assert_eq!(
            collector.metrics().collect::<Vec<_>>(),
            vec![Metric::Accuracy, Metric::Auc]
        );

        let agg = collector.compute(Metric::Auc, &StatConfig::default());
        assert!((agg.mean - 0.8).abs() < 1e-12);
        assert!(agg.std.abs() < 1e-12);
    }

    // =========================================================================
    // Statistical functions tests
    // =========================================================================

    #[test]
    fn test_compute_std() {
        let samples = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let std = compute_std(&samples);
        // Sample std for this data is ~2.138
        assert!(std > 2.0 && std < 2.2, "std = {std}");
    }

    #[test]
    fn test_compute_std_single() {
        assert!(compute_std(&[5.0]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bootstrap_ci_reproducible() {
        let samples: Vec<f64> = (0..100).map(|i| 0.9 + (i as f64 * 0.001)).collect();
        let config = StatConfig::default();

        let (lower1, upper1) = bootstrap_ci(&samples, &config);
        let (lower2, upper2) = bootstrap_ci(&samples, &config);

        assert!((lower1 - lower2).abs() < f64::EPSILON);
        assert!((upper1 - upper2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bootstrap_ci_contains_mean() {
        let samples: Vec<f64> = (0..1000).map(|i| 0.9 + (i as f64 * 0.0001)).collect();
        let (lower, upper) = bootstrap_ci(&samples, &StatConfig::default());
        let mean = compute_mean(&samples);

        assert!(lower <= mean);
        assert!(upper >= mean);
        assert!(upper - lower < 0.05);
    }

    #[test]
    fn test_bootstrap_ci_single_sample() {
        let (lower, upper) = bootstrap_ci(&[0.95], &StatConfig::default());
        assert!((lower - 0.95).abs() < f64::EPSILON);
        assert!((upper - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_paired_t_test_with_variance() {
        let samples_a: Vec<f64> = (0..100)
            .map(|i| 0.95 + (i as f64 * 0.001) + ((i % 3) as f64 * 0.01))
            .collect();
        let samples_b: Vec<f64> = (0..100)
            .map(|i| 0.85 + (i as f64 * 0.001) + ((i % 5) as f64 * 0.005))
            .collect();

        let result = paired_t_test(&samples_a, &samples_b, 0.05).unwrap();
        assert!(result.is_significant, "p = {}", result.p_value);
        assert!(result.t_statistic > 0.0);
        assert_eq!(result.effect_size, EffectSize::Large);
    }

    #[test]
    fn test_paired_t_test_constant_difference() {
        let samples_a = vec![0.95; 10];
        let samples_b = vec![0.85; 10];
        assert!(paired_t_test(&samples_a, &samples_b, 0.05).is_none());
    }

    #[test]
    fn test_paired_t_test_unequal_length() {
        assert!(paired_t_test(&[0.9, 0.91, 0.92], &[0.8, 0.81], 0.05).is_none());
    }

    #[test]
    fn test_bonferroni_correction() {
        assert!((bonferroni_correction(0.05, 5) - 0.01).abs() < f64::EPSILON);
        assert!((bonferroni_correction(0.05, 0) - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_effect_size_buckets() {
        assert_eq!(EffectSize::from_cohens_d(0.1), EffectSize::Negligible);
        assert_eq!(EffectSize::from_cohens_d(0.3), EffectSize::Small);
        assert_eq!(EffectSize::from_cohens_d(0.6), EffectSize::Medium);
        assert_eq!(EffectSize::from_cohens_d(-0.9), EffectSize::Large);
        assert_eq!(EffectSize::Medium.to_string(), "medium");
    }
}
