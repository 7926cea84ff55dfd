//! Bundled collaborators: a logistic-regression trainer and a binary evaluator.
//!
//! Both wrap `aprender`: the trainer fits [`LogisticRegression`] on an
//! `f32` feature matrix, and the evaluator scores predictions with
//! `aprender::metrics::classification`. Any other model family can be
//! swapped in through the [`Trainer`], [`Model`] and [`Evaluator`] traits.

use crate::data::{Example, Features, Label};
use crate::error::TrainingError;
use crate::metrics::{ConfusionMatrix, Metric, PerformanceRecord};
use crate::model::{Evaluator, Model, Trainer};
use aprender::classification::LogisticRegression;
use aprender::metrics::classification::{
    accuracy, confusion_matrix, f1_score, precision, recall, Average,
};
use aprender::Matrix;
use serde::{Deserialize, Serialize};

/// Row-major `f32` matrix over the given feature vectors.
///
/// Callers guarantee every row has `n_features` columns.
#[allow(clippy::cast_possible_truncation)]
fn to_matrix(rows: &[&Features], n_features: usize) -> Result<Matrix<f32>, TrainingError> {
    let data: Vec<f32> = rows
        .iter()
        .flat_map(|f| f.as_slice().iter().map(|&v| v as f32))
        .collect();
    Matrix::from_vec(rows.len(), n_features, data)
        .map_err(|e| TrainingError::Other(format!("feature matrix: {e}")))
}

/// Gradient-descent logistic regression backed by `aprender`.
///
/// Weights start at zero, so fitting is fully deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegressionTrainer {
    /// Learning rate for gradient descent
    pub learning_rate: f32,
    /// Maximum number of iterations
    pub max_iter: usize,
    /// Convergence tolerance on every gradient component
    pub tol: f32,
}

impl Default for LogisticRegressionTrainer {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_iter: 500,
            tol: 1e-4,
        }
    }
}

impl LogisticRegressionTrainer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the learning rate.
    #[must_use]
    pub const fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Sets the maximum number of iterations.
    #[must_use]
    pub const fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Sets the convergence tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tol: f32) -> Self {
        self.tol = tol;
        self
    }
}

impl Trainer for LogisticRegressionTrainer {
    type Model = LogisticModel;

    fn fit(&self, training: &[Example]) -> Result<LogisticModel, TrainingError> {
        let Some(first) = training.first() else {
            return Err(TrainingError::EmptyTrainingSet);
        };
        if training.iter().all(|e| e.label() == first.label()) {
            return Err(TrainingError::SingleClass(first.label().into()));
        }

        let n_features = first.features().dim();
        for example in training {
            if example.features().dim() != n_features {
                return Err(TrainingError::DimensionMismatch {
                    expected: n_features,
                    found: example.features().dim(),
                });
            }
        }

        let rows: Vec<&Features> = training.iter().map(Example::features).collect();
        let x = to_matrix(&rows, n_features)?;
        let y: Vec<usize> = training.iter().map(|e| e.label().index()).collect();

        let mut inner = LogisticRegression::new()
            .with_learning_rate(self.learning_rate)
            .with_max_iter(self.max_iter)
            .with_tolerance(self.tol);
        inner
            .fit(&x, &y)
            .map_err(|e| TrainingError::Other(format!("logistic regression: {e}")))?;

        Ok(LogisticModel::from_fitted(inner, n_features))
    }
}

/// Fitted logistic-regression model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    inner: LogisticRegression,
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LogisticModel {
    fn from_fitted(inner: LogisticRegression, n_features: usize) -> Self {
        let coefficients = inner
            .coefficients()
            .as_slice()
            .iter()
            .take(n_features)
            .map(|&w| f64::from(w))
            .collect();
        let intercept = f64::from(inner.intercept());
        Self {
            inner,
            coefficients,
            intercept,
        }
    }

    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    #[must_use]
    pub const fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl PartialEq for LogisticModel {
    fn eq(&self, other: &Self) -> bool {
        self.coefficients == other.coefficients && self.intercept == other.intercept
    }
}

impl Model for LogisticModel {
    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict_proba(&self, inputs: &[&Features]) -> Result<Vec<Vec<f64>>, TrainingError> {
        if let Some(bad) = inputs.iter().find(|f| f.dim() != self.n_features()) {
            return Err(TrainingError::DimensionMismatch {
                expected: self.n_features(),
                found: bad.dim(),
            });
        }
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let x = to_matrix(inputs, self.n_features())?;
        let positive = self.inner.predict_proba(&x);
        Ok(positive
            .as_slice()
            .iter()
            .map(|&p| {
                let p = f64::from(p);
                vec![1.0 - p, p]
            })
            .collect())
    }
}

/// Threshold-based binary evaluator reporting every [`Metric`].
///
/// Precision, recall and F1 are macro-averaged over both classes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BinaryEvaluator {
    /// Positive-class probability at or above which a prediction is positive
    pub threshold: f64,
}

impl Default for BinaryEvaluator {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl<M: Model> Evaluator<M> for BinaryEvaluator {
    fn evaluate(
        &self,
        model: &M,
        test: &[Example],
        tss: usize,
    ) -> Result<PerformanceRecord, TrainingError> {
        if test.is_empty() {
            return Err(TrainingError::EmptyEvaluationSet);
        }

        let inputs: Vec<&Features> = test.iter().map(Example::features).collect();
        let probabilities = model.predict_proba(&inputs)?;

        let scores: Vec<f64> = probabilities
            .iter()
            .map(|p| p.get(Label::Positive.index()).copied().unwrap_or(0.0))
            .collect();
        let labels: Vec<Label> = test.iter().map(Example::label).collect();
        let y_true: Vec<usize> = labels.iter().map(|l| l.index()).collect();
        let y_pred: Vec<usize> = scores
            .iter()
            .map(|&s| {
                if s >= self.threshold {
                    Label::Positive.index()
                } else {
                    Label::Negative.index()
                }
            })
            .collect();

        let cm = confusion_matrix(&y_pred, &y_true);
        // The matrix shrinks to 1x1 when only the negative class occurs.
        let cell = |t: Label, p: Label| {
            let (t, p) = (t.index(), p.index());
            if t < cm.n_rows() && p < cm.n_cols() {
                cm.get(t, p)
            } else {
                0
            }
        };
        let confusion = ConfusionMatrix {
            true_positive: cell(Label::Positive, Label::Positive),
            false_positive: cell(Label::Negative, Label::Positive),
            true_negative: cell(Label::Negative, Label::Negative),
            false_negative: cell(Label::Positive, Label::Negative),
        };

        Ok(PerformanceRecord::new(tss, confusion)
            .with_metric(Metric::Accuracy, f64::from(accuracy(&y_pred, &y_true)))
            .with_metric(Metric::Auc, roc_auc(&scores, &labels))
            .with_metric(
                Metric::Precision,
                f64::from(precision(&y_pred, &y_true, Average::Macro)),
            )
            .with_metric(
                Metric::Recall,
                f64::from(recall(&y_pred, &y_true, Average::Macro)),
            )
            .with_metric(
                Metric::F1,
                f64::from(f1_score(&y_pred, &y_true, Average::Macro)),
            ))
    }
}

/// Area under the ROC curve via the Mann–Whitney rank statistic.
///
/// Tied scores receive their average rank. Returns 0.5 when either class is
/// absent, since no ranking can be measured.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn roc_auc(scores: &[f64], labels: &[Label]) -> f64 {
    let n_pos = labels.iter().filter(|&&l| l == Label::Positive).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; the tie group spans ranks start+1 ..= end.
        let average_rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            if labels[idx] == Label::Positive {
                positive_rank_sum += average_rank;
            }
        }
        start = end;
    }

    let (n_pos, n_neg) = (n_pos as f64, n_neg as f64);
    (positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}
