//! Collaborator seams: training, prediction and evaluation.
//!
//! The selection engine never looks inside a model. Anything that can be fitted
//! on a slice of [`Example`]s and return class probabilities plugs in here; see
//! [`crate::classifier`] for the bundled logistic-regression implementation.

use crate::data::{Example, Features};
use crate::error::TrainingError;
use crate::metrics::PerformanceRecord;
use std::fmt::Debug;

/// A fitted classifier
pub trait Model: Debug + Send + Sync {
    /// Feature dimension the model was trained on
    fn n_features(&self) -> usize;

    /// Class-probability vector for each input, in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if an input has the wrong dimension or prediction fails.
    fn predict_proba(&self, inputs: &[&Features]) -> Result<Vec<Vec<f64>>, TrainingError>;
}

/// Produces a [`Model`] from a labeled training set.
///
/// Implementations must be deterministic: fitting the same examples twice
/// yields equivalent models.
pub trait Trainer: Sync {
    type Model: Model;

    /// Fit a model
    ///
    /// # Errors
    ///
    /// Returns an error if the training set is unusable (e.g. empty or
    /// single-class) or the fit itself fails.
    fn fit(&self, training: &[Example]) -> Result<Self::Model, TrainingError>;
}

/// Scores a model against a fixed labeled test set
pub trait Evaluator<M: Model>: Sync {
    /// Evaluate `model`, which was trained on `tss` examples
    ///
    /// # Errors
    ///
    /// Returns an error if prediction fails or the test set is empty.
    fn evaluate(
        &self,
        model: &M,
        test: &[Example],
        tss: usize,
    ) -> Result<PerformanceRecord, TrainingError>;
}
