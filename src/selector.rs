//! Diversity-aware uncertainty sampling.
//!
//! One selection call presamples the candidate pool, scores every presampled
//! example by predictive entropy, clusters the presample on its features and
//! keeps the most uncertain example of each cluster.
//!
//! Tie-breaking: when several members of a cluster share the maximum entropy,
//! the one that comes first in candidate-pool order wins. The presample is
//! always kept in pool order, so a fixed seed reproduces the same batch.

use crate::cluster::{cluster_ward, ClusterId};
use crate::config::ExperimentConfig;
use crate::data::{Example, ExampleId, Features};
use crate::entropy::entropy;
use crate::error::{ExperimentError, Result, TrainingError};
use crate::model::Model;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// An example annotated with its uncertainty and cluster for one selection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub example: Example,
    /// Predictive entropy under the model that produced this batch
    pub entropy: f64,
    pub cluster: ClusterId,
}

/// The examples chosen by one selection call, ordered by cluster id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionBatch {
    candidates: Vec<ScoredCandidate>,
    presampled: Vec<ExampleId>,
    requested: usize,
}

impl SelectionBatch {
    /// Chosen candidates
    #[must_use]
    pub fn candidates(&self) -> &[ScoredCandidate] {
        &self.candidates
    }

    /// Identifiers of the chosen examples
    pub fn ids(&self) -> impl Iterator<Item = ExampleId> + '_ {
        self.candidates.iter().map(|c| c.example.id())
    }

    /// Identifiers of every presampled candidate, selected or not
    #[must_use]
    pub fn presampled(&self) -> &[ExampleId] {
        &self.presampled
    }

    /// Batch size asked for
    #[must_use]
    pub const fn requested(&self) -> usize {
        self.requested
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// True when the batch came out smaller than requested
    #[must_use]
    pub fn is_reduced(&self) -> bool {
        self.candidates.len() < self.requested
    }

    /// Mean entropy of the chosen examples
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_entropy(&self) -> f64 {
        if self.candidates.is_empty() {
            return 0.0;
        }
        self.candidates.iter().map(|c| c.entropy).sum::<f64>() / self.candidates.len() as f64
    }

    /// Reveal the chosen examples (with their oracle labels)
    pub fn examples(&self) -> impl Iterator<Item = &Example> {
        self.candidates.iter().map(|c| &c.example)
    }
}

/// Picks the next batch to label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseSelector {
    batch_size: usize,
    presample_size: usize,
}

impl CaseSelector {
    /// Create a selector returning up to `batch_size` examples per call
    #[must_use]
    pub const fn new(batch_size: usize, presample_size: usize) -> Self {
        Self {
            batch_size,
            presample_size,
        }
    }

    #[must_use]
    pub const fn from_config(config: &ExperimentConfig) -> Self {
        Self::new(
            config.examples_to_label_per_iteration,
            config.presample_size,
        )
    }

    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub const fn presample_size(&self) -> usize {
        self.presample_size
    }

    /// Select one maximum-entropy example per Ward cluster of a random presample.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `pool` is empty or the batch size is zero.
    /// - `FeatureMismatch` if a candidate's dimension differs from the model's.
    /// - `TrainingFailure` if the model cannot score the presample or returns a
    ///   non-finite probability.
    pub fn select<M, R>(&self, model: &M, pool: &[&Example], rng: &mut R) -> Result<SelectionBatch>
    where
        M: Model + ?Sized,
        R: Rng + ?Sized,
    {
        if pool.is_empty() {
            return Err(ExperimentError::InvalidInput(
                "candidate pool is empty".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ExperimentError::InvalidInput(
                "batch size must be positive".to_string(),
            ));
        }

        let expected = model.n_features();
        if let Some(bad) = pool.iter().find(|e| e.features().dim() != expected) {
            return Err(ExperimentError::FeatureMismatch {
                id: bad.id().to_string(),
                expected,
                found: bad.features().dim(),
            });
        }

        let amount = pool.len().min(self.presample_size);
        let mut picked = rand::seq::index::sample(rng, pool.len(), amount).into_vec();
        picked.sort_unstable();
        let presample: Vec<&Example> = picked.into_iter().map(|i| pool[i]).collect();

        let features: Vec<&Features> = presample.iter().map(|e| e.features()).collect();
        let probabilities = model.predict_proba(&features)?;
        if probabilities.len() != presample.len() {
            return Err(TrainingError::Other(format!(
                "model returned {} probability vectors for {} inputs",
                probabilities.len(),
                presample.len()
            ))
            .into());
        }
        if let Some(pos) = probabilities
            .iter()
            .position(|p| p.iter().any(|v| !v.is_finite()))
        {
            return Err(TrainingError::Other(format!(
                "model returned non-finite probabilities for example {}",
                presample[pos].id()
            ))
            .into());
        }
        let entropies: Vec<f64> = probabilities.iter().map(|p| entropy(p)).collect();

        let clusters = cluster_ward(&features, self.batch_size)?;

        // Strict `>` keeps the first maximum in pool order.
        let mut best: BTreeMap<ClusterId, usize> = BTreeMap::new();
        for (pos, &cluster) in clusters.iter().enumerate() {
            match best.get(&cluster) {
                Some(&current) if entropies[pos] <= entropies[current] => {}
                _ => {
                    best.insert(cluster, pos);
                }
            }
        }

        let candidates: Vec<ScoredCandidate> = best
            .into_iter()
            .map(|(cluster, pos)| ScoredCandidate {
                example: presample[pos].clone(),
                entropy: entropies[pos],
                cluster,
            })
            .collect();

        debug!(
            pool = pool.len(),
            presampled = presample.len(),
            selected = candidates.len(),
            "Selected batch"
        );

        Ok(SelectionBatch {
            candidates,
            presampled: presample.iter().map(|e| e.id()).collect(),
            requested: self.batch_size,
        })
    }
}

/// Select up to `n` examples from `pool`; see [`CaseSelector::select`].
///
/// # Errors
///
/// Same as [`CaseSelector::select`].
pub fn select<M, R>(
    model: &M,
    pool: &[&Example],
    n: usize,
    presample_size: usize,
    rng: &mut R,
) -> Result<SelectionBatch>
where
    M: Model + ?Sized,
    R: Rng + ?Sized,
{
    CaseSelector::new(n, presample_size).select(model, pool, rng)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_precision_loss, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::data::Label;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    /// Positive-class probability read straight from the second feature
    #[derive(Debug)]
    struct FixedModel {
        dim: usize,
    }

    impl Model for FixedModel {
        fn n_features(&self) -> usize {
            self.dim
        }

        fn predict_proba(&self, inputs: &[&Features]) -> Result<Vec<Vec<f64>>, TrainingError> {
            Ok(inputs
                .iter()
                .map(|f| {
                    let p = f.as_slice()[1];
                    vec![1.0 - p, p]
                })
                .collect())
        }
    }

    /// Diverged on every input whose first feature is `bad_x`
    #[derive(Debug)]
    struct DivergedModel {
        bad_x: f64,
    }

    impl Model for DivergedModel {
        fn n_features(&self) -> usize {
            2
        }

        fn predict_proba(&self, inputs: &[&Features]) -> Result<Vec<Vec<f64>>, TrainingError> {
            Ok(inputs
                .iter()
                .map(|f| {
                    if f.as_slice()[0] == self.bad_x {
                        vec![f64::NAN, f64::NAN]
                    } else {
                        vec![0.5, 0.5]
                    }
                })
                .collect())
        }
    }

    fn example(id: u64, x: f64, p: f64) -> Example {
        Example::new(ExampleId(id), Features::new(vec![x, p]), Label::Negative)
    }

    fn grid_pool(n: u64) -> Vec<Example> {
        (0..n)
            .map(|i| example(i, i as f64, (i % 10) as f64 / 10.0))
            .collect()
    }

    // =========================================================================
    // Selection behaviour
    // =========================================================================

    #[test]
    fn test_picks_most_uncertain_per_cluster() {
        // Two far-apart groups; the 0.5 member of each is the most uncertain.
        let pool = vec![
            example(1, 0.0, 0.9),
            example(2, 0.1, 0.5),
            example(3, 0.2, 0.99),
            example(4, 100.0, 0.05),
            example(5, 100.1, 0.45),
            example(6, 100.2, 0.01),
        ];
        let refs: Vec<&Example> = pool.iter().collect();
        let model = FixedModel { dim: 2 };
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let batch = select(&model, &refs, 2, 100, &mut rng).unwrap();
        let ids: Vec<ExampleId> = batch.ids().collect();
        assert_eq!(ids, vec![ExampleId(2), ExampleId(5)]);
        assert_eq!(batch.candidates()[0].cluster, ClusterId(1));
        assert_eq!(batch.candidates()[1].cluster, ClusterId(2));
        assert!(!batch.is_reduced());
    }

    #[test]
    fn test_tie_breaks_on_pool_order() {
        let pool = vec![
            example(10, 0.0, 0.5),
            example(11, 0.1, 0.5),
            example(12, 0.2, 0.5),
        ];
        let refs: Vec<&Example> = pool.iter().collect();
        let model = FixedModel { dim: 2 };
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let batch = select(&model, &refs, 1, 100, &mut rng).unwrap();
        assert_eq!(batch.ids().collect::<Vec<_>>(), vec![ExampleId(10)]);
    }

    #[test]
    fn test_never_more_than_n_and_distinct() {
        let pool = grid_pool(300);
        let refs: Vec<&Example> = pool.iter().collect();
        let model = FixedModel { dim: 2 };
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        for n in [1, 7, 20, 50] {
            let batch = select(&model, &refs, n, 120, &mut rng).unwrap();
            assert!(batch.len() <= n);
            assert_eq!(batch.len(), n);
            let unique: HashSet<ExampleId> = batch.ids().collect();
            assert_eq!(unique.len(), batch.len());
        }
    }

    #[test]
    fn test_presample_without_replacement() {
        let pool = grid_pool(500);
        let refs: Vec<&Example> = pool.iter().collect();
        let model = FixedModel { dim: 2 };
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        let batch = select(&model, &refs, 10, 120, &mut rng).unwrap();
        assert_eq!(batch.presampled().len(), 120);
        let unique: HashSet<&ExampleId> = batch.presampled().iter().collect();
        assert_eq!(unique.len(), 120);
        let presampled: HashSet<ExampleId> = batch.presampled().iter().copied().collect();
        assert!(batch.ids().all(|id| presampled.contains(&id)));
    }

    #[test]
    fn test_presample_capped_by_pool() {
        let pool = grid_pool(30);
        let refs: Vec<&Example> = pool.iter().collect();
        let model = FixedModel { dim: 2 };
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        let batch = select(&model, &refs, 5, 1000, &mut rng).unwrap();
        assert_eq!(batch.presampled().len(), 30);
    }

    #[test]
    fn test_degenerate_pool_smaller_than_n() {
        let pool = grid_pool(3);
        let refs: Vec<&Example> = pool.iter().collect();
        let model = FixedModel { dim: 2 };
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let batch = select(&model, &refs, 10, 100, &mut rng).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch.is_reduced());
        assert_eq!(batch.requested(), 10);
    }

    #[test]
    fn test_reproducible_with_seed() {
        let pool = grid_pool(400);
        let refs: Vec<&Example> = pool.iter().collect();
        let model = FixedModel { dim: 2 };

        let a = select(&model, &refs, 15, 100, &mut ChaCha8Rng::seed_from_u64(77)).unwrap();
        let b = select(&model, &refs, 15, 100, &mut ChaCha8Rng::seed_from_u64(77)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mean_entropy() {
        let pool = vec![example(1, 0.0, 0.5)];
        let refs: Vec<&Example> = pool.iter().collect();
        let model = FixedModel { dim: 2 };
        let batch = select(&model, &refs, 1, 1, &mut ChaCha8Rng::seed_from_u64(0)).unwrap();
        assert!((batch.mean_entropy() - 2.0_f64.ln()).abs() < 1e-12);
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn test_empty_pool() {
        let model = FixedModel { dim: 2 };
        let err = select(&model, &[], 5, 10, &mut ChaCha8Rng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, ExperimentError::InvalidInput(_)));
    }

    #[test]
    fn test_zero_batch() {
        let pool = grid_pool(5);
        let refs: Vec<&Example> = pool.iter().collect();
        let model = FixedModel { dim: 2 };
        let err = select(&model, &refs, 0, 10, &mut ChaCha8Rng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, ExperimentError::InvalidInput(_)));
    }

    #[test]
    fn test_feature_mismatch() {
        let pool = grid_pool(5);
        let refs: Vec<&Example> = pool.iter().collect();
        let model = FixedModel { dim: 3 };
        let err = select(&model, &refs, 2, 10, &mut ChaCha8Rng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(
            err,
            ExperimentError::FeatureMismatch {
                expected: 3,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_non_finite_probabilities_rejected() {
        let pool = grid_pool(10);
        let refs: Vec<&Example> = pool.iter().collect();
        let model = DivergedModel { bad_x: 3.0 };
        let err = select(&model, &refs, 2, 100, &mut ChaCha8Rng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(
            err,
            ExperimentError::TrainingFailure(TrainingError::Other(_))
        ));
        assert!(err.to_string().contains("non-finite"));
    }
}
