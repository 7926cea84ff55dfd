//! Ward-linkage agglomerative clustering used to stratify candidate batches.
//!
//! The dendrogram is built with the nearest-neighbour chain algorithm over
//! squared Euclidean distances (Lance–Williams updates), then cut so that
//! exactly `n_clusters` groups remain. Ward linkage is reducible, so sorting the
//! chain's merges by height yields the same hierarchy as the naive greedy
//! algorithm in O(M²) time instead of O(M³).

use crate::data::Features;
use crate::error::{ExperimentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// One-based cluster identifier, valid within a single clustering call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub usize);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single dendrogram merge between the clusters living in slots `a` and `b`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Merge {
    a: usize,
    b: usize,
    /// Ward merge cost on the squared-distance scale
    height: f64,
}

/// Partition `points` into exactly `n_clusters` groups.
///
/// Returns one [`ClusterId`] per point, drawn from `1..=n_clusters`, numbered by
/// first appearance in input order. When fewer points than clusters are given
/// the cluster count falls back to the number of points, so every point ends up
/// in its own cluster.
///
/// # Errors
///
/// - `InvalidInput` if `points` is empty, `n_clusters` is zero, or a feature is
///   not finite.
/// - `FeatureMismatch` if the points do not share one dimension.
pub fn cluster_ward(points: &[&Features], n_clusters: usize) -> Result<Vec<ClusterId>> {
    let Some(first) = points.first() else {
        return Err(ExperimentError::InvalidInput(
            "cannot cluster an empty candidate set".to_string(),
        ));
    };
    if n_clusters == 0 {
        return Err(ExperimentError::InvalidInput(
            "cluster count must be positive".to_string(),
        ));
    }

    let dim = first.dim();
    for (idx, point) in points.iter().enumerate() {
        if point.dim() != dim {
            return Err(ExperimentError::FeatureMismatch {
                id: format!("candidate #{idx}"),
                expected: dim,
                found: point.dim(),
            });
        }
        if point.as_slice().iter().any(|v| !v.is_finite()) {
            return Err(ExperimentError::InvalidInput(format!(
                "candidate #{idx} has non-finite features"
            )));
        }
    }

    let m = points.len();
    let k = n_clusters.min(m);
    if k < n_clusters {
        debug!(
            requested = n_clusters,
            effective = k,
            "Fewer candidates than clusters, reducing cluster count"
        );
    }

    let mut merges = ward_linkage(points);
    // Stable: equal heights keep chain order.
    merges.sort_by(|x, y| x.height.total_cmp(&y.height));

    let mut sets = DisjointSets::new(m);
    for merge in merges.iter().take(m - k) {
        sets.union(merge.a, merge.b);
    }

    let mut ids: HashMap<usize, usize> = HashMap::with_capacity(k);
    let labels = (0..m)
        .map(|i| {
            let root = sets.find(i);
            let next = ids.len() + 1;
            ClusterId(*ids.entry(root).or_insert(next))
        })
        .collect();

    Ok(labels)
}

/// Full Ward dendrogram via the nearest-neighbour chain.
///
/// A merged cluster keeps the lower of its two slot indices, so slot `i`
/// always contains point `i` and merges can be replayed on point indices.
#[allow(clippy::cast_precision_loss)]
fn ward_linkage(points: &[&Features]) -> Vec<Merge> {
    let m = points.len();
    let mut dist = vec![0.0_f64; m * m];
    for i in 0..m {
        for j in (i + 1)..m {
            let d = points[i].squared_distance(points[j]);
            dist[i * m + j] = d;
            dist[j * m + i] = d;
        }
    }

    let mut size = vec![1_usize; m];
    let mut active = vec![true; m];
    let mut chain: Vec<usize> = Vec::with_capacity(m);
    let mut merges = Vec::with_capacity(m.saturating_sub(1));

    for _ in 1..m {
        if chain.is_empty() {
            if let Some(start) = active.iter().position(|&a| a) {
                chain.push(start);
            }
        }

        let (a, b) = loop {
            let Some(&a) = chain.last() else {
                return merges;
            };
            let prev = chain.len().checked_sub(2).map(|i| chain[i]);

            // Seeding with the previous chain element makes ties resolve
            // towards it, which guarantees the chain terminates.
            let mut nearest = prev.map(|p| (p, dist[a * m + p]));
            for x in (0..m).filter(|&x| x != a && active[x]) {
                let d = dist[a * m + x];
                if nearest.map_or(true, |(_, best)| d < best) {
                    nearest = Some((x, d));
                }
            }

            match nearest {
                Some((b, _)) if Some(b) == prev => {
                    chain.truncate(chain.len() - 2);
                    break (a, b);
                }
                Some((b, _)) => chain.push(b),
                None => return merges,
            }
        };

        let (keep, gone) = (a.min(b), a.max(b));
        let height = dist[keep * m + gone];
        let (size_keep, size_gone) = (size[keep] as f64, size[gone] as f64);

        for k in (0..m).filter(|&k| active[k] && k != keep && k != gone) {
            let size_k = size[k] as f64;
            let updated = ((size_keep + size_k) * dist[keep * m + k]
                + (size_gone + size_k) * dist[gone * m + k]
                - size_k * height)
                / (size_keep + size_gone + size_k);
            dist[keep * m + k] = updated;
            dist[k * m + keep] = updated;
        }

        size[keep] += size[gone];
        active[gone] = false;
        merges.push(Merge {
            a: keep,
            b: gone,
            height,
        });
    }

    merges
}

/// Union-find over point indices
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn features(rows: &[&[f64]]) -> Vec<Features> {
        rows.iter().map(|r| Features::new(r.to_vec())).collect()
    }

    fn refs(points: &[Features]) -> Vec<&Features> {
        points.iter().collect()
    }

    fn distinct(labels: &[ClusterId]) -> HashSet<ClusterId> {
        labels.iter().copied().collect()
    }

    // =========================================================================
    // Partition shape
    // =========================================================================

    #[test]
    fn test_well_separated_groups() {
        let points = features(&[
            &[0.0, 0.0],
            &[0.1, 0.1],
            &[0.0, 0.1],
            &[100.0, 100.0],
            &[100.1, 100.1],
            &[100.0, 100.1],
        ]);
        let labels = cluster_ward(&refs(&points), 2).unwrap();

        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn test_ward_on_a_line() {
        let points = features(&[&[0.0], &[1.0], &[5.0], &[6.0], &[20.0]]);

        let three = cluster_ward(&refs(&points), 3).unwrap();
        assert_eq!(
            three,
            vec![ClusterId(1), ClusterId(1), ClusterId(2), ClusterId(2), ClusterId(3)]
        );

        let two = cluster_ward(&refs(&points), 2).unwrap();
        assert_eq!(
            two,
            vec![ClusterId(1), ClusterId(1), ClusterId(1), ClusterId(1), ClusterId(2)]
        );
    }

    #[test]
    fn test_exactly_n_clusters_for_every_cut() {
        let points: Vec<Features> = (0..40)
            .map(|i| {
                let x = f64::from(i);
                Features::new(vec![(x * 0.37).sin() * 10.0, (x * 1.3).cos() * 3.0])
            })
            .collect();
        let points = refs(&points);

        for n in 1..=40 {
            let labels = cluster_ward(&points, n).unwrap();
            assert_eq!(labels.len(), 40);
            let ids = distinct(&labels);
            assert_eq!(ids.len(), n, "cut at {n}");
            assert!(ids.iter().all(|c| (1..=n).contains(&c.0)));
        }
    }

    #[test]
    fn test_ids_numbered_by_first_appearance() {
        let points = features(&[&[50.0], &[0.0], &[50.5], &[0.5], &[100.0]]);
        let labels = cluster_ward(&refs(&points), 3).unwrap();
        assert_eq!(labels[0], ClusterId(1));
        assert_eq!(labels[1], ClusterId(2));
        assert_eq!(labels[4], ClusterId(3));
    }

    #[test]
    fn test_fewer_points_than_clusters() {
        let points = features(&[&[1.0], &[2.0], &[3.0]]);
        let labels = cluster_ward(&refs(&points), 10).unwrap();
        assert_eq!(labels, vec![ClusterId(1), ClusterId(2), ClusterId(3)]);
    }

    #[test]
    fn test_identical_points() {
        let points: Vec<Features> = (0..8).map(|_| Features::new(vec![1.0, 1.0])).collect();
        let labels = cluster_ward(&refs(&points), 3).unwrap();
        assert_eq!(distinct(&labels).len(), 3);
    }

    #[test]
    fn test_single_point() {
        let points = features(&[&[4.0, 2.0]]);
        assert_eq!(cluster_ward(&refs(&points), 1).unwrap(), vec![ClusterId(1)]);
    }

    #[test]
    fn test_deterministic() {
        let points: Vec<Features> = (0..60)
            .map(|i| Features::new(vec![f64::from(i % 7), f64::from(i % 5)]))
            .collect();
        let a = cluster_ward(&refs(&points), 9).unwrap();
        let b = cluster_ward(&refs(&points), 9).unwrap();
        assert_eq!(a, b);
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn test_empty_input() {
        let err = cluster_ward(&[], 2).unwrap_err();
        assert!(matches!(err, ExperimentError::InvalidInput(_)));
    }

    #[test]
    fn test_zero_clusters() {
        let points = features(&[&[1.0]]);
        let err = cluster_ward(&refs(&points), 0).unwrap_err();
        assert!(matches!(err, ExperimentError::InvalidInput(_)));
    }

    #[test]
    fn test_dimension_mismatch() {
        let points = features(&[&[1.0, 2.0], &[1.0]]);
        let err = cluster_ward(&refs(&points), 1).unwrap_err();
        assert!(matches!(
            err,
            ExperimentError::FeatureMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_non_finite_features() {
        let points = features(&[&[1.0], &[f64::NAN]]);
        let err = cluster_ward(&refs(&points), 1).unwrap_err();
        assert!(matches!(err, ExperimentError::InvalidInput(_)));
    }
}
