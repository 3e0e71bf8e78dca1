//! Materialized kNN index.
//!
//! The only artifact handed back to callers: one sorted neighbor list per
//! point, plus how the lists were obtained. Immutable after construction, so
//! it is safe to share across threads without locking.

use crate::neighbors::{NeighborEntry, UNBOUNDED};
use crate::{KnnError, PointId, Result};
use std::time::Duration;

/// How an index was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// Refinement stopped because updates fell below `delta * k * n`.
    Converged,
    /// The iteration cap was hit first; lists may be of lower quality.
    Unconverged,
    /// Exact lists from a brute-force scan.
    Exact,
}

/// Counters for a single refine iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationStats {
    /// 1-based iteration number.
    pub iteration: usize,
    /// Successful inserts (`Added` or `Replaced`) during the iteration.
    pub updates: usize,
    /// Distance evaluations during the iteration.
    pub distance_evaluations: u64,
    /// Sum of every point's worst distance at the end of the iteration.
    pub bound_sum: f64,
}

/// Statistics of a whole build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildStats {
    /// Per-iteration counters, in order.
    pub iterations: Vec<IterationStats>,
    /// Distance evaluations including initialization.
    pub distance_evaluations: u64,
    /// Wall-clock build time.
    pub elapsed: Duration,
}

impl BuildStats {
    /// Number of refine iterations run.
    pub fn num_iterations(&self) -> usize {
        self.iterations.len()
    }

    /// Distance evaluations relative to the `n * (n - 1) / 2` pairs of an
    /// exhaustive scan.
    pub fn scan_rate(&self, n: usize) -> f64 {
        if n < 2 {
            return 0.0;
        }
        let pairs = n as f64 * (n as f64 - 1.0) / 2.0;
        self.distance_evaluations as f64 / pairs
    }
}

/// Immutable per-point kNN lists.
///
/// Lists from NN-Descent are approximate: they never beat the exact
/// k-distance, but on tiny datasets with small `k` a point can keep a
/// neighbor that is not its true nearest. [`KnnIndex::recall_against`]
/// measures the gap against a brute-force index.
#[derive(Debug, Clone)]
pub struct KnnIndex {
    /// `lists[p]` = neighbors of `p`, ascending by distance.
    lists: Vec<Vec<NeighborEntry>>,
    k: usize,
    status: BuildStatus,
    stats: BuildStats,
}

impl KnnIndex {
    pub(crate) fn new(
        lists: Vec<Vec<NeighborEntry>>,
        k: usize,
        status: BuildStatus,
        stats: BuildStats,
    ) -> Self {
        Self {
            lists,
            k,
            status,
            stats,
        }
    }

    /// Neighbors of `point`, ascending by distance (at most `k`).
    ///
    /// # Errors
    ///
    /// [`KnnError::NotFound`] if `point` was not part of the dataset.
    pub fn neighbors_of(&self, point: PointId) -> Result<&[NeighborEntry]> {
        self.lists
            .get(point as usize)
            .map(Vec::as_slice)
            .ok_or(KnnError::NotFound(point))
    }

    /// The `min(k, self.k())` nearest neighbors of `point`.
    pub fn knn(&self, point: PointId, k: usize) -> Result<&[NeighborEntry]> {
        let list = self.neighbors_of(point)?;
        Ok(&list[..k.min(list.len())])
    }

    /// Distance to the k-th neighbor, or [`UNBOUNDED`] if `point` has fewer
    /// than `k` neighbors.
    pub fn knn_distance(&self, point: PointId) -> Result<f64> {
        let list = self.neighbors_of(point)?;
        if list.len() < self.k {
            return Ok(UNBOUNDED);
        }
        Ok(list.last().map(|e| e.distance).unwrap_or(UNBOUNDED))
    }

    /// Iterate over `(point, neighbors)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (PointId, &[NeighborEntry])> {
        self.lists
            .iter()
            .enumerate()
            .map(|(i, list)| (i as PointId, list.as_slice()))
    }

    /// Mean fraction of `reference`'s neighbor ids also present here.
    ///
    /// Points with an empty reference list count as fully recalled.
    ///
    /// # Errors
    ///
    /// [`KnnError::InvalidParameter`] if the indices cover different datasets.
    pub fn recall_against(&self, reference: &KnnIndex) -> Result<f64> {
        if self.len() != reference.len() {
            return Err(KnnError::InvalidParameter(format!(
                "cannot compare indices of {} and {} points",
                self.len(),
                reference.len()
            )));
        }
        if self.is_empty() {
            return Ok(1.0);
        }

        let total: f64 = self
            .lists
            .iter()
            .zip(&reference.lists)
            .map(|(ours, truth)| {
                if truth.is_empty() {
                    return 1.0;
                }
                let hits = truth
                    .iter()
                    .filter(|t| ours.iter().any(|o| o.id == t.id))
                    .count();
                hits as f64 / truth.len() as f64
            })
            .sum();

        Ok(total / self.len() as f64)
    }

    /// Neighbors per point.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Dataset size.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// How the index was obtained.
    pub fn status(&self) -> BuildStatus {
        self.status
    }

    /// Whether refinement met the delta threshold (exact indices count too).
    pub fn is_converged(&self) -> bool {
        self.status != BuildStatus::Unconverged
    }

    /// Build statistics.
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }
}
