//! Exact kNN by exhaustive scan.
//!
//! Evaluates all `n * (n - 1) / 2` pairs once. O(n²) distance calls, so only
//! practical for small datasets, but it is the ground truth that NN-Descent
//! results are measured against.

use crate::index::{BuildStats, BuildStatus, KnnIndex};
use crate::table::NeighborTable;
use crate::traits::{CountingSpace, Space};
use crate::{KnnError, PointId, Result};
use std::time::Instant;

/// Build the exact kNN index of `space`.
///
/// Every point keeps its `min(k, n - 1)` nearest other points. Ties at the
/// k-th distance keep whichever point was seen first (lowest id).
///
/// # Errors
///
/// - [`KnnError::InvalidParameter`] if `k == 0` or the space is empty
/// - [`KnnError::Distance`] if the distance function fails
///
/// # Example
///
/// ```
/// use nori_knn::{brute_force_index, BuildStatus, FnSpace};
///
/// let xs = [0.0_f64, 1.0, 3.0];
/// let space = FnSpace::new(xs.len(), |a, b| Ok((xs[a as usize] - xs[b as usize]).abs()));
///
/// let index = brute_force_index(&space, 1).unwrap();
/// assert_eq!(index.status(), BuildStatus::Exact);
/// assert_eq!(index.neighbors_of(2).unwrap()[0].id, 1);
/// ```
pub fn brute_force_index<S: Space + ?Sized>(space: &S, k: usize) -> Result<KnnIndex> {
    if k == 0 {
        return Err(KnnError::InvalidParameter("k must be at least 1".to_string()));
    }
    let n = space.len();
    if n == 0 {
        return Err(KnnError::InvalidParameter("dataset is empty".to_string()));
    }
    if n > PointId::MAX as usize {
        return Err(KnnError::InvalidParameter(format!(
            "dataset of {} points exceeds the id range",
            n
        )));
    }

    let start = Instant::now();
    let space = CountingSpace::new(space);
    let table = NeighborTable::new(n, k);

    for p in 0..n as PointId {
        for q in p + 1..n as PointId {
            let d = space.distance(p, q)?;
            let (mut node_p, mut node_q) = table.lock_pair(p, q);
            node_p.try_insert(d, q);
            node_q.try_insert(d, p);
        }
    }

    let stats = BuildStats {
        iterations: Vec::new(),
        distance_evaluations: space.evaluations(),
        elapsed: start.elapsed(),
    };

    tracing::debug!(
        "Brute-force kNN: n={}, k={}, distance_evaluations={}, elapsed={:?}",
        n,
        k,
        stats.distance_evaluations,
        stats.elapsed
    );

    Ok(KnnIndex::new(
        table.into_sorted_lists(),
        k,
        BuildStatus::Exact,
        stats,
    ))
}
