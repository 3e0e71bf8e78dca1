//! Per-point neighbor state for the whole dataset.
//!
//! The table is an arena of `NeighborNode`s indexed by dense `PointId`.
//! Each node sits behind its own lock so the parallel local join can update
//! two points at once without a table-wide lock.

use crate::neighbors::{BoundedNeighborSet, InsertOutcome, NeighborEntry};
use crate::PointId;
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeSet;

/// Neighbor state of a single point.
#[derive(Debug, Clone)]
pub struct NeighborNode {
    /// Best-known neighbors.
    set: BoundedNeighborSet,
    /// Held neighbor ids added since they were last sampled ("new").
    fresh: BTreeSet<PointId>,
}

impl NeighborNode {
    fn new(k: usize) -> Self {
        Self {
            set: BoundedNeighborSet::new(k),
            fresh: BTreeSet::new(),
        }
    }

    /// The underlying neighbor set.
    pub fn set(&self) -> &BoundedNeighborSet {
        &self.set
    }

    /// Insert a neighbor, flagging it new on success.
    ///
    /// An evicted neighbor loses its flag, so the new ids are always a
    /// subset of the held ids.
    pub fn try_insert(&mut self, distance: f64, id: PointId) -> InsertOutcome {
        let outcome = self.set.try_insert(distance, id);
        match outcome {
            InsertOutcome::Added => {
                self.fresh.insert(id);
            }
            InsertOutcome::Replaced { evicted } => {
                self.fresh.remove(&evicted.id);
                self.fresh.insert(id);
            }
            InsertOutcome::Rejected => {}
        }
        outcome
    }

    /// Flag a held neighbor as new. Returns false if `id` is not held.
    pub fn mark_new(&mut self, id: PointId) -> bool {
        if !self.set.contains(id) {
            return false;
        }
        self.fresh.insert(id)
    }

    /// Age a single neighbor from new to old.
    pub fn unmark_new(&mut self, id: PointId) -> bool {
        self.fresh.remove(&id)
    }

    /// Age every neighbor to old.
    pub fn clear_new(&mut self) {
        self.fresh.clear();
    }

    /// Whether `id` is held and flagged new.
    pub fn is_new(&self, id: PointId) -> bool {
        self.fresh.contains(&id)
    }

    /// Partition the held neighbors into `(new, old)`, each sorted by id.
    pub fn snapshot_new_and_old(&self) -> (Vec<PointId>, Vec<PointId>) {
        let mut new_ids = Vec::with_capacity(self.fresh.len());
        let mut old_ids = Vec::with_capacity(self.set.len());

        for entry in self.set.iter() {
            if self.fresh.contains(&entry.id) {
                new_ids.push(entry.id);
            } else {
                old_ids.push(entry.id);
            }
        }

        new_ids.sort_unstable();
        old_ids.sort_unstable();
        (new_ids, old_ids)
    }
}

/// Mapping from every point to its neighbor state.
///
/// Created once with one node per point; keys are never added or removed.
pub struct NeighborTable {
    nodes: Vec<Mutex<NeighborNode>>,
    k: usize,
}

impl NeighborTable {
    /// Allocate one empty node of capacity `k` for each of `n` points.
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            nodes: (0..n).map(|_| Mutex::new(NeighborNode::new(k))).collect(),
            k,
        }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Neighbor capacity per point.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Lock a single point's node.
    pub fn lock(&self, point: PointId) -> MutexGuard<'_, NeighborNode> {
        self.nodes[point as usize].lock()
    }

    /// Lock two distinct points' nodes, always acquiring the lower id first.
    ///
    /// Guards are returned in argument order.
    pub fn lock_pair(
        &self,
        a: PointId,
        b: PointId,
    ) -> (MutexGuard<'_, NeighborNode>, MutexGuard<'_, NeighborNode>) {
        debug_assert_ne!(a, b, "cannot lock a point against itself");
        if a < b {
            let ga = self.lock(a);
            let gb = self.lock(b);
            (ga, gb)
        } else {
            let gb = self.lock(b);
            let ga = self.lock(a);
            (ga, gb)
        }
    }

    /// Insert `id` into `point`'s set, flagging it new on success.
    pub fn try_insert(&self, point: PointId, distance: f64, id: PointId) -> InsertOutcome {
        self.lock(point).try_insert(distance, id)
    }

    /// Flag `neighbor` as new for `point`.
    pub fn mark_new(&self, point: PointId, neighbor: PointId) -> bool {
        self.lock(point).mark_new(neighbor)
    }

    /// Age one of `point`'s neighbors to old.
    pub fn unmark_new(&self, point: PointId, neighbor: PointId) -> bool {
        self.lock(point).unmark_new(neighbor)
    }

    /// Age all of `point`'s neighbors to old.
    pub fn clear_new(&self, point: PointId) {
        self.lock(point).clear_new();
    }

    /// Partition `point`'s neighbors into `(new, old)`.
    pub fn snapshot_new_and_old(&self, point: PointId) -> (Vec<PointId>, Vec<PointId>) {
        self.lock(point).snapshot_new_and_old()
    }

    /// Current worst distance of `point` (see [`BoundedNeighborSet::worst_distance`]).
    pub fn worst_distance(&self, point: PointId) -> f64 {
        self.lock(point).set().worst_distance()
    }

    /// Sum of worst distances over all points.
    ///
    /// Never increases during refinement.
    pub fn bound_sum(&self) -> f64 {
        self.nodes.iter().map(|n| n.lock().set().worst_distance()).sum()
    }

    /// Freeze every set into its sorted neighbor list.
    pub fn into_sorted_lists(self) -> Vec<Vec<NeighborEntry>> {
        self.nodes
            .into_iter()
            .map(|node| node.into_inner().set.into_sorted())
            .collect()
    }
}
