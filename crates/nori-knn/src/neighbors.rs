//! Bounded neighbor sets.
//!
//! A `BoundedNeighborSet` holds the best-known `k` neighbors of one point as a
//! max-heap keyed by distance, so the current worst neighbor is always at the
//! top and can be evicted in O(log k).

use crate::PointId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Distance bound reported by a set that still has free slots.
///
/// Every finite candidate compares below it, so a filling set accepts
/// anything it does not already contain.
pub const UNBOUNDED: f64 = f64::INFINITY;

/// A neighbor of some point: `(distance, id)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborEntry {
    /// Distance to the owning point (lower = closer).
    pub distance: f64,
    /// The neighbor's point ID.
    pub id: PointId,
}

impl NeighborEntry {
    /// Create a new neighbor entry.
    pub fn new(distance: f64, id: PointId) -> Self {
        Self { distance, id }
    }
}

impl Eq for NeighborEntry {}

impl PartialOrd for NeighborEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NeighborEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Distance first, then id so that ties order deterministically
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Result of [`BoundedNeighborSet::try_insert`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InsertOutcome {
    /// Already present, or not strictly better than the current worst.
    Rejected,
    /// The set was full; `evicted` made room for the new entry.
    Replaced { evicted: NeighborEntry },
    /// The set had a free slot.
    Added,
}

impl InsertOutcome {
    /// Whether the set changed (counts as one update during refinement).
    pub fn is_update(&self) -> bool {
        !matches!(self, InsertOutcome::Rejected)
    }
}

/// Fixed-capacity set of the `k` closest known neighbors of a point.
///
/// Invariants:
/// - `len() <= k`
/// - an id appears at most once
#[derive(Debug, Clone)]
pub struct BoundedNeighborSet {
    /// Max-heap: the worst (furthest) entry is on top.
    heap: BinaryHeap<NeighborEntry>,
    /// Capacity.
    k: usize,
}

impl BoundedNeighborSet {
    /// Create an empty set with capacity `k`.
    pub fn new(k: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(k),
            k,
        }
    }

    /// Insert `id` at `distance` if it improves the set.
    ///
    /// Ties with the current worst entry are rejected once the set is full.
    pub fn try_insert(&mut self, distance: f64, id: PointId) -> InsertOutcome {
        if self.contains(id) {
            return InsertOutcome::Rejected;
        }

        if self.heap.len() < self.k {
            self.heap.push(NeighborEntry::new(distance, id));
            return InsertOutcome::Added;
        }

        match self.heap.peek() {
            Some(worst) if distance < worst.distance => {
                let evicted = *worst;
                self.heap.pop();
                self.heap.push(NeighborEntry::new(distance, id));
                InsertOutcome::Replaced { evicted }
            }
            _ => InsertOutcome::Rejected,
        }
    }

    /// Distance of the worst entry, or [`UNBOUNDED`] while fewer than `k`
    /// entries are held.
    pub fn worst_distance(&self) -> f64 {
        if self.heap.len() < self.k {
            return UNBOUNDED;
        }
        self.heap.peek().map(|e| e.distance).unwrap_or(UNBOUNDED)
    }

    /// Entries sorted ascending by distance (ties by id). Does not mutate.
    pub fn to_sorted(&self) -> Vec<NeighborEntry> {
        let mut entries: Vec<_> = self.heap.iter().copied().collect();
        entries.sort();
        entries
    }

    /// Consume the set, returning its entries sorted ascending.
    pub fn into_sorted(self) -> Vec<NeighborEntry> {
        self.heap.into_sorted_vec()
    }

    /// Check whether `id` is held.
    pub fn contains(&self, id: PointId) -> bool {
        self.heap.iter().any(|e| e.id == id)
    }

    /// Iterate over entries in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &NeighborEntry> {
        self.heap.iter()
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Capacity.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Whether all `k` slots are taken.
    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.k
    }
}
