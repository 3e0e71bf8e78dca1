//! NN-Descent graph builder.
//!
//! Builds an approximate kNN graph in three phases:
//!
//! 1. **Init**: every point gets `k` random other points as neighbors, all
//!    flagged new.
//! 2. **Refine** (repeated): each point gathers a capped sample of its new
//!    neighbors plus reverse-new neighbors, and of its old plus reverse-old
//!    neighbors, then runs a local join over those pools. Every pair
//!    evaluated proposes each side to the other.
//! 3. **Freeze**: once an iteration makes fewer than `delta * k * n`
//!    updates (or the iteration cap is hit), every set is sorted into the
//!    returned [`KnnIndex`].
//!
//! # Join asymmetry
//!
//! The new×new join visits each unordered pair once (`u < v`). The new×old
//! join only skips `u == v`: a point can sit in both pools and is then joined
//! from both sides. Update counts, and therefore convergence, depend on this.
//!
//! # Schedules
//!
//! The sequential schedule is deterministic for a seed. The parallel schedule
//! builds candidate pools on the rayon pool from a snapshot taken at the start
//! of the iteration, then joins with per-point locks taken in ascending id
//! order. Sampling streams are keyed by `(seed, iteration, point)`, so both
//! schedules draw the same pools; only the join interleaving differs.

use crate::config::KnnGraphConfig;
use crate::index::{BuildStats, BuildStatus, IterationStats, KnnIndex};
use crate::sample::Sampler;
use crate::table::NeighborTable;
use crate::traits::{CountingSpace, Space};
use crate::{KnnError, PointId, Result};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cooperative cancellation flag for a running build.
///
/// Checked at the top of every refine iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Candidate pools of one point for one iteration.
#[derive(Debug, Default)]
struct CandidatePools {
    /// Sampled new ∪ sampled reverse-new, ascending.
    new: Vec<PointId>,
    /// Sampled old ∪ sampled reverse-old, ascending.
    old: Vec<PointId>,
}

/// NN-Descent kNN graph builder.
///
/// # Example
///
/// ```
/// use nori_knn::{BuildStatus, DistanceFunction, KnnGraphConfig, NnDescent, VectorSpace};
///
/// let points: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64, (i % 7) as f64]).collect();
/// let space = VectorSpace::new(points, DistanceFunction::Euclidean).unwrap();
///
/// let config = KnnGraphConfig::new(4).with_seed(7).with_max_iterations(50);
/// let index = NnDescent::new(config).unwrap().build(&space).unwrap();
///
/// assert_eq!(index.len(), 30);
/// assert_eq!(index.neighbors_of(0).unwrap().len(), 4);
/// assert_ne!(index.status(), BuildStatus::Exact);
/// ```
#[derive(Debug, Clone)]
pub struct NnDescent {
    config: KnnGraphConfig,
    cancel: Option<CancelToken>,
}

impl NnDescent {
    /// Create a builder.
    ///
    /// # Errors
    ///
    /// [`KnnError::InvalidParameter`] if the configuration does not validate.
    pub fn new(config: KnnGraphConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: None,
        })
    }

    /// Attach a cancellation token.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Get configuration.
    pub fn config(&self) -> &KnnGraphConfig {
        &self.config
    }

    /// Build the kNN index over `space`.
    ///
    /// Hitting `max_iterations` is not an error: the index is returned with
    /// [`BuildStatus::Unconverged`].
    ///
    /// # Errors
    ///
    /// - [`KnnError::InvalidParameter`] if the space is empty
    /// - [`KnnError::Distance`] if the distance function fails (or returns NaN)
    /// - [`KnnError::Cancelled`] if the token was cancelled
    pub fn build<S: Space + ?Sized>(&self, space: &S) -> Result<KnnIndex> {
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
        let k = self.config.k;
        let space = CountingSpace::new(space);
        let table = NeighborTable::new(n, k);

        self.initialize(&space, &table)?;

        let threshold = self.config.delta * k as f64 * n as f64;
        let mut iterations = Vec::new();
        let mut status = BuildStatus::Unconverged;

        for iteration in 1..=self.config.max_iterations {
            if self.is_cancelled() {
                tracing::warn!("NN-Descent cancelled after {} iterations", iteration - 1);
                return Err(KnnError::Cancelled {
                    iterations: iteration - 1,
                });
            }

            let evaluations_before = space.evaluations();
            let updates = self.refine(&space, &table, iteration)?;
            let stats = IterationStats {
                iteration,
                updates,
                distance_evaluations: space.evaluations() - evaluations_before,
                bound_sum: table.bound_sum(),
            };
            iterations.push(stats);

            tracing::debug!(
                "NN-Descent iteration {}: updates={}, threshold={:.3}, distance_evaluations={}",
                iteration,
                updates,
                threshold,
                stats.distance_evaluations
            );

            if (updates as f64) < threshold {
                status = BuildStatus::Converged;
                break;
            }
        }

        if status == BuildStatus::Unconverged {
            tracing::warn!(
                "NN-Descent hit max_iterations={} without converging (n={}, k={})",
                self.config.max_iterations,
                n,
                k
            );
        }

        let stats = BuildStats {
            iterations,
            distance_evaluations: space.evaluations(),
            elapsed: start.elapsed(),
        };

        tracing::info!(
            "NN-Descent built kNN graph: n={}, k={}, status={:?}, iterations={}, distance_evaluations={}, scan_rate={:.4}, elapsed={:?}",
            n,
            k,
            status,
            stats.num_iterations(),
            stats.distance_evaluations,
            stats.scan_rate(n),
            stats.elapsed
        );

        Ok(KnnIndex::new(table.into_sorted_lists(), k, status, stats))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|t| t.is_cancelled()).unwrap_or(false)
    }

    /// Seed every point with `k` random other points.
    fn initialize<S: Space + ?Sized>(
        &self,
        space: &CountingSpace<'_, S>,
        table: &NeighborTable,
    ) -> Result<()> {
        let n = space.len();
        let init_point = |p: usize| -> Result<()> {
            let p = p as PointId;
            let mut sampler = Sampler::for_point(self.config.seed, 0, p);
            for q in sampler.sample_others(n, p, self.config.k) {
                let d = space.distance(p, q)?;
                table.try_insert(p, d, q);
            }
            Ok(())
        };

        if self.config.parallel {
            (0..n).into_par_iter().try_for_each(init_point)
        } else {
            (0..n).try_for_each(init_point)
        }
    }

    /// Run one refine iteration, returning the number of updates.
    fn refine<S: Space + ?Sized>(
        &self,
        space: &CountingSpace<'_, S>,
        table: &NeighborTable,
        iteration: usize,
    ) -> Result<usize> {
        let n = table.len();

        // Snapshot new/old before anything in this iteration mutates the table
        let snapshots: Vec<(Vec<PointId>, Vec<PointId>)> = if self.config.parallel {
            (0..n)
                .into_par_iter()
                .map(|p| table.snapshot_new_and_old(p as PointId))
                .collect()
        } else {
            (0..n)
                .map(|p| table.snapshot_new_and_old(p as PointId))
                .collect()
        };

        let (reverse_new, reverse_old) = reverse_neighbors(&snapshots);

        let build_pools = |p: usize| {
            self.candidate_pools(
                p as PointId,
                &snapshots[p],
                &reverse_new[p],
                &reverse_old[p],
                iteration,
            )
        };
        let pools: Vec<CandidatePools> = if self.config.parallel {
            (0..n).into_par_iter().map(build_pools).collect()
        } else {
            (0..n).map(build_pools).collect()
        };

        // Everything sampled into a new pool has now been explored
        for (p, pool) in pools.iter().enumerate() {
            let mut node = table.lock(p as PointId);
            for &id in &pool.new {
                node.unmark_new(id);
            }
        }

        if self.config.parallel {
            let updates = AtomicUsize::new(0);
            pools.par_iter().try_for_each(|pool| -> Result<()> {
                let count = local_join(space, table, pool)?;
                updates.fetch_add(count, Ordering::Relaxed);
                Ok(())
            })?;
            Ok(updates.into_inner())
        } else {
            let mut updates = 0;
            for pool in &pools {
                updates += local_join(space, table, pool)?;
            }
            Ok(updates)
        }
    }

    /// Sample the new and old candidate pools of `point`.
    fn candidate_pools(
        &self,
        point: PointId,
        snapshot: &(Vec<PointId>, Vec<PointId>),
        reverse_new: &[PointId],
        reverse_old: &[PointId],
        iteration: usize,
    ) -> CandidatePools {
        let (new_ids, old_ids) = snapshot;
        let items = self.config.sample_size();
        let mut sampler = Sampler::for_point(self.config.seed, iteration, point);

        let mut new_pool: BTreeSet<PointId> = sampler.sample(new_ids, items).into_iter().collect();
        new_pool.extend(sampler.sample(reverse_new, items));
        new_pool.remove(&point);

        let mut old_pool: BTreeSet<PointId> = sampler.sample(old_ids, items).into_iter().collect();
        old_pool.extend(sampler.sample(reverse_old, items));
        old_pool.remove(&point);

        CandidatePools {
            new: new_pool.into_iter().collect(),
            old: old_pool.into_iter().collect(),
        }
    }
}

/// Invert the snapshots: `reverse_new[p]` lists every `q` holding `p` as a
/// new neighbor, `reverse_old[p]` every `q` holding it as an old one.
fn reverse_neighbors(
    snapshots: &[(Vec<PointId>, Vec<PointId>)],
) -> (Vec<Vec<PointId>>, Vec<Vec<PointId>>) {
    let n = snapshots.len();
    let mut reverse_new = vec![Vec::new(); n];
    let mut reverse_old = vec![Vec::new(); n];

    // Visiting q in ascending order keeps every reverse list sorted
    for (q, (new_ids, old_ids)) in snapshots.iter().enumerate() {
        for &p in new_ids {
            reverse_new[p as usize].push(q as PointId);
        }
        for &p in old_ids {
            reverse_old[p as usize].push(q as PointId);
        }
    }

    (reverse_new, reverse_old)
}

/// Join one point's pools: new×new once per unordered pair, new×old for
/// every distinct pair.
fn local_join<S: Space + ?Sized>(
    space: &CountingSpace<'_, S>,
    table: &NeighborTable,
    pool: &CandidatePools,
) -> Result<usize> {
    let mut updates = 0;

    for (i, &u) in pool.new.iter().enumerate() {
        // `pool.new` is ascending, so every v here satisfies u < v
        for &v in &pool.new[i + 1..] {
            updates += join_pair(space, table, u, v)?;
        }
        for &v in &pool.old {
            if u != v {
                updates += join_pair(space, table, u, v)?;
            }
        }
    }

    Ok(updates)
}

/// Evaluate `(u, v)` once and offer each point to the other.
fn join_pair<S: Space + ?Sized>(
    space: &CountingSpace<'_, S>,
    table: &NeighborTable,
    u: PointId,
    v: PointId,
) -> Result<usize> {
    {
        // Both sides would reject; skip the distance evaluation
        let (node_u, node_v) = table.lock_pair(u, v);
        if node_u.set().contains(v) && node_v.set().contains(u) {
            return Ok(0);
        }
    }

    let d = space.distance(u, v)?;

    let (mut node_u, mut node_v) = table.lock_pair(u, v);
    let mut updates = 0;
    if node_u.try_insert(d, v).is_update() {
        updates += 1;
    }
    if node_v.try_insert(d, u).is_update() {
        updates += 1;
    }
    Ok(updates)
}
