//! Uniform sampling without replacement.
//!
//! NN-Descent draws random subsets in two places: the initial random
//! neighbors of every point and the capped candidate pools of every
//! iteration. Both go through a seeded `Sampler` so builds are reproducible.

use crate::PointId;
use rand::rngs::StdRng;
use rand::SeedableRng;

const ITERATION_MIX: u64 = 0x9E37_79B9_7F4A_7C15;
const POINT_MIX: u64 = 0xC2B2_AE3D_27D4_EB4F;

/// Seeded sampler of point ids.
#[derive(Debug, Clone)]
pub struct Sampler {
    rng: StdRng,
}

impl Sampler {
    /// Create a sampler from a seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create the sampler used for `point` during `iteration`.
    ///
    /// Streams depend only on `(seed, iteration, point)`, never on the order
    /// in which points are visited, so sequential and parallel schedules draw
    /// the same samples.
    pub fn for_point(seed: u64, iteration: usize, point: PointId) -> Self {
        let mixed = seed
            ^ (iteration as u64 + 1).wrapping_mul(ITERATION_MIX)
            ^ (point as u64 + 1).wrapping_mul(POINT_MIX);
        Self::seeded(mixed)
    }

    /// Draw `min(count, universe.len())` distinct ids uniformly.
    ///
    /// An empty universe yields an empty sample.
    pub fn sample(&mut self, universe: &[PointId], count: usize) -> Vec<PointId> {
        let amount = count.min(universe.len());
        if amount == universe.len() {
            return universe.to_vec();
        }
        rand::seq::index::sample(&mut self.rng, universe.len(), amount)
            .into_iter()
            .map(|i| universe[i])
            .collect()
    }

    /// Draw `min(count, n - 1)` distinct ids from `0..n`, never `exclude`.
    pub fn sample_others(&mut self, n: usize, exclude: PointId, count: usize) -> Vec<PointId> {
        let others = n.saturating_sub(1);
        let amount = count.min(others);
        if amount == 0 {
            return Vec::new();
        }
        // Sample from 0..n-1 and shift everything at or above `exclude` up by one
        rand::seq::index::sample(&mut self.rng, others, amount)
            .into_iter()
            .map(|i| {
                let id = i as PointId;
                if id >= exclude {
                    id + 1
                } else {
                    id
                }
            })
            .collect()
    }
}
