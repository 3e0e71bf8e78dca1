//! Approximate k-nearest-neighbor graphs for NoriKV.
//!
//! This crate builds, for every point of a fixed dataset, a bounded list of
//! its approximate k nearest neighbors using NN-Descent ("neighbors of
//! neighbors are likely neighbors"):
//!
//! - **Space**: the distance capability (`distance(a, b) -> f64`) over dense ids
//! - **NnDescent**: iterative local-join refinement until updates drop below
//!   `delta * k * n`
//! - **KnnIndex**: the frozen, immutable per-point sorted neighbor lists
//! - **brute_force_index**: exact kNN, used as a correctness oracle
//!
//! # Architecture
//!
//! ```text
//! Sampler ──► NnDescent ──► NeighborTable (BoundedNeighborSet per point)
//!                 │
//!                 └── converged ──► KnnIndex (sorted, read-only)
//! ```
//!
//! # Example
//!
//! ```
//! use nori_knn::{build_index, DistanceFunction, VectorSpace};
//!
//! let points = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![10.0, 10.0]];
//! let space = VectorSpace::new(points, DistanceFunction::Euclidean).unwrap();
//!
//! // k = 3: every point keeps all others, sorted by distance
//! let index = build_index(&space, 3, 1.0, 0.001, 42).unwrap();
//! let nearest = index.neighbors_of(0).unwrap();
//! assert_eq!(nearest.len(), 3);
//! assert!((nearest[0].distance - 1.0).abs() < 1e-9);
//! assert_eq!(nearest[2].id, 3);
//! ```

mod brute;
mod config;
mod descent;
mod distance;
mod index;
mod neighbors;
mod sample;
mod table;
mod traits;

pub use brute::brute_force_index;
pub use config::KnnGraphConfig;
pub use descent::{CancelToken, NnDescent};
pub use distance::{DistanceFunction, VectorSpace};
pub use index::{BuildStats, BuildStatus, IterationStats, KnnIndex};
pub use neighbors::{BoundedNeighborSet, InsertOutcome, NeighborEntry, UNBOUNDED};
pub use sample::Sampler;
pub use table::{NeighborNode, NeighborTable};
pub use traits::{DistanceError, FnSpace, Space};

/// Dense point identifier (index into the dataset, `0..n`).
pub type PointId = u32;

/// Error type for kNN graph operations.
#[derive(Debug, thiserror::Error)]
pub enum KnnError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Distance function failed: {0}")]
    Distance(#[from] DistanceError),

    #[error("Point not found: {0}")]
    NotFound(PointId),

    #[error("Build cancelled after {iterations} iterations")]
    Cancelled { iterations: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for kNN graph operations.
pub type Result<T> = std::result::Result<T, KnnError>;

/// Build an approximate kNN index with the given parameters.
///
/// The result is approximate. Small `k` on a tiny dataset can settle at a
/// local optimum short of the exact neighbors (with `k = 1` on four points,
/// a point may keep its second-nearest neighbor). Compare against
/// [`brute_force_index`] when exact lists matter.
///
/// Single-threaded and deterministic for a fixed `seed`. Use
/// [`NnDescent`] with a [`KnnGraphConfig`] for the iteration cap, the
/// parallel schedule, or cancellation.
///
/// # Errors
///
/// - [`KnnError::InvalidParameter`] if `k == 0`, `rho` is outside `(0, 1]`,
///   `delta` is outside `(0, 1)` or the space is empty
/// - [`KnnError::Distance`] if the distance function fails
pub fn build_index<S: Space>(
    space: &S,
    k: usize,
    rho: f64,
    delta: f64,
    seed: u64,
) -> Result<KnnIndex> {
    let config = KnnGraphConfig {
        k,
        rho,
        delta,
        seed,
        ..Default::default()
    };
    NnDescent::new(config)?.build(space)
}
