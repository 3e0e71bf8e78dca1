//! Distance functions for dense vectors.
//!
//! Provides the metrics selectable from configuration:
//! - **Euclidean (L2)**: straight-line distance
//! - **SquaredEuclidean**: L2 without the sqrt (same neighbor order, cheaper)
//! - **Manhattan (L1)**: sum of absolute differences
//! - **Cosine**: angle-based, `1 - cos(a, b)`
//!
//! [`VectorSpace`] binds a set of vectors to one of these metrics and
//! implements [`Space`] for graph construction.

use crate::traits::{DistanceError, Space};
use crate::{KnnError, PointId, Result};
use serde::{Deserialize, Serialize};

/// Distance function enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceFunction {
    /// Euclidean (L2) distance: sqrt(sum((a[i] - b[i])^2))
    #[default]
    Euclidean,
    /// Squared Euclidean distance: sum((a[i] - b[i])^2)
    SquaredEuclidean,
    /// Manhattan (L1) distance: sum(|a[i] - b[i]|)
    Manhattan,
    /// Cosine distance: 1 - (a · b) / (||a|| * ||b||)
    Cosine,
}

impl DistanceFunction {
    /// Compute distance between two vectors of equal length.
    ///
    /// Returns `None` when the metric is undefined for the pair (cosine
    /// distance involving a zero vector).
    #[inline]
    pub fn distance(&self, a: &[f64], b: &[f64]) -> Option<f64> {
        debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

        match self {
            Self::Euclidean => Some(squared_euclidean(a, b).sqrt()),
            Self::SquaredEuclidean => Some(squared_euclidean(a, b)),
            Self::Manhattan => Some(a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()),
            Self::Cosine => cosine(a, b),
        }
    }
}

#[inline]
fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[inline]
fn cosine(a: &[f64], b: &[f64]) -> Option<f64> {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = (norm_a * norm_b).sqrt();
    if denom < f64::EPSILON {
        return None;
    }

    // Clamp to [-1, 1] to absorb rounding
    Some(1.0 - (dot / denom).clamp(-1.0, 1.0))
}

/// A set of dense vectors under a fixed [`DistanceFunction`].
///
/// Point `i` is the `i`-th vector passed to [`VectorSpace::new`].
#[derive(Debug, Clone)]
pub struct VectorSpace {
    vectors: Vec<Vec<f64>>,
    dimensions: usize,
    metric: DistanceFunction,
}

impl VectorSpace {
    /// Create a space from vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The vectors don't all share the first vector's dimension
    /// - Any vector contains invalid values (NaN, Inf)
    pub fn new(vectors: Vec<Vec<f64>>, metric: DistanceFunction) -> Result<Self> {
        let dimensions = vectors.first().map(Vec::len).unwrap_or(0);

        for (row, vector) in vectors.iter().enumerate() {
            if vector.len() != dimensions {
                return Err(KnnError::DimensionMismatch {
                    expected: dimensions,
                    actual: vector.len(),
                });
            }
            if let Some(i) = vector.iter().position(|v| !v.is_finite()) {
                return Err(KnnError::InvalidVector(format!(
                    "non-finite value at index {} of vector {}",
                    i, row
                )));
            }
        }

        Ok(Self {
            vectors,
            dimensions,
            metric,
        })
    }

    /// Get a vector by point id.
    pub fn get(&self, id: PointId) -> Option<&[f64]> {
        self.vectors.get(id as usize).map(Vec::as_slice)
    }

    /// Vector dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// The metric in use.
    pub fn metric(&self) -> DistanceFunction {
        self.metric
    }
}

impl Space for VectorSpace {
    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn distance(&self, a: PointId, b: PointId) -> std::result::Result<f64, DistanceError> {
        let (va, vb) = match (self.get(a), self.get(b)) {
            (Some(va), Some(vb)) => (va, vb),
            _ => return Err(DistanceError::new("point out of range", a, b)),
        };
        self.metric
            .distance(va, vb)
            .ok_or_else(|| {
                DistanceError::new(format!("{:?} distance undefined", self.metric), a, b)
            })
    }
}
