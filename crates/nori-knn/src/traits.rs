//! The distance capability consumed by graph construction.
//!
//! A `Space` pairs a finite dataset of dense ids (`0..len`) with a distance
//! function over them. Builders only ever read a space; it must be safe to
//! share across worker threads.

use crate::PointId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Failure reported by a distance function (e.g. incomparable points).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} (points {a} and {b})")]
pub struct DistanceError {
    /// Human-readable reason.
    pub message: String,
    /// First point of the failed comparison.
    pub a: PointId,
    /// Second point of the failed comparison.
    pub b: PointId,
}

impl DistanceError {
    /// Create a distance error for the pair `(a, b)`.
    pub fn new(message: impl Into<String>, a: PointId, b: PointId) -> Self {
        Self {
            message: message.into(),
            a,
            b,
        }
    }
}

/// A dataset with a distance function.
///
/// # Contract
///
/// - ids are exactly `0..len()`
/// - `distance(a, b) == distance(b, a)`; the local join evaluates each pair
///   once and applies the result to both sides
/// - deterministic for fixed inputs and free of side effects visible to the
///   builder
///
/// # Thread Safety
///
/// Implementations must be `Sync`: the parallel builder calls `distance`
/// from several threads at once.
pub trait Space: Sync {
    /// Number of points.
    fn len(&self) -> usize;

    /// Check if the space has no points.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distance between two points (lower = closer).
    fn distance(&self, a: PointId, b: PointId) -> Result<f64, DistanceError>;
}

/// A `Space` backed by a closure.
///
/// # Example
///
/// ```
/// use nori_knn::{FnSpace, Space};
///
/// let xs = [0.0_f64, 1.0, 5.0];
/// let space = FnSpace::new(xs.len(), |a, b| Ok((xs[a as usize] - xs[b as usize]).abs()));
/// assert_eq!(space.distance(0, 2).unwrap(), 5.0);
/// ```
pub struct FnSpace<F> {
    len: usize,
    f: F,
}

impl<F> FnSpace<F>
where
    F: Fn(PointId, PointId) -> Result<f64, DistanceError> + Sync,
{
    /// Wrap a distance closure over `len` points.
    pub fn new(len: usize, f: F) -> Self {
        Self { len, f }
    }
}

impl<F> Space for FnSpace<F>
where
    F: Fn(PointId, PointId) -> Result<f64, DistanceError> + Sync,
{
    fn len(&self) -> usize {
        self.len
    }

    fn distance(&self, a: PointId, b: PointId) -> Result<f64, DistanceError> {
        (self.f)(a, b)
    }
}

impl<S: Space + ?Sized> Space for &S {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn distance(&self, a: PointId, b: PointId) -> Result<f64, DistanceError> {
        (**self).distance(a, b)
    }
}

/// Wraps a space for a single build: counts evaluations and rejects NaN.
pub(crate) struct CountingSpace<'a, S: ?Sized> {
    inner: &'a S,
    evaluations: AtomicU64,
}

impl<'a, S: Space + ?Sized> CountingSpace<'a, S> {
    pub(crate) fn new(inner: &'a S) -> Self {
        Self {
            inner,
            evaluations: AtomicU64::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    pub(crate) fn distance(&self, a: PointId, b: PointId) -> crate::Result<f64> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let d = self.inner.distance(a, b)?;
        if d.is_nan() {
            return Err(DistanceError::new("distance is NaN", a, b).into());
        }
        Ok(d)
    }

    pub(crate) fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }
}
