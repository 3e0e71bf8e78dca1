//! NN-Descent build configuration.
//!
//! Loads and validates parameters from YAML or builds them in code.

use crate::{KnnError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// kNN graph build configuration.
///
/// Example YAML:
/// ```yaml
/// k: 10
/// rho: 0.5
/// delta: 0.001
/// seed: 42
/// max_iterations: 50
/// parallel: true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnGraphConfig {
    /// Neighbors kept per point.
    /// Default: 10
    pub k: usize,

    /// Sample rate in (0, 1]. Caps each candidate pool at `round(rho * k)`.
    /// Lower = fewer distance computations, lower recall.
    /// Default: 1.0
    pub rho: f64,

    /// Early termination fraction in (0, 1). Refinement stops once an
    /// iteration makes fewer than `delta * k * n` updates.
    /// Default: 0.001
    pub delta: f64,

    /// Seed for all sampling.
    /// Default: 0
    pub seed: u64,

    /// Hard cap on refine iterations.
    /// Default: 100
    pub max_iterations: usize,

    /// Run candidate construction and local joins on the rayon pool.
    /// Parallel builds are valid but not bit-identical to sequential ones.
    /// Default: false
    pub parallel: bool,
}

impl Default for KnnGraphConfig {
    fn default() -> Self {
        Self {
            k: 10,
            rho: 1.0,
            delta: 0.001,
            seed: 0,
            max_iterations: 100,
            parallel: false,
        }
    }
}

impl KnnGraphConfig {
    /// Configuration for `k` neighbors with default parameters.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Default::default()
        }
    }

    /// Set the neighbor count.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Set the sample rate.
    pub fn with_rho(mut self, rho: f64) -> Self {
        self.rho = rho;
        self
    }

    /// Set the early termination fraction.
    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    /// Set the sampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Enable or disable the parallel schedule.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Candidate pool cap per source: `round(rho * k)`, at least 1.
    pub fn sample_size(&self) -> usize {
        ((self.rho * self.k as f64).round() as usize).max(1)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: KnnGraphConfig = serde_yaml::from_str(content)
            .map_err(|e| KnnError::Config(format!("Failed to parse YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Validate parameters.
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(KnnError::InvalidParameter("k must be at least 1".to_string()));
        }

        if !(self.rho > 0.0 && self.rho <= 1.0) {
            return Err(KnnError::InvalidParameter(format!(
                "rho must be in (0, 1], got {}",
                self.rho
            )));
        }

        if !(self.delta > 0.0 && self.delta < 1.0) {
            return Err(KnnError::InvalidParameter(format!(
                "delta must be in (0, 1), got {}",
                self.delta
            )));
        }

        if self.max_iterations == 0 {
            return Err(KnnError::InvalidParameter(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
