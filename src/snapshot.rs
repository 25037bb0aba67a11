//! Persisted weight matrices (WeightStore)
//!
//! A weight column only means something relative to the lattice ordering
//! that produced it, so every snapshot carries the full `GridConfig` and is
//! validated against the live basis before use.

use std::path::Path;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::basis::{GridBasis, GridConfig};
use crate::error::{ObserverError, Result};
use crate::storage;
use crate::types::STATE_DIM;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    pub grid: GridConfig,
    pub rows: usize,
    pub cols: usize,
    /// Row-major, `rows * cols` entries
    pub weights: Vec<f64>,
    /// Learning steps that produced these weights
    pub steps: u64,
    pub trained_at: DateTime<Utc>,
}

impl WeightSnapshot {
    pub fn capture(basis: &GridBasis, weights: &Array2<f64>, steps: u64) -> Self {
        let (rows, cols) = weights.dim();
        Self {
            grid: basis.config().clone(),
            rows,
            cols,
            weights: weights.iter().copied().collect(),
            steps,
            trained_at: Utc::now(),
        }
    }

    /// Weight matrix for `basis`, after checking grid and shape agree.
    pub fn matrix_for(&self, basis: &GridBasis) -> Result<Array2<f64>> {
        if &self.grid != basis.config() {
            return Err(ObserverError::GridMismatch);
        }
        let expected = (STATE_DIM, basis.len());
        if (self.rows, self.cols) != expected {
            return Err(ObserverError::ShapeMismatch {
                expected,
                found: (self.rows, self.cols),
            });
        }
        if self.weights.len() != self.rows * self.cols {
            return Err(ObserverError::InvalidData(format!(
                "snapshot declares {}x{} weights but holds {}",
                self.rows,
                self.cols,
                self.weights.len()
            )));
        }
        Array2::from_shape_vec(expected, self.weights.clone())
            .map_err(|e| ObserverError::InvalidData(format!("Failed to build weight matrix: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        storage::write_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        storage::read_json(path)
    }
}
