//! Linear algebra type system for the RBF observer
//!
//! The state is a fixed 5-tuple, so per-step vectors and gain matrices
//! get compile-time dimensions. Activation vectors and weight matrices
//! scale with the grid and live in `ndarray` instead.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const STATE_DIM: usize = 5;

// ===== State Types =====
pub type StateVec = SVector<f64, STATE_DIM>;
pub type StateMat = SMatrix<f64, STATE_DIM, STATE_DIM>;

/// Component labels in state order.
pub const STATE_LABELS: [&str; STATE_DIM] = ["u1", "u2", "x", "z", "y"];

/// Diagonal matrix with `value` on every diagonal entry.
pub fn scalar_diagonal(value: f64) -> StateMat {
    StateMat::from_diagonal_element(value)
}

/// True when every component is finite.
pub fn is_finite(v: &StateVec) -> bool {
    v.iter().all(|c| c.is_finite())
}
