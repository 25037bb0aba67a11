//! Fixed-weight RBF observer (estimation / fault mode)
//!
//! Replays learned dynamics against a new trajectory. Weights are frozen;
//! the estimate is pulled toward the measurement by a linear feedback gain:
//!
//!   x̄_next = x̄ + ts·B·(x̄ - x) + ts·W·S(x)
//!
//! When the plant still behaves as it did during training, the residual
//! x̄ - x stays small. A fault shows up as a sustained residual.

use log::{debug, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::basis::GridBasis;
use crate::error::{ObserverError, Result};
use crate::snapshot::WeightSnapshot;
use crate::types::{is_finite, scalar_diagonal, StateMat, StateVec, STATE_DIM};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationGains {
    /// Diagonal entry of the feedback gain B (negative for a stable observer)
    pub b: f64,
    /// Nominal time step
    pub ts: f64,
}

impl Default for EstimationGains {
    fn default() -> Self {
        Self { b: -0.25, ts: 1.0 }
    }
}

impl EstimationGains {
    pub fn validate(&self) -> Result<()> {
        if !self.b.is_finite() || !self.ts.is_finite() {
            return Err(ObserverError::Configuration(
                "estimation gains must be finite".to_string(),
            ));
        }
        if self.ts <= 0.0 {
            return Err(ObserverError::Configuration(format!(
                "time step must be positive, got {}",
                self.ts
            )));
        }
        if self.b >= 0.0 {
            warn!(
                "Feedback gain b = {} is not negative; the observer will not converge",
                self.b
            );
        }
        Ok(())
    }
}

/// Output of one estimation step
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EstimationStep {
    /// Prediction for the next measurement
    pub estimate: StateVec,
    /// Current estimate minus current measurement
    pub residual: StateVec,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FaultObserverState {
    pub estimate: [f64; STATE_DIM],
    pub steps: u64,
}

pub struct FaultObserver<'a> {
    basis: &'a GridBasis,
    gains: EstimationGains,
    /// B
    feedback: StateMat,
    /// Frozen [STATE_DIM × basis.len()]
    weights: Array2<f64>,
    estimate: StateVec,
    steps: u64,
}

impl<'a> FaultObserver<'a> {
    pub fn new(basis: &'a GridBasis, weights: Array2<f64>, gains: EstimationGains) -> Result<Self> {
        gains.validate()?;
        if basis.dimension() != STATE_DIM {
            return Err(ObserverError::Configuration(format!(
                "grid has {} axes but the state has {}",
                basis.dimension(),
                STATE_DIM
            )));
        }
        let expected = (STATE_DIM, basis.len());
        if weights.dim() != expected {
            return Err(ObserverError::ShapeMismatch {
                expected,
                found: weights.dim(),
            });
        }
        debug!(
            "Fault observer ready: {} centers, b = {}, ts = {}",
            basis.len(),
            gains.b,
            gains.ts
        );

        Ok(Self {
            basis,
            gains,
            feedback: scalar_diagonal(gains.b),
            weights,
            estimate: StateVec::zeros(),
            steps: 0,
        })
    }

    /// Load frozen weights, checking they were trained on this exact grid.
    pub fn from_snapshot(
        basis: &'a GridBasis,
        snapshot: &WeightSnapshot,
        gains: EstimationGains,
    ) -> Result<Self> {
        let weights = snapshot.matrix_for(basis)?;
        Self::new(basis, weights, gains)
    }

    /// Advance on one measurement. Non-finite input is rejected without
    /// touching the estimate.
    pub fn step(&mut self, measured: &StateVec) -> Result<EstimationStep> {
        if !is_finite(measured) {
            warn!("Skipping non-finite measurement at step {}", self.steps);
            return Err(ObserverError::NumericDegenerate { step: self.steps });
        }

        let s = self.basis.activate(measured.as_slice())?;
        let approximation = self.weights.dot(&s);
        let approximation = StateVec::from_iterator(approximation.iter().copied());

        let residual = self.estimate - measured;
        let ts = self.gains.ts;
        let estimate = self.estimate + (self.feedback * residual) * ts + approximation * ts;

        self.estimate = estimate;
        self.steps += 1;

        Ok(EstimationStep { estimate, residual })
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn estimate(&self) -> StateVec {
        self.estimate
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn reset(&mut self) {
        self.estimate = StateVec::zeros();
        self.steps = 0;
    }

    pub fn get_state(&self) -> FaultObserverState {
        FaultObserverState {
            estimate: self.estimate.into(),
            steps: self.steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{AxisRange, GridConfig};
    use approx::assert_relative_eq;

    fn grid() -> GridBasis {
        GridBasis::new(GridConfig::new(vec![AxisRange::new(0.0, 3.0); STATE_DIM], 4)).unwrap()
    }

    #[test]
    fn test_zero_weights_pure_feedback() {
        let basis = grid();
        let weights = Array2::zeros((STATE_DIM, basis.len()));
        let mut observer = FaultObserver::new(&basis, weights, EstimationGains::default()).unwrap();

        let x = StateVec::repeat(2.0);
        let first = observer.step(&x).unwrap();
        assert_eq!(first.residual, -x);
        // 0 + (-0.25)(-2) = 0.5
        assert_relative_eq!(first.estimate[0], 0.5);

        let second = observer.step(&x).unwrap();
        assert_relative_eq!(second.residual[1], -1.5);
        assert_relative_eq!(second.estimate[1], 0.5 + 0.375);
    }

    #[test]
    fn test_weight_term() {
        let basis = grid();
        let mut weights = Array2::zeros((STATE_DIM, basis.len()));
        let center = basis.center(7).unwrap();
        weights[[2, 7]] = 4.0;
        let mut observer = FaultObserver::new(&basis, weights, EstimationGains::default()).unwrap();

        let x = StateVec::from_column_slice(&center);
        let out = observer.step(&x).unwrap();
        // Activation at the center is exactly 1
        assert_relative_eq!(out.estimate[2], 0.25 * x[2] + 4.0);
        assert_relative_eq!(out.estimate[0], 0.25 * x[0]);
    }

    #[test]
    fn test_shape_checked() {
        let basis = grid();
        let weights = Array2::zeros((STATE_DIM, basis.len() - 1));
        let err = FaultObserver::new(&basis, weights, EstimationGains::default())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ObserverError::ShapeMismatch { expected: (5, 1024), found: (5, 1023) }
        ));
    }

    #[test]
    fn test_non_finite_measurement() {
        let basis = grid();
        let weights = Array2::zeros((STATE_DIM, basis.len()));
        let mut observer = FaultObserver::new(&basis, weights, EstimationGains::default()).unwrap();
        observer.step(&StateVec::repeat(1.0)).unwrap();
        let before = observer.estimate();

        let mut bad = StateVec::repeat(1.0);
        bad[0] = f64::INFINITY;
        assert!(observer.step(&bad).unwrap_err().is_recoverable());
        assert_eq!(observer.estimate(), before);
        assert_eq!(observer.steps(), 1);
    }

    #[test]
    fn test_reset() {
        let basis = grid();
        let weights = Array2::zeros((STATE_DIM, basis.len()));
        let mut observer = FaultObserver::new(&basis, weights, EstimationGains::default()).unwrap();
        observer.step(&StateVec::repeat(1.0)).unwrap();
        observer.reset();
        assert_eq!(observer.estimate(), StateVec::zeros());
        assert_eq!(observer.steps(), 0);
    }

    #[test]
    fn test_from_snapshot() {
        let basis = grid();
        let weights = Array2::from_elem((STATE_DIM, basis.len()), 0.01);
        let snapshot = WeightSnapshot::capture(&basis, &weights, 3);
        let mut observer =
            FaultObserver::from_snapshot(&basis, &snapshot, EstimationGains::default()).unwrap();
        assert_eq!(observer.weights(), &weights);

        observer.step(&StateVec::repeat(1.5)).unwrap();
        let state = observer.get_state();
        assert_eq!(state.steps, 1);
        assert_eq!(state.estimate, <[f64; STATE_DIM]>::from(observer.estimate()));
    }
}
