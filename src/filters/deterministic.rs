//! Deterministic-learning RBF observer (training mode)
//!
//! Tracks a live trajectory while adapting a weight matrix W so that
//! `W · S(x)` approximates the unknown one-step dynamics along it.
//!
//! Per step, with s0 = S(x_prev), s1 = S(x_curr):
//!   e0 = x̂_prev - x_prev
//!   e1 = x̂_curr - x_curr
//!   W ← W - α·P·(e1 - a·e0)·s0ᵀ / (1 + λ·s0ᵀs0)
//!   x̂_next = x_curr + a·e1 + ts·W·s1
//!
//! The denominator is ≥ 1, which bounds the correction whatever the
//! activation scale. Early steps are dominated by the zero initial
//! estimate; consumers drop them, the recursion does not.

use log::warn;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::basis::GridBasis;
use crate::error::{ObserverError, Result};
use crate::snapshot::WeightSnapshot;
use crate::types::{is_finite, scalar_diagonal, StateMat, StateVec, STATE_DIM};

/// Fixed per-run parameters of the learning law
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingGains {
    /// Diagonal entry of the gain matrix P
    pub p: f64,
    /// Learning rate α
    pub alpha: f64,
    /// Error feedback gain
    pub a: f64,
    /// Normalization strength λ
    pub lambda: f64,
    /// Nominal time step
    pub ts: f64,
}

impl Default for TrainingGains {
    fn default() -> Self {
        Self {
            p: 5.0,
            alpha: 1.5,
            a: 0.5,
            lambda: 5.0,
            ts: 1.0,
        }
    }
}

impl TrainingGains {
    pub fn validate(&self) -> Result<()> {
        let all = [self.p, self.alpha, self.a, self.lambda, self.ts];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(ObserverError::Configuration(
                "training gains must be finite".to_string(),
            ));
        }
        if self.lambda <= 0.0 {
            return Err(ObserverError::Configuration(format!(
                "normalization strength must be positive, got {}",
                self.lambda
            )));
        }
        if self.ts <= 0.0 {
            return Err(ObserverError::Configuration(format!(
                "time step must be positive, got {}",
                self.ts
            )));
        }
        Ok(())
    }

    /// α·P
    fn scaled_gain(&self) -> StateMat {
        scalar_diagonal(self.p) * self.alpha
    }
}

/// Output of one learning step
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LearningStep {
    /// Prediction for the next measurement
    pub estimate: StateVec,
    /// Tracking error at the current measurement (estimate - measurement)
    pub error: StateVec,
    /// Normalization denominator used for this update
    pub denominator: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LearnerState {
    pub estimate: [f64; STATE_DIM],
    pub previous_estimate: [f64; STATE_DIM],
    pub weight_norm: f64,
    pub steps: u64,
}

pub struct DeterministicLearner<'a> {
    basis: &'a GridBasis,
    gains: TrainingGains,

    /// α·P, fixed for the run
    gain: StateMat,

    /// [STATE_DIM × basis.len()]
    weights: Array2<f64>,

    /// Estimate that was issued for the previous measurement
    previous_estimate: StateVec,

    /// Estimate issued for the upcoming measurement
    estimate: StateVec,

    last_measurement: Option<StateVec>,
    steps: u64,
}

impl<'a> DeterministicLearner<'a> {
    /// Start from zero weights and a zero estimate.
    pub fn new(basis: &'a GridBasis, gains: TrainingGains) -> Result<Self> {
        let weights = Array2::zeros((STATE_DIM, basis.len()));
        Self::with_weights(basis, gains, weights)
    }

    /// Continue learning from existing weights.
    pub fn with_weights(
        basis: &'a GridBasis,
        gains: TrainingGains,
        weights: Array2<f64>,
    ) -> Result<Self> {
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

        Ok(Self {
            basis,
            gains,
            gain: gains.scaled_gain(),
            weights,
            previous_estimate: StateVec::zeros(),
            estimate: StateVec::zeros(),
            last_measurement: None,
            steps: 0,
        })
    }

    /// Resume from a persisted snapshot; the grid must match `basis`.
    pub fn from_snapshot(
        basis: &'a GridBasis,
        gains: TrainingGains,
        snapshot: &WeightSnapshot,
    ) -> Result<Self> {
        let weights = snapshot.matrix_for(basis)?;
        let mut learner = Self::with_weights(basis, gains, weights)?;
        learner.steps = snapshot.steps;
        Ok(learner)
    }

    /// One adaptation step over the measurement pair `(prev, curr)`.
    ///
    /// Non-finite measurements are rejected with `NumericDegenerate` and leave
    /// the learner untouched, so the caller may skip the sample and go on.
    pub fn step(&mut self, prev: &StateVec, curr: &StateVec) -> Result<LearningStep> {
        if !is_finite(prev) || !is_finite(curr) {
            warn!("Skipping non-finite training sample at step {}", self.steps);
            return Err(ObserverError::NumericDegenerate { step: self.steps });
        }

        let s0 = self.basis.activate(prev.as_slice())?;
        let s1 = self.basis.activate(curr.as_slice())?;

        let e0 = self.previous_estimate - prev;
        let e1 = self.estimate - curr;

        let correction = self.gain * (e1 - e0 * self.gains.a);
        let denominator = 1.0 + self.gains.lambda * s0.dot(&s0);
        for (mut row, g) in self.weights.rows_mut().into_iter().zip(correction.iter()) {
            row.zip_mut_with(&s0, |w, s| *w -= g * s / denominator);
        }

        let approximation = self.weights.dot(&s1);
        let approximation = StateVec::from_iterator(approximation.iter().copied());
        let estimate = *curr + e1 * self.gains.a + approximation * self.gains.ts;

        self.previous_estimate = self.estimate;
        self.estimate = estimate;
        self.last_measurement = Some(*curr);
        self.steps += 1;

        Ok(LearningStep {
            estimate,
            error: e1,
            denominator,
        })
    }

    /// Streaming form of `step`: pairs `curr` with the last accepted
    /// measurement. The very first sample is paired with itself.
    pub fn observe(&mut self, curr: &StateVec) -> Result<LearningStep> {
        let prev = self.last_measurement.unwrap_or(*curr);
        self.step(&prev, curr)
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn into_weights(self) -> Array2<f64> {
        self.weights
    }

    pub fn estimate(&self) -> StateVec {
        self.estimate
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn gains(&self) -> &TrainingGains {
        &self.gains
    }

    pub fn basis(&self) -> &'a GridBasis {
        self.basis
    }

    /// Start a new run over the learned weights.
    pub fn reset(&mut self) {
        self.previous_estimate = StateVec::zeros();
        self.estimate = StateVec::zeros();
        self.last_measurement = None;
    }

    pub fn snapshot(&self) -> WeightSnapshot {
        WeightSnapshot::capture(self.basis, &self.weights, self.steps)
    }

    pub fn get_state(&self) -> LearnerState {
        LearnerState {
            estimate: self.estimate.into(),
            previous_estimate: self.previous_estimate.into(),
            weight_norm: self.weights.iter().map(|w| w * w).sum::<f64>().sqrt(),
            steps: self.steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{AxisRange, GridConfig};
    use approx::assert_relative_eq;

    fn unit_grid(resolution: usize) -> GridBasis {
        GridBasis::new(GridConfig::new(
            vec![AxisRange::new(-1.0, 2.0); STATE_DIM],
            resolution,
        ))
        .unwrap()
    }

    #[test]
    fn test_single_step_closed_form() {
        let basis = unit_grid(4);
        let gains = TrainingGains::default();
        let mut learner = DeterministicLearner::new(&basis, gains).unwrap();

        let x0 = StateVec::zeros();
        let x1 = StateVec::repeat(1.0);
        let out = learner.step(&x0, &x1).unwrap();

        let s0 = basis.activate(x0.as_slice()).unwrap();
        let s1 = basis.activate(x1.as_slice()).unwrap();
        let den = 1.0 + 5.0 * s0.dot(&s0);
        assert_relative_eq!(out.denominator, den);

        // e0 = 0, e1 = -1, so every weight row gains α·p·s0 / den
        let w = learner.weights();
        for r in 0..STATE_DIM {
            for c in 0..basis.len() {
                assert_relative_eq!(w[[r, c]], 7.5 * s0[c] / den, max_relative = 1e-12);
            }
        }

        let ws = 7.5 * s0.dot(&s1) / den;
        for r in 0..STATE_DIM {
            assert_relative_eq!(out.error[r], -1.0);
            assert_relative_eq!(out.estimate[r], 1.0 - 0.5 + ws, max_relative = 1e-12);
        }
        assert_eq!(learner.steps(), 1);

        // Lattice {-1, 0, 1, 2} per axis: s0·s0 = (1 + 2e^-2 + e^-8)^5,
        // s0·s1 = (2e^-1 + 2e^-5)^5, and x0 sits on center 1 + 4 + 16 + 64 + 256
        assert_relative_eq!(out.denominator, 17.58471671334587, max_relative = 1e-12);
        assert_relative_eq!(out.estimate[0], 0.6006967661675781, max_relative = 1e-12);
        assert_relative_eq!(w[[4, 341]], 0.4265067286701239, max_relative = 1e-12);
    }

    #[test]
    fn test_zero_sequence_is_fixed_point() {
        let basis = unit_grid(3);
        let mut learner = DeterministicLearner::new(&basis, TrainingGains::default()).unwrap();
        let zero = StateVec::zeros();
        for _ in 0..10 {
            let out = learner.observe(&zero).unwrap();
            assert_eq!(out.estimate, zero);
            assert_eq!(out.error, zero);
        }
        assert!(learner.weights().iter().all(|w| *w == 0.0));
    }

    #[test]
    fn test_denominator_at_least_one() {
        let basis = unit_grid(3);
        let mut learner = DeterministicLearner::new(&basis, TrainingGains::default()).unwrap();
        let samples = [
            StateVec::repeat(0.5),
            StateVec::new(-1.0, 2.0, 0.0, 1.0, -0.5),
            StateVec::repeat(50.0),
        ];
        for x in &samples {
            let out = learner.observe(x).unwrap();
            assert!(out.denominator >= 1.0);
        }
    }

    #[test]
    fn test_one_step_delayed_error() {
        let basis = unit_grid(3);
        let mut learner = DeterministicLearner::new(&basis, TrainingGains::default()).unwrap();
        let x0 = StateVec::repeat(0.2);
        let x1 = StateVec::repeat(0.4);
        let first = learner.step(&x0, &x1).unwrap();
        let x2 = StateVec::repeat(0.6);
        let second = learner.step(&x1, &x2).unwrap();
        // error reported at x2 is measured against the estimate issued at x1
        assert_eq!(second.error, first.estimate - x2);
    }

    #[test]
    fn test_non_finite_sample_is_skipped() {
        let basis = unit_grid(3);
        let mut learner = DeterministicLearner::new(&basis, TrainingGains::default()).unwrap();
        learner.observe(&StateVec::repeat(0.1)).unwrap();
        let before = learner.weights().clone();

        let mut bad = StateVec::repeat(0.2);
        bad[3] = f64::NAN;
        let err = learner.observe(&bad).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(learner.weights(), &before);
        assert_eq!(learner.steps(), 1);

        assert!(learner.observe(&StateVec::repeat(0.3)).is_ok());
    }

    #[test]
    fn test_rejects_wrong_dimension_grid() {
        let basis = GridBasis::new(GridConfig::new(vec![AxisRange::new(0.0, 1.0); 3], 4)).unwrap();
        assert!(DeterministicLearner::new(&basis, TrainingGains::default()).is_err());
    }

    #[test]
    fn test_rejects_wrong_weight_shape() {
        let basis = unit_grid(3);
        let weights = Array2::zeros((STATE_DIM, 10));
        let err = DeterministicLearner::with_weights(&basis, TrainingGains::default(), weights)
            .err()
            .unwrap();
        assert!(matches!(err, ObserverError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_invalid_gains() {
        let basis = unit_grid(3);
        let gains = TrainingGains {
            lambda: 0.0,
            ..TrainingGains::default()
        };
        assert!(DeterministicLearner::new(&basis, gains).is_err());
    }

    #[test]
    fn test_reset_keeps_weights() {
        let basis = unit_grid(3);
        let mut learner = DeterministicLearner::new(&basis, TrainingGains::default()).unwrap();
        learner.observe(&StateVec::repeat(0.5)).unwrap();
        learner.observe(&StateVec::repeat(1.0)).unwrap();
        let weights = learner.weights().clone();

        learner.reset();
        assert_eq!(learner.estimate(), StateVec::zeros());
        assert_eq!(learner.weights(), &weights);
    }

    #[test]
    fn test_snapshot_resume() {
        let basis = unit_grid(3);
        let mut learner = DeterministicLearner::new(&basis, TrainingGains::default()).unwrap();
        learner.observe(&StateVec::repeat(0.5)).unwrap();
        learner.observe(&StateVec::repeat(1.0)).unwrap();

        let snapshot = learner.snapshot();
        let resumed =
            DeterministicLearner::from_snapshot(&basis, TrainingGains::default(), &snapshot).unwrap();
        assert_eq!(resumed.weights(), learner.weights());
        assert_eq!(resumed.steps(), 2);

        let state = learner.get_state();
        assert_eq!(state.steps, 2);
        assert!(state.weight_norm > 0.0);
        assert_eq!(state.estimate, <[f64; STATE_DIM]>::from(learner.estimate()));
    }
}
