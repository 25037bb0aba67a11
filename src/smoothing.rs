use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::{ObserverError, Result};
use crate::types::StateVec;

/// Residual envelope settings
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Moving-average width in samples
    pub window: usize,
    /// Leading residuals dropped before smoothing (observer transient)
    pub warmup: usize,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            window: 120,
            warmup: 20,
        }
    }
}

/// Causal moving average of residual magnitudes, one component per state axis.
///
/// Behaves as if the series were preceded by `window_size - 1` zeros: the
/// output ramps up from zero instead of averaging over a partial window,
/// and never looks ahead.
pub struct EnvelopeTracker {
    window: VecDeque<StateVec>,
    window_size: usize,
}

impl EnvelopeTracker {
    /// Create a new tracker with given window size (typically 120)
    pub fn new(window_size: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(ObserverError::Configuration(
                "envelope window must be at least one sample".to_string(),
            ));
        }
        Ok(EnvelopeTracker {
            window: VecDeque::with_capacity(window_size),
            window_size,
        })
    }

    /// Push one residual and return the envelope at that step
    pub fn apply(&mut self, residual: &StateVec) -> StateVec {
        self.window.push_back(residual.abs());
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }

        // Missing history counts as zero, so divide by the full width
        let sum = self
            .window
            .iter()
            .fold(StateVec::zeros(), |acc, r| acc + r);
        sum / self.window_size as f64
    }

    /// Samples currently held (saturates at the window size)
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Forget the history; the next envelope ramps up from zero again.
    pub fn reset(&mut self) {
        self.window.clear();
    }
}

/// Envelope of a whole residual series; same length as the input.
pub fn residual_envelope(residuals: &[StateVec], window_size: usize) -> Result<Vec<StateVec>> {
    let mut tracker = EnvelopeTracker::new(window_size)?;
    Ok(residuals.iter().map(|r| tracker.apply(r)).collect())
}

/// Drop the warm-up transient, then smooth what is left.
pub fn analyze(residuals: &[StateVec], config: &EnvelopeConfig) -> Result<Vec<StateVec>> {
    let start = config.warmup.min(residuals.len());
    residual_envelope(&residuals[start..], config.window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn constant(value: f64) -> StateVec {
        StateVec::repeat(value)
    }

    #[test]
    fn test_zero_series_gives_zero_envelope() {
        let residuals = vec![StateVec::zeros(); 500];
        let envelope = residual_envelope(&residuals, 120).unwrap();
        assert_eq!(envelope.len(), 500);
        assert!(envelope.iter().all(|e| *e == StateVec::zeros()));
    }

    #[test]
    fn test_left_padding_is_causal() {
        let c = 3.0;
        let mut residuals = vec![StateVec::zeros(); 119];
        residuals.extend(std::iter::repeat(constant(c)).take(200));

        let envelope = residual_envelope(&residuals, 120).unwrap();
        assert_eq!(envelope.len(), residuals.len());
        for t in 0..119 {
            assert_eq!(envelope[t], StateVec::zeros());
        }
        assert_relative_eq!(envelope[119][0], c / 120.0);
        assert_relative_eq!(envelope[238][4], c, max_relative = 1e-12);
    }

    #[test]
    fn test_warm_up_ramp() {
        let residuals = vec![constant(2.0); 4];
        let envelope = residual_envelope(&residuals, 4).unwrap();
        let expected = [0.5, 1.0, 1.5, 2.0];
        for (e, want) in envelope.iter().zip(expected) {
            assert_relative_eq!(e[2], want);
        }
    }

    #[test]
    fn test_uses_magnitude() {
        let residuals = vec![constant(-1.0), constant(1.0)];
        let envelope = residual_envelope(&residuals, 2).unwrap();
        assert_relative_eq!(envelope[1][3], 1.0);
        assert!(envelope.iter().all(|e| e.iter().all(|v| *v >= 0.0)));
    }

    #[test]
    fn test_window_drops_old_samples() {
        let mut tracker = EnvelopeTracker::new(2).unwrap();
        tracker.apply(&constant(10.0));
        tracker.apply(&constant(2.0));
        let result = tracker.apply(&constant(4.0));
        assert_eq!(tracker.len(), 2);
        assert_relative_eq!(result[0], 3.0);
    }

    #[test]
    fn test_reset_restarts_ramp() {
        let mut tracker = EnvelopeTracker::new(4).unwrap();
        for _ in 0..6 {
            tracker.apply(&constant(8.0));
        }
        tracker.reset();
        assert!(tracker.is_empty());
        let first = tracker.apply(&constant(8.0));
        assert_relative_eq!(first[0], 2.0);
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(EnvelopeTracker::new(0).is_err());
        assert!(residual_envelope(&[StateVec::zeros()], 0).is_err());
    }

    #[test]
    fn test_analyze_skips_warmup() {
        let mut residuals = vec![constant(100.0); 20];
        residuals.extend(vec![constant(1.0); 10]);
        let config = EnvelopeConfig {
            window: 5,
            warmup: 20,
        };
        let envelope = analyze(&residuals, &config).unwrap();
        assert_eq!(envelope.len(), 10);
        assert_relative_eq!(envelope[9][1], 1.0);

        let short = analyze(&residuals[..3], &config).unwrap();
        assert!(short.is_empty());
    }
}
