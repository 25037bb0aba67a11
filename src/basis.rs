//! Tensor-product grid of Gaussian RBF centers
//!
//! Centers form a regular lattice over a bounded box. Node `j` is indexed
//! mixed-radix with axis 0 varying fastest:
//!
//!   j = i_0 + i_1 * L + i_2 * L^2 + ... + i_{D-1} * L^{D-1}
//!
//! This ordering is what ties a weight column to a center, so a weight
//! matrix is only meaningful together with the `GridConfig` that built it.
//! The full center list is never materialised: at 16^5 nodes it would
//! dominate memory, and the per-axis values are enough to evaluate
//! activations and reconstruct any center on demand.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{ObserverError, Result};

/// Closed interval spanned by one lattice axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Everything needed to rebuild the same lattice, in the same order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub bounds: Vec<AxisRange>,
    pub resolution: usize,
}

impl GridConfig {
    pub fn new(bounds: Vec<AxisRange>, resolution: usize) -> Self {
        Self { bounds, resolution }
    }

    /// Operating envelope of the nominal training captures, 12 nodes per axis.
    pub fn training_default() -> Self {
        Self::new(
            vec![
                AxisRange::new(-19.0, 19.0),       // u1
                AxisRange::new(-19.0, 19.0),       // u2
                AxisRange::new(-2.642, 154.964),   // x
                AxisRange::new(55.125, 185.147),   // z
                AxisRange::new(210.952, 294.607),  // y
            ],
            12,
        )
    }

    /// Wider envelope used for the fault captures, 16 nodes per axis.
    pub fn detection_default() -> Self {
        Self::new(
            vec![
                AxisRange::new(-19.0, 19.0),
                AxisRange::new(-19.0, 19.0),
                AxisRange::new(-47.663, 104.743),
                AxisRange::new(-41.957, 100.893),
                AxisRange::new(184.525, 267.404),
            ],
            16,
        )
    }

    pub fn dimension(&self) -> usize {
        self.bounds.len()
    }

    /// `resolution ^ dimension`, or `None` on overflow.
    pub fn basis_size(&self) -> Option<usize> {
        let dim = u32::try_from(self.dimension()).ok()?;
        self.resolution.checked_pow(dim)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bounds.is_empty() {
            return Err(ObserverError::Configuration(
                "grid needs at least one axis".to_string(),
            ));
        }
        if self.resolution <= 1 {
            return Err(ObserverError::Configuration(format!(
                "grid resolution must exceed 1, got {}",
                self.resolution
            )));
        }
        for (axis, range) in self.bounds.iter().enumerate() {
            if !range.min.is_finite() || !range.max.is_finite() {
                return Err(ObserverError::Configuration(format!(
                    "axis {axis} has non-finite bounds"
                )));
            }
            if range.min >= range.max {
                return Err(ObserverError::Configuration(format!(
                    "axis {axis} bounds are empty or inverted: [{}, {}]",
                    range.min, range.max
                )));
            }
        }
        if self.basis_size().is_none() {
            return Err(ObserverError::Configuration(format!(
                "{} ^ {} centers overflows the address space",
                self.resolution,
                self.dimension()
            )));
        }
        Ok(())
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self::training_default()
    }
}

/// Immutable lattice of RBF centers. Build once, share by reference.
#[derive(Clone, Debug)]
pub struct GridBasis {
    config: GridConfig,
    /// Lattice values per axis, ascending, `resolution` entries each
    axes: Vec<Vec<f64>>,
    /// Per-axis spacing η
    spacing: Vec<f64>,
    len: usize,
}

impl GridBasis {
    pub fn new(config: GridConfig) -> Result<Self> {
        config.validate()?;
        let len = config.basis_size().ok_or_else(|| {
            ObserverError::Configuration("basis size overflow".to_string())
        })?;

        let last = config.resolution - 1;
        let mut axes = Vec::with_capacity(config.dimension());
        let mut spacing = Vec::with_capacity(config.dimension());
        for range in &config.bounds {
            let eta = (range.max - range.min) / last as f64;
            let mut values: Vec<f64> = (0..config.resolution)
                .map(|i| range.min + eta * i as f64)
                .collect();
            // Pin the endpoint instead of trusting the accumulated step
            values[last] = range.max;
            axes.push(values);
            spacing.push(eta);
        }

        Ok(Self {
            config,
            axes,
            spacing,
            len,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Number of centers (`resolution ^ dimension`).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dimension(&self) -> usize {
        self.axes.len()
    }

    pub fn resolution(&self) -> usize {
        self.config.resolution
    }

    pub fn spacing(&self) -> &[f64] {
        &self.spacing
    }

    pub fn axis_values(&self, axis: usize) -> Option<&[f64]> {
        self.axes.get(axis).map(Vec::as_slice)
    }

    /// Coordinates of center `index`, or `None` past the end.
    pub fn center(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.len {
            return None;
        }
        let resolution = self.config.resolution;
        let mut rest = index;
        let coords = self
            .axes
            .iter()
            .map(|values| {
                let i = rest % resolution;
                rest /= resolution;
                values[i]
            })
            .collect();
        Some(coords)
    }

    /// Gaussian activation of every center for `state`.
    ///
    /// Entry `j` is `exp(-Σ_d ((state_d - c_jd) / η_d)^2)`. It is exactly 1.0
    /// when `state` sits on center `j` and decays with normalized distance;
    /// centers more than ~27 spacings away underflow to 0.0 in f64.
    /// Non-finite input propagates into the result; callers screen samples.
    pub fn activate(&self, state: &[f64]) -> Result<Array1<f64>> {
        self.check_dimension(state)?;

        // Squared normalized distance along each axis, per lattice value
        let per_axis: Vec<Vec<f64>> = self
            .axes
            .iter()
            .zip(&self.spacing)
            .zip(state)
            .map(|((values, eta), s)| {
                values
                    .iter()
                    .map(|c| {
                        let d = (s - c) / eta;
                        d * d
                    })
                    .collect()
            })
            .collect();

        // Expand slowest axis first so axis 0 ends up innermost
        let mut sums: Vec<f64> = vec![0.0];
        for q in per_axis.iter().rev() {
            let mut next = Vec::with_capacity(sums.len() * q.len());
            for &partial in &sums {
                next.extend(q.iter().map(|qi| partial + qi));
            }
            sums = next;
        }

        Ok(Array1::from_vec(sums).mapv_into(|v| (-v).exp()))
    }

    /// Index of the center with the largest activation for `state`.
    ///
    /// The Gaussian factorizes per axis, so this is the per-axis nearest
    /// lattice value, clamped into the box. A non-finite state has no
    /// nearest center and is rejected; the basis keeps no step count, so
    /// the error reports step 0.
    pub fn nearest_center(&self, state: &[f64]) -> Result<usize> {
        self.check_dimension(state)?;
        if state.iter().any(|s| !s.is_finite()) {
            return Err(ObserverError::NumericDegenerate { step: 0 });
        }
        let last = (self.config.resolution - 1) as f64;
        let mut index = 0usize;
        let mut stride = 1usize;
        for ((range, eta), s) in self.config.bounds.iter().zip(&self.spacing).zip(state) {
            let i = ((s - range.min) / eta).round().clamp(0.0, last) as usize;
            index += i * stride;
            stride *= self.config.resolution;
        }
        Ok(index)
    }

    fn check_dimension(&self, state: &[f64]) -> Result<()> {
        if state.len() != self.dimension() {
            return Err(ObserverError::DimensionMismatch {
                expected: self.dimension(),
                found: state.len(),
            });
        }
        Ok(())
    }
}
