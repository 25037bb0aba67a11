//! Captured trajectories (DataSource)
//!
//! Stored column-wise, one series per channel, the way the capture rig
//! records them. `samples()` yields them in state order (u1, u2, x, z, y).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ObserverError, Result};
use crate::storage;
use crate::types::{Sample, StateVec};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub u1: Vec<f64>,
    pub u2: Vec<f64>,
    pub x: Vec<f64>,
    pub z: Vec<f64>,
    pub y: Vec<f64>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples(samples: &[Sample]) -> Self {
        let mut trajectory = Self::new();
        for sample in samples {
            trajectory.push(sample);
        }
        trajectory
    }

    pub fn from_states<'s>(states: impl IntoIterator<Item = &'s StateVec>) -> Self {
        let mut trajectory = Self::new();
        for state in states {
            trajectory.push(&Sample::from_state(state));
        }
        trajectory
    }

    pub fn push(&mut self, sample: &Sample) {
        self.u1.push(sample.u1);
        self.u2.push(sample.u2);
        self.x.push(sample.x);
        self.z.push(sample.z);
        self.y.push(sample.y);
    }

    pub fn len(&self) -> usize {
        self.u1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All channels must have the same length.
    pub fn validate(&self) -> Result<()> {
        let lengths = [
            ("u2", self.u2.len()),
            ("x", self.x.len()),
            ("z", self.z.len()),
            ("y", self.y.len()),
        ];
        for (name, len) in lengths {
            if len != self.u1.len() {
                return Err(ObserverError::InvalidData(format!(
                    "channel {name} has {len} samples, u1 has {}",
                    self.u1.len()
                )));
            }
        }
        Ok(())
    }

    pub fn state(&self, index: usize) -> Option<StateVec> {
        if index >= self.len() {
            return None;
        }
        Some(StateVec::new(
            self.u1[index],
            self.u2[index],
            self.x[index],
            self.z[index],
            self.y[index],
        ))
    }

    /// States in capture order. Stops at the shortest channel.
    pub fn samples(&self) -> impl Iterator<Item = StateVec> + '_ {
        self.u1
            .iter()
            .zip(&self.u2)
            .zip(&self.x)
            .zip(&self.z)
            .zip(&self.y)
            .map(|((((u1, u2), x), z), y)| StateVec::new(*u1, *u2, *x, *z, *y))
    }

    /// Load and validate a trajectory (`.json` or `.json.gz`).
    pub fn load(path: &Path) -> Result<Self> {
        let trajectory: Self = storage::read_json(path)?;
        trajectory.validate()?;
        Ok(trajectory)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        storage::write_json(path, self)
    }
}
