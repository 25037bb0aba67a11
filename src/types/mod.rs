pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// One captured step: two actuator commands and the tracked position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub u1: f64,
    pub u2: f64,
    pub x: f64,
    pub z: f64,
    pub y: f64,
}

impl Sample {
    pub fn to_state(&self) -> StateVec {
        StateVec::new(self.u1, self.u2, self.x, self.z, self.y)
    }

    pub fn from_state(v: &StateVec) -> Self {
        Self {
            u1: v[0],
            u2: v[1],
            x: v[2],
            z: v[3],
            y: v[4],
        }
    }
}
