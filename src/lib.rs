//! Online RBF neural estimator for multi-actuator rigs.
//!
//! A fixed lattice of Gaussian centers (`basis`) feeds two observers: a
//! deterministic-learning observer that adapts weights while tracking a
//! trajectory, and a frozen-weight observer whose residual, smoothed by a
//! causal moving average, serves as a fault indicator.

pub mod basis;
pub mod config;
pub mod dataset;
pub mod error;
pub mod excitation;
pub mod filters;
pub mod session;
pub mod smoothing;
pub mod snapshot;
pub mod storage;
pub mod types;

pub use basis::{AxisRange, GridBasis, GridConfig};
pub use config::ObserverConfig;
pub use dataset::Trajectory;
pub use error::{ObserverError, Result};
pub use filters::{DeterministicLearner, EstimationGains, FaultObserver, TrainingGains};
pub use smoothing::{residual_envelope, EnvelopeConfig, EnvelopeTracker};
pub use snapshot::WeightSnapshot;
pub use types::{StateVec, STATE_DIM};
