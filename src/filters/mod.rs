pub mod deterministic;
pub mod fault_observer;

pub use deterministic::{DeterministicLearner, LearnerState, LearningStep, TrainingGains};
pub use fault_observer::{EstimationGains, EstimationStep, FaultObserver, FaultObserverState};
