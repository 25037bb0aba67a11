//! Batch runs over captured trajectories.
//!
//! Batch processing is just repeated streaming steps. Samples the observers
//! reject as non-finite are counted and skipped; any other error aborts.

use std::any::Any;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::basis::GridBasis;
use crate::dataset::Trajectory;
use crate::error::{ObserverError, Result};
use crate::filters::{DeterministicLearner, EstimationGains, FaultObserver, TrainingGains};
use crate::smoothing::{self, EnvelopeConfig};
use crate::snapshot::WeightSnapshot;
use crate::types::{Sample, StateVec};

pub struct TrainingRun {
    /// Prediction issued at each accepted sample
    pub estimates: Vec<StateVec>,
    /// Tracking error (estimate - measurement) at each accepted sample
    pub errors: Vec<StateVec>,
    pub skipped: usize,
    pub snapshot: WeightSnapshot,
}

impl TrainingRun {
    /// Per-component RMSE of the tracking error, ignoring the first `skip`
    /// samples. `None` when nothing is left.
    pub fn tracking_rmse(&self, skip: usize) -> Option<StateVec> {
        let tail = self.errors.get(skip..)?;
        if tail.is_empty() {
            return None;
        }
        let sum_sq = tail
            .iter()
            .fold(StateVec::zeros(), |acc, e| acc + e.component_mul(e));
        Some((sum_sq / tail.len() as f64).map(f64::sqrt))
    }
}

pub struct DetectionRun {
    pub estimates: Vec<StateVec>,
    /// Estimate minus measurement, one per accepted sample
    pub residuals: Vec<StateVec>,
    /// Smoothed residual magnitude after the warm-up cut
    pub envelope: Vec<StateVec>,
    pub skipped: usize,
}

/// Serializable view of a detection run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectionReport {
    pub estimates: Vec<Sample>,
    pub residuals: Vec<Sample>,
    pub envelope: Vec<Sample>,
    pub skipped: usize,
}

impl DetectionRun {
    pub fn report(&self) -> DetectionReport {
        let rows = |series: &[StateVec]| -> Vec<Sample> {
            series.iter().map(Sample::from_state).collect()
        };
        DetectionReport {
            estimates: rows(&self.estimates[..]),
            residuals: rows(&self.residuals[..]),
            envelope: rows(&self.envelope[..]),
            skipped: self.skipped,
        }
    }
}

/// Learn from zero weights over one trajectory.
pub fn train(
    basis: &GridBasis,
    gains: TrainingGains,
    trajectory: &Trajectory,
) -> Result<TrainingRun> {
    let mut learner = DeterministicLearner::new(basis, gains)?;
    train_with(&mut learner, trajectory)
}

/// Feed a trajectory through an existing learner (e.g. one resumed from a
/// snapshot). The learner's estimates are reset first; weights carry over.
pub fn train_with(
    learner: &mut DeterministicLearner<'_>,
    trajectory: &Trajectory,
) -> Result<TrainingRun> {
    trajectory.validate()?;
    learner.reset();
    debug!(
        "Training over {} samples on {} centers",
        trajectory.len(),
        learner.basis().len()
    );

    let mut estimates = Vec::with_capacity(trajectory.len());
    let mut errors = Vec::with_capacity(trajectory.len());
    let mut skipped = 0;
    for state in trajectory.samples() {
        match learner.observe(&state) {
            Ok(step) => {
                estimates.push(step.estimate);
                errors.push(step.error);
            }
            Err(e) if e.is_recoverable() => skipped += 1,
            Err(e) => return Err(e),
        }
    }

    if skipped > 0 {
        warn!("Skipped {} non-finite samples during training", skipped);
    }
    info!(
        "Training finished: {} steps accepted, {} skipped",
        estimates.len(),
        skipped
    );

    Ok(TrainingRun {
        estimates,
        errors,
        skipped,
        snapshot: learner.snapshot(),
    })
}

fn run_detection(
    mut observer: FaultObserver<'_>,
    envelope: &EnvelopeConfig,
    trajectory: &Trajectory,
) -> Result<DetectionRun> {
    trajectory.validate()?;

    let mut estimates = Vec::with_capacity(trajectory.len());
    let mut residuals = Vec::with_capacity(trajectory.len());
    let mut skipped = 0;
    for state in trajectory.samples() {
        match observer.step(&state) {
            Ok(step) => {
                estimates.push(step.estimate);
                residuals.push(step.residual);
            }
            Err(e) if e.is_recoverable() => skipped += 1,
            Err(e) => return Err(e),
        }
    }
    if skipped > 0 {
        warn!("Skipped {} non-finite samples during detection", skipped);
    }

    let envelope = smoothing::analyze(&residuals, envelope)?;
    Ok(DetectionRun {
        estimates,
        residuals,
        envelope,
        skipped,
    })
}

/// Replay frozen weights over one trajectory and smooth the residual.
pub fn detect(
    basis: &GridBasis,
    snapshot: &WeightSnapshot,
    gains: EstimationGains,
    envelope: &EnvelopeConfig,
    trajectory: &Trajectory,
) -> Result<DetectionRun> {
    let observer = FaultObserver::from_snapshot(basis, snapshot, gains)?;
    let run = run_detection(observer, envelope, trajectory)?;
    info!(
        "Detection finished: {} residuals, {} skipped",
        run.residuals.len(),
        run.skipped
    );
    Ok(run)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one independent observer per trajectory in parallel.
///
/// Each worker owns its observer and weight copy; only the basis and the
/// input trajectories are shared, read-only. Results come back in input
/// order.
pub fn detect_units(
    basis: &GridBasis,
    snapshot: &WeightSnapshot,
    gains: EstimationGains,
    envelope: &EnvelopeConfig,
    trajectories: &[Trajectory],
) -> Result<Vec<DetectionRun>> {
    let weights = snapshot.matrix_for(basis)?;
    let weights = &weights;

    let joined = crossbeam::scope(|scope| {
        let handles: Vec<_> = trajectories
            .iter()
            .map(|trajectory| {
                scope.spawn(move |_| {
                    let observer = FaultObserver::new(basis, weights.clone(), gains)?;
                    run_detection(observer, envelope, trajectory)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|payload| ObserverError::WorkerPanic(panic_message(payload)))
                    .and_then(|run| run)
            })
            .collect::<Result<Vec<_>>>()
    })
    .map_err(|payload| ObserverError::WorkerPanic(panic_message(payload)))?;

    let runs = joined?;
    info!("Detection finished for {} units", runs.len());
    Ok(runs)
}
