//! Excitation schedules for the four-motor rig
//!
//! Generates the stepper commands that drive the platform through its
//! operating envelope while training and fault data are captured. Each
//! schedule row is one control step: a signed tick count per motor. The
//! first two entries of a row are what gets recorded as (u1, u2).
//!
//! Only the command sequence is produced here; driving the motors is the
//! rig controller's job.

use serde::{Deserialize, Serialize};

use crate::error::{ObserverError, Result};

pub const MOTOR_COUNT: usize = 4;

pub type Command = [i64; MOTOR_COUNT];

/// Direction pattern per motor: > 0 moves forward, anything else backward.
pub type Pattern = [i8; MOTOR_COUNT];

/// The six direction legs of one excitation round, in order.
pub const ROUND_PATTERNS: [Pattern; 6] = [
    [-1, 0, 1, 0],
    [0, -1, -1, 0],
    [1, 0, 0, 1],
    [-1, 0, 1, 0],
    [0, 0, -1, -1],
    [1, 1, 0, 0],
];

/// Half-sine tick ramp up to `amplitude` and back down.
///
/// Samples `floor(u * sin(pi * t / 2u))` at `u / 2` points
/// `t = 1, 1 + h, ...` with `h = (u - 2) / (u / 2)`, then mirrors them.
pub fn sweep_profile(amplitude: u32) -> Vec<i64> {
    let u = amplitude as f64;
    let n = (amplitude / 2) as usize;
    if n == 0 {
        return Vec::new();
    }
    let step = (u - 2.0) / n as f64;
    let rising: Vec<i64> = (0..n)
        .map(|i| {
            let t = 1.0 + step * i as f64;
            (u * (std::f64::consts::PI * t / (2.0 * u)).sin()).floor() as i64
        })
        .collect();

    let mut profile = rising.clone();
    profile.extend(rising.iter().rev());
    profile
}

/// One command per profile magnitude, signed per motor by `pattern`.
pub fn command_block(pattern: &Pattern, profile: &[i64]) -> Vec<Command> {
    profile
        .iter()
        .map(|&m| pattern.map(|dir| if dir > 0 { m } else { -m }))
        .collect()
}

/// Like `command_block`, with motor `faulted` held at zero.
pub fn faulted_command_block(
    pattern: &Pattern,
    profile: &[i64],
    faulted: usize,
) -> Result<Vec<Command>> {
    if faulted >= MOTOR_COUNT {
        return Err(ObserverError::Configuration(format!(
            "motor index {faulted} out of range (rig has {MOTOR_COUNT})"
        )));
    }
    let mut block = command_block(pattern, profile);
    for command in &mut block {
        command[faulted] = 0;
    }
    Ok(block)
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcitationPlan {
    /// Peak ticks per step
    pub amplitude: u32,
    /// Healthy rounds captured first
    pub nominal_rounds: usize,
    /// Rounds with the faulted motor disabled
    pub fault_rounds: usize,
    /// Motor held at zero during fault rounds, if any
    pub fault_motor: Option<usize>,
}

impl Default for ExcitationPlan {
    fn default() -> Self {
        Self {
            amplitude: 10,
            nominal_rounds: 5,
            fault_rounds: 5,
            fault_motor: Some(3),
        }
    }
}

impl ExcitationPlan {
    fn round(&self, faulted: Option<usize>) -> Result<Vec<Command>> {
        let profile = sweep_profile(self.amplitude);
        let mut round = Vec::new();
        for pattern in &ROUND_PATTERNS {
            match faulted {
                Some(motor) => round.extend(faulted_command_block(pattern, &profile, motor)?),
                None => round.extend(command_block(pattern, &profile)),
            }
        }
        Ok(round)
    }

    /// Nominal rounds followed by fault rounds.
    pub fn schedule(&self) -> Result<Vec<Command>> {
        let nominal = self.round(None)?;
        let faulted = self.round(self.fault_motor)?;

        let mut schedule = Vec::with_capacity(
            nominal.len() * self.nominal_rounds + faulted.len() * self.fault_rounds,
        );
        for _ in 0..self.nominal_rounds {
            schedule.extend_from_slice(&nominal);
        }
        for _ in 0..self.fault_rounds {
            schedule.extend_from_slice(&faulted);
        }
        Ok(schedule)
    }

    /// Moves the platform from rest to the start of the schedule.
    pub fn approach(&self) -> Vec<Command> {
        command_block(&[1, 1, 0, 0], &sweep_profile(self.amplitude))
    }

    /// Moves the platform back to rest afterwards.
    pub fn retreat(&self) -> Vec<Command> {
        command_block(&[-1, -1, 0, 0], &sweep_profile(self.amplitude))
    }
}
