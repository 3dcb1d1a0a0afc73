//! Actuator drivers
//!
//! The axis loop only ever asks an actuator to drive in one of three
//! directions. Real motor drivers implement [`Actuator`]; the simulated
//! one records every command and can be told to fail.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Negative,
    Neutral,
    Positive,
}

impl Direction {
    /// Direction of travel for a signed delta
    pub fn of(delta: f64) -> Self {
        if delta > 0.0 {
            Direction::Positive
        } else if delta < 0.0 {
            Direction::Negative
        } else {
            Direction::Neutral
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActuatorError {
    #[error("Actuator I/O error: {0}")]
    Io(String),
    #[error("Actuator disconnected")]
    Disconnected,
}

pub trait Actuator: Send {
    fn drive(&mut self, direction: Direction) -> Result<(), ActuatorError>;
}

#[derive(Debug, Default)]
struct SimulatedState {
    commands: Vec<Direction>,
    fail_next: u32,
    fail_always: bool,
}

/// In-memory actuator. Clones share state, so a test can keep one handle
/// while the axis owns another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedActuator {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` drive commands
    pub fn fail_next(&self, count: u32) {
        self.state.lock().fail_next = count;
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().fail_always = failing;
    }

    /// Every successful drive command, oldest first
    pub fn commands(&self) -> Vec<Direction> {
        self.state.lock().commands.clone()
    }

    pub fn last_direction(&self) -> Option<Direction> {
        self.state.lock().commands.last().copied()
    }
}

impl Actuator for SimulatedActuator {
    fn drive(&mut self, direction: Direction) -> Result<(), ActuatorError> {
        let mut state = self.state.lock();
        if state.fail_always {
            return Err(ActuatorError::Io("simulated failure".into()));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(ActuatorError::Io("simulated failure".into()));
        }
        state.commands.push(direction);
        Ok(())
    }
}
