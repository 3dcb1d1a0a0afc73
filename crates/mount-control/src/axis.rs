//! Axis Controller
//!
//! Rate-limited stepping of one mount axis toward its target. The
//! altitude axis is clamped to a closed range; azimuth wraps and always
//! takes the shorter way round.
//!
//! State and actuator share one lock, so a `stop()` is ordered strictly
//! before or after any tick and the actuator is left neutral either way.

use celestial_mechanics::angles::{self, AngleError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::actuator::{Actuator, Direction};
use crate::AxisKind;

const EVENT_CAPACITY: usize = 256;

/// Legal angle domain of an axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AxisDomain {
    Bounded { min: f64, max: f64 },
    Wrapping { period: f64 },
}

impl AxisDomain {
    /// Clamp or wrap into the domain
    pub fn normalize(&self, angle: f64) -> angles::Result<f64> {
        match *self {
            AxisDomain::Bounded { min, max } => angles::clamp(angle, min, max),
            AxisDomain::Wrapping { period } => angles::wrap(angle, period),
        }
    }

    /// Signed travel from `from` to `to`
    pub fn delta(&self, from: f64, to: f64) -> angles::Result<f64> {
        match *self {
            AxisDomain::Bounded { .. } => {
                if from.is_finite() && to.is_finite() {
                    Ok(to - from)
                } else {
                    Err(AngleError::InvalidAngle(if from.is_finite() { to } else { from }))
                }
            }
            AxisDomain::Wrapping { period } => angles::shortest_delta(from, to, period),
        }
    }

    pub fn contains(&self, angle: f64) -> bool {
        match *self {
            AxisDomain::Bounded { min, max } => (min..=max).contains(&angle),
            AxisDomain::Wrapping { period } => angle >= 0.0 && angle < period,
        }
    }

    fn lower_bound(&self) -> f64 {
        match *self {
            AxisDomain::Bounded { min, .. } => min,
            AxisDomain::Wrapping { .. } => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisConfig {
    pub kind: AxisKind,
    pub domain: AxisDomain,
    pub min_speed: f64,
    pub max_speed: f64,
    pub default_speed: f64,
    pub tolerance: f64,
    pub fault_threshold: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisMode {
    Idle,
    Moving,
    Fault,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisState {
    pub current: f64,
    pub target: f64,
    /// Degrees per tick
    pub speed: f64,
    pub mode: AxisMode,
    pub consecutive_errors: u32,
    pub last_drive: Direction,
}

/// Feedback published on every state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AxisEvent {
    PositionUpdated { axis: AxisKind, current: f64, target: f64 },
    Arrived { axis: AxisKind, position: f64 },
    Error { axis: AxisKind, message: String },
    Faulted { axis: AxisKind, reason: String },
    FaultCleared { axis: AxisKind },
}

impl AxisEvent {
    pub fn axis(&self) -> AxisKind {
        match self {
            AxisEvent::PositionUpdated { axis, .. }
            | AxisEvent::Arrived { axis, .. }
            | AxisEvent::Error { axis, .. }
            | AxisEvent::Faulted { axis, .. }
            | AxisEvent::FaultCleared { axis } => *axis,
        }
    }
}

struct AxisInner {
    state: AxisState,
    actuator: Box<dyn Actuator>,
}

pub struct AxisController {
    config: AxisConfig,
    inner: Mutex<AxisInner>,
    events: broadcast::Sender<AxisEvent>,
}

impl AxisController {
    /// New axis parked at the low end of its domain
    pub fn new(config: AxisConfig, actuator: Box<dyn Actuator>) -> Self {
        let home = config.domain.lower_bound();
        Self::with_position(config, actuator, home)
    }

    pub fn with_position(config: AxisConfig, actuator: Box<dyn Actuator>, position: f64) -> Self {
        let home = config.domain.lower_bound();
        let position = config.domain.normalize(position).unwrap_or(home);
        let speed = config.default_speed.clamp(config.min_speed, config.max_speed);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Mutex::new(AxisInner {
                state: AxisState {
                    current: position,
                    target: position,
                    speed,
                    mode: AxisMode::Idle,
                    consecutive_errors: 0,
                    last_drive: Direction::Neutral,
                },
                actuator,
            }),
            config,
            events,
        }
    }

    pub fn kind(&self) -> AxisKind {
        self.config.kind
    }

    pub fn config(&self) -> &AxisConfig {
        &self.config
    }

    pub fn state(&self) -> AxisState {
        self.inner.lock().state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AxisEvent> {
        self.events.subscribe()
    }

    /// At rest on the target
    pub fn is_settled(&self) -> bool {
        let state = self.state();
        state.mode == AxisMode::Idle && self.within_tolerance(&state)
    }

    fn within_tolerance(&self, state: &AxisState) -> bool {
        self.config
            .domain
            .delta(state.current, state.target)
            .map(|d| d.abs() < self.config.tolerance)
            .unwrap_or(false)
    }

    fn emit(&self, event: AxisEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Set a new target, clamped or wrapped into the axis domain.
    ///
    /// Never moves the axis. A non-finite angle is replaced by "no motion"
    /// (target = current) and reported on the event channel.
    pub fn set_target(&self, angle: f64) -> f64 {
        let axis = self.config.kind;
        let mut inner = self.inner.lock();
        let state = &mut inner.state;

        match self.config.domain.normalize(angle) {
            Ok(target) => {
                if target != angle {
                    debug!(%axis, requested = angle, target, "Target normalized");
                }
                state.target = target;
                target
            }
            Err(e) => {
                warn!(%axis, error = %e, "Rejected target, holding position");
                state.target = state.current;
                if state.mode == AxisMode::Moving {
                    state.mode = AxisMode::Idle;
                }
                self.emit(AxisEvent::Error {
                    axis,
                    message: format!("{e}; holding position"),
                });
                state.target
            }
        }
    }

    /// Set the step size, clamped to `[min_speed, max_speed]`
    pub fn set_speed(&self, speed: f64) -> f64 {
        let axis = self.config.kind;
        let mut inner = self.inner.lock();
        match angles::clamp(speed, self.config.min_speed, self.config.max_speed) {
            Ok(speed) => {
                inner.state.speed = speed;
                speed
            }
            Err(e) => {
                warn!(%axis, error = %e, "Rejected speed");
                self.emit(AxisEvent::Error {
                    axis,
                    message: format!("{e}; speed unchanged"),
                });
                inner.state.speed
            }
        }
    }

    /// Drive the actuator, counting consecutive failures.
    ///
    /// Returns true if this call pushed the axis into `Fault`.
    fn drive(&self, inner: &mut AxisInner, direction: Direction) -> bool {
        let axis = self.config.kind;
        match inner.actuator.drive(direction) {
            Ok(()) => {
                inner.state.consecutive_errors = 0;
                inner.state.last_drive = direction;
                false
            }
            Err(e) => {
                inner.state.consecutive_errors += 1;
                let count = inner.state.consecutive_errors;
                warn!(%axis, error = %e, count, "Actuator error");
                self.emit(AxisEvent::Error {
                    axis,
                    message: e.to_string(),
                });

                if count >= self.config.fault_threshold && inner.state.mode != AxisMode::Fault {
                    inner.state.mode = AxisMode::Fault;
                    let reason = format!("{count} consecutive actuator errors, last: {e}");
                    warn!(%axis, %reason, "Axis faulted");
                    self.emit(AxisEvent::Faulted { axis, reason });
                    true
                } else {
                    false
                }
            }
        }
    }

    /// One control-loop step. Returns the mode after the step.
    pub fn tick(&self) -> AxisMode {
        let axis = self.config.kind;
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.state.mode == AxisMode::Fault {
            return AxisMode::Fault;
        }

        let delta = match self.config.domain.delta(inner.state.current, inner.state.target) {
            Ok(delta) => delta,
            Err(e) => {
                // Unreachable while the domain invariants hold
                warn!(%axis, error = %e, "Invalid axis state, holding position");
                inner.state.target = inner.state.current;
                0.0
            }
        };

        if delta.abs() < self.config.tolerance {
            if inner.state.mode == AxisMode::Moving {
                self.arrive(inner);
            } else if inner.state.last_drive != Direction::Neutral {
                self.drive(inner, Direction::Neutral);
            }
            return inner.state.mode;
        }

        let step = inner.state.speed.min(delta.abs()).copysign(delta);
        let next = self
            .config
            .domain
            .normalize(inner.state.current + step)
            .unwrap_or(inner.state.current);

        inner.state.mode = AxisMode::Moving;
        let faulted = self.drive(inner, Direction::of(delta));
        // The intended position is tracked even when the drive failed
        inner.state.current = next;

        debug!(%axis, current = next, target = inner.state.target, "Axis step");
        self.emit(AxisEvent::PositionUpdated {
            axis,
            current: next,
            target: inner.state.target,
        });

        if !faulted && self.within_tolerance(&inner.state) {
            self.arrive(inner);
        }
        inner.state.mode
    }

    fn arrive(&self, inner: &mut AxisInner) {
        let axis = self.config.kind;
        inner.state.current = inner.state.target;
        if self.drive(inner, Direction::Neutral) {
            return;
        }
        if inner.state.mode != AxisMode::Fault {
            inner.state.mode = AxisMode::Idle;
        }
        debug!(%axis, position = inner.state.current, "Axis arrived");
        self.emit(AxisEvent::Arrived {
            axis,
            position: inner.state.current,
        });
    }

    /// Halt at the current position. Idempotent; a faulted axis stays
    /// faulted but is still asked to go neutral.
    pub fn stop(&self) {
        let axis = self.config.kind;
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        inner.state.target = inner.state.current;
        if inner.state.last_drive != Direction::Neutral || inner.state.mode == AxisMode::Moving {
            self.drive(inner, Direction::Neutral);
        }
        if inner.state.mode == AxisMode::Moving {
            inner.state.mode = AxisMode::Idle;
        }

        self.emit(AxisEvent::PositionUpdated {
            axis,
            current: inner.state.current,
            target: inner.state.target,
        });
    }

    /// Clear a fault and hold the current position
    pub fn reset(&self) {
        let axis = self.config.kind;
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.state.mode != AxisMode::Fault {
            return;
        }

        inner.state.mode = AxisMode::Idle;
        inner.state.consecutive_errors = 0;
        inner.state.target = inner.state.current;
        info!(%axis, "Axis fault cleared");
        self.emit(AxisEvent::FaultCleared { axis });
        self.drive(inner, Direction::Neutral);
    }
}
