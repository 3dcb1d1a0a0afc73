//! Tracking Coordinator
//!
//! Sequences slew-once and continuous-track operations across both axes.
//!
//! ```text
//! Idle ──slew_to──▶ Slewing ──both axes arrived──▶ Idle
//! Idle ──start_tracking──▶ Tracking ──stop/emergency──▶ Stopped
//! any ──axis fault──▶ Fault ──reset──▶ Idle
//! ```
//!
//! The solar interlock is checked inside the same locked transition that
//! admits a command, so no interleaving can put the Sun into Slewing or
//! Tracking without `safety_confirmed`. The session lock is never held
//! while calling into an axis or the calculator; an epoch counter detects
//! commands that were superseded in between.

use std::fmt;
use std::sync::Arc;

use celestial_mechanics::{Body, CelestialCalculator, Observer};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actuator::Actuator;
use crate::axis::{AxisController, AxisEvent, AxisMode};
use crate::config::MountConfig;
use crate::events::{EventKind, EventSink, LogEvent};
use crate::snapshot::PointingContext;
use crate::{AxisKind, MountError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    Sun,
    Moon,
    Manual { altitude: f64, azimuth: f64 },
}

impl Target {
    pub fn kind(&self) -> TargetKind {
        match self {
            Target::Sun => TargetKind::Sun,
            Target::Moon => TargetKind::Moon,
            Target::Manual { .. } => TargetKind::Manual,
        }
    }

    pub fn body(&self) -> Option<Body> {
        match self {
            Target::Sun => Some(Body::Sun),
            Target::Moon => Some(Body::Moon),
            Target::Manual { .. } => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Sun => f.write_str("Sun"),
            Target::Moon => f.write_str("Moon"),
            Target::Manual { altitude, azimuth } => {
                write!(f, "manual (alt {altitude:.2}°, az {azimuth:.2}°)")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    None,
    Sun,
    Moon,
    Manual,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetKind::None => "none",
            TargetKind::Sun => "sun",
            TargetKind::Moon => "moon",
            TargetKind::Manual => "manual",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    Idle,
    Slewing,
    Tracking,
    Stopped,
    Fault,
}

impl TrackingMode {
    /// Axes are being commanded by the coordinator
    pub fn is_active(&self) -> bool {
        matches!(self, TrackingMode::Slewing | TrackingMode::Tracking)
    }
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackingMode::Idle => "idle",
            TrackingMode::Slewing => "slewing",
            TrackingMode::Tracking => "tracking",
            TrackingMode::Stopped => "stopped",
            TrackingMode::Fault => "fault",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSession {
    pub id: Option<Uuid>,
    pub target: Option<Target>,
    pub mode: TrackingMode,
    /// Survives across sessions until explicitly revoked
    pub safety_confirmed: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub target_visible: Option<bool>,
    pub fault_reason: Option<String>,
}

impl TrackingSession {
    fn idle() -> Self {
        Self {
            id: None,
            target: None,
            mode: TrackingMode::Idle,
            safety_confirmed: false,
            started_at: None,
            target_visible: None,
            fault_reason: None,
        }
    }

    pub fn target_kind(&self) -> TargetKind {
        self.target.map(|t| t.kind()).unwrap_or(TargetKind::None)
    }
}

/// UI command set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    SetTarget { axis: AxisKind, angle: f64 },
    SetSpeed { axis: AxisKind, speed: f64 },
    SlewTo { target: Target },
    StartTracking { target: Target },
    StopTracking,
    ConfirmSafety { confirmed: bool },
    EmergencyStop,
    Reset,
    SetObserver { latitude: f64, longitude: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandOutcome {
    Mode { mode: TrackingMode },
    Angle { axis: AxisKind, value: f64 },
    Observer { observer: Observer },
}

/// Resolved pointing for a target at one instant
#[derive(Debug, Clone, Copy)]
struct Aim {
    altitude: f64,
    azimuth: f64,
    visible: bool,
}

struct Shared {
    session: TrackingSession,
    epoch: u64,
    /// Newest pointing for the active session
    aim: Option<Aim>,
    /// Axes have been handed the current session's targets
    aimed: bool,
    /// A tracking update failure has been logged for this streak
    tracking_failed: bool,
}

pub struct TrackingCoordinator {
    calculator: Arc<CelestialCalculator>,
    altitude: Arc<AxisController>,
    azimuth: Arc<AxisController>,
    sink: Arc<dyn EventSink>,
    shared: Mutex<Shared>,
    mode_tx: watch::Sender<TrackingMode>,
}

impl TrackingCoordinator {
    pub fn new(
        calculator: Arc<CelestialCalculator>,
        altitude: Arc<AxisController>,
        azimuth: Arc<AxisController>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (mode_tx, _) = watch::channel(TrackingMode::Idle);
        Self {
            calculator,
            altitude,
            azimuth,
            sink,
            shared: Mutex::new(Shared {
                session: TrackingSession::idle(),
                epoch: 0,
                aim: None,
                aimed: false,
                tracking_failed: false,
            }),
            mode_tx,
        }
    }

    /// Build calculator and both axes from configuration
    pub fn from_config(
        config: &MountConfig,
        altitude_actuator: Box<dyn Actuator>,
        azimuth_actuator: Box<dyn Actuator>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let calculator = CelestialCalculator::new(config.observer)?;
        let altitude = AxisController::new(config.axis_config(AxisKind::Altitude), altitude_actuator);
        let azimuth = AxisController::new(config.axis_config(AxisKind::Azimuth), azimuth_actuator);
        Ok(Self::new(
            Arc::new(calculator),
            Arc::new(altitude),
            Arc::new(azimuth),
            sink,
        ))
    }

    pub fn axis(&self, kind: AxisKind) -> &Arc<AxisController> {
        match kind {
            AxisKind::Altitude => &self.altitude,
            AxisKind::Azimuth => &self.azimuth,
        }
    }

    pub fn calculator(&self) -> &Arc<CelestialCalculator> {
        &self.calculator
    }

    pub fn mode(&self) -> TrackingMode {
        self.shared.lock().session.mode
    }

    pub fn session(&self) -> TrackingSession {
        self.shared.lock().session.clone()
    }

    pub fn subscribe_mode(&self) -> watch::Receiver<TrackingMode> {
        self.mode_tx.subscribe()
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> PointingContext {
        PointingContext::capture(
            now,
            &self.session(),
            self.altitude.state(),
            self.azimuth.state(),
            self.calculator.observer(),
        )
    }

    fn set_mode(&self, shared: &mut Shared, mode: TrackingMode) {
        if shared.session.mode != mode {
            debug!(from = %shared.session.mode, to = %mode, "Tracking mode change");
        }
        shared.session.mode = mode;
        self.mode_tx.send_if_modified(|current| {
            let changed = *current != mode;
            *current = mode;
            changed
        });
    }

    fn log(&self, kind: EventKind, target: TargetKind, notes: impl Into<String>) {
        self.sink.record(LogEvent {
            timestamp: Utc::now(),
            altitude: self.altitude.state().current,
            azimuth: self.azimuth.state().current,
            target,
            kind,
            notes: notes.into(),
        });
    }

    fn reject(&self, target: TargetKind, error: &MountError) {
        warn!(%target, %error, "Command rejected");
        self.log(EventKind::CommandRejected, target, error.to_string());
    }

    fn resolve(&self, target: &Target, at: DateTime<Utc>) -> Result<Aim> {
        match *target {
            Target::Manual { altitude, azimuth } => {
                if altitude.is_finite() && azimuth.is_finite() {
                    Ok(Aim {
                        altitude,
                        azimuth,
                        visible: altitude > 0.0,
                    })
                } else {
                    Err(MountError::InvalidAngle(format!(
                        "manual target must be finite (alt {altitude}, az {azimuth})"
                    )))
                }
            }
            Target::Sun | Target::Moon => {
                let body = target.body().unwrap_or(Body::Sun);
                let position = self.calculator.position(body, at)?;
                Ok(Aim {
                    altitude: position.altitude,
                    azimuth: position.azimuth,
                    visible: position.visible,
                })
            }
        }
    }

    /// Admission checks for a new slew/track; runs under the session lock
    fn admit(session: &TrackingSession, target: &Target) -> Result<()> {
        if session.mode == TrackingMode::Fault {
            return Err(MountError::Faulted);
        }
        if *target == Target::Sun && !session.safety_confirmed {
            return Err(MountError::SafetyInterlock);
        }
        Ok(())
    }

    fn begin(&self, target: Target, mode: TrackingMode, aim: &Aim, at: DateTime<Utc>) -> Result<u64> {
        let mut shared = self.shared.lock();
        Self::admit(&shared.session, &target)?;

        shared.epoch += 1;
        shared.session.id = Some(Uuid::new_v4());
        shared.session.target = Some(target);
        shared.session.started_at = Some(at);
        shared.session.target_visible = Some(aim.visible);
        shared.session.fault_reason = None;
        shared.aim = Some(*aim);
        shared.aimed = false;
        shared.tracking_failed = false;
        self.set_mode(&mut shared, mode);
        Ok(shared.epoch)
    }

    /// Issue targets to both axes. If another command won the session
    /// while the lock was released, re-issue its aim (or hold the axes
    /// when it is no longer moving) until the axes match the newest epoch.
    fn aim_axes(&self, epoch: u64, aim: &Aim) {
        let mut epoch = epoch;
        let mut issued = Some(*aim);
        loop {
            match issued {
                Some(aim) => {
                    self.altitude.set_target(aim.altitude);
                    self.azimuth.set_target(aim.azimuth);
                }
                None => {
                    self.altitude.stop();
                    self.azimuth.stop();
                }
            }

            let mut shared = self.shared.lock();
            if shared.epoch == epoch {
                if issued.is_some() {
                    shared.aimed = true;
                }
                return;
            }
            debug!(stale = epoch, current = shared.epoch, "Command superseded, re-aiming axes");
            epoch = shared.epoch;
            issued = if shared.session.mode.is_active() {
                shared.aim
            } else {
                None
            };
        }
    }

    /// Slew once to `target`; returns to Idle when both axes arrive
    pub fn slew_to(&self, target: Target, at: DateTime<Utc>) -> Result<TrackingMode> {
        let kind = target.kind();
        let started = self
            .resolve(&target, at)
            .and_then(|aim| self.begin(target, TrackingMode::Slewing, &aim, at).map(|e| (e, aim)));
        let (epoch, aim) = match started {
            Ok(started) => started,
            Err(e) => {
                self.reject(kind, &e);
                return Err(e);
            }
        };

        self.aim_axes(epoch, &aim);
        info!(%target, altitude = aim.altitude, azimuth = aim.azimuth, "Slew started");

        let mut notes = format!(
            "slewing to {target} (alt {:.2}°, az {:.2}°)",
            aim.altitude, aim.azimuth
        );
        if !aim.visible && target.body().is_some() {
            notes.push_str("; target below horizon");
        }
        self.log(EventKind::SlewStart, kind, notes);

        self.check_progress();
        Ok(self.mode())
    }

    /// Follow a celestial target, re-aiming on every tracking tick
    pub fn start_tracking(&self, target: Target, at: DateTime<Utc>) -> Result<TrackingMode> {
        let kind = target.kind();
        if target.body().is_none() {
            let e = MountError::InvalidCommand("tracking requires a celestial target".into());
            self.reject(kind, &e);
            return Err(e);
        }

        let started = self
            .resolve(&target, at)
            .and_then(|aim| self.begin(target, TrackingMode::Tracking, &aim, at).map(|e| (e, aim)));
        let (epoch, aim) = match started {
            Ok(started) => started,
            Err(e) => {
                self.reject(kind, &e);
                return Err(e);
            }
        };

        self.aim_axes(epoch, &aim);
        info!(%target, "Tracking started");
        self.log(
            EventKind::TrackStart,
            kind,
            format!("tracking {target} (alt {:.2}°, az {:.2}°)", aim.altitude, aim.azimuth),
        );
        if !aim.visible {
            self.log(EventKind::BelowHorizon, kind, "target below horizon");
        }
        Ok(self.mode())
    }

    /// Periodic re-aim while tracking. A no-op in every other mode.
    pub fn tracking_tick(&self, at: DateTime<Utc>) -> Result<TrackingMode> {
        self.check_axes();

        let (epoch, target) = {
            let shared = self.shared.lock();
            match (shared.session.mode, shared.session.target) {
                (TrackingMode::Tracking, Some(target)) => (shared.epoch, target),
                (mode, _) => return Ok(mode),
            }
        };

        let aim = match self.resolve(&target, at) {
            Ok(aim) => aim,
            Err(e) => {
                self.report_tracking_failure(epoch, target, &e);
                return Err(e);
            }
        };

        let (visibility_changed, recovered) = {
            let mut shared = self.shared.lock();
            if shared.epoch != epoch || shared.session.mode != TrackingMode::Tracking {
                return Ok(shared.session.mode);
            }
            let changed = shared.session.target_visible != Some(aim.visible);
            shared.session.target_visible = Some(aim.visible);
            shared.aim = Some(aim);
            let recovered = std::mem::replace(&mut shared.tracking_failed, false);
            (changed, recovered)
        };
        if recovered {
            info!(%target, "Tracking updates recovered");
        }

        self.aim_axes(epoch, &aim);
        debug!(%target, altitude = aim.altitude, azimuth = aim.azimuth, "Tracking update");

        if visibility_changed {
            let (kind, notes) = if aim.visible {
                (EventKind::AboveHorizon, "target above horizon")
            } else {
                (EventKind::BelowHorizon, "target below horizon")
            };
            self.log(kind, target.kind(), notes);
        }
        Ok(self.mode())
    }

    /// Log a failed tracking update once per failure streak; the axes
    /// keep the last issued target until an update succeeds.
    fn report_tracking_failure(&self, epoch: u64, target: Target, error: &MountError) {
        let first = {
            let mut shared = self.shared.lock();
            if shared.epoch != epoch || shared.session.mode != TrackingMode::Tracking {
                return;
            }
            !std::mem::replace(&mut shared.tracking_failed, true)
        };
        if first {
            warn!(%target, %error, "Tracking update failed, holding last target");
            self.log(
                EventKind::CommandRejected,
                target.kind(),
                format!("tracking update failed: {error}"),
            );
        } else {
            debug!(%target, %error, "Tracking update still failing");
        }
    }

    /// Feed axis feedback into the state machine
    pub fn handle_axis_event(&self, event: &AxisEvent) {
        match event {
            AxisEvent::Arrived { .. } => self.check_progress(),
            AxisEvent::Faulted { axis, reason } => self.enter_fault(*axis, reason),
            AxisEvent::PositionUpdated { .. }
            | AxisEvent::Error { .. }
            | AxisEvent::FaultCleared { .. } => {}
        }
    }

    /// Pick up axis faults and slew completion from axis state directly
    pub fn check_progress(&self) {
        self.check_axes();

        let epoch = {
            let shared = self.shared.lock();
            // Settled axes still hold the previous targets until aimed
            if shared.session.mode != TrackingMode::Slewing || !shared.aimed {
                return;
            }
            shared.epoch
        };

        if !(self.altitude.is_settled() && self.azimuth.is_settled()) {
            return;
        }

        let completed = {
            let mut shared = self.shared.lock();
            if shared.epoch != epoch || shared.session.mode != TrackingMode::Slewing {
                None
            } else {
                let kind = shared.session.target_kind();
                shared.session.target = None;
                shared.session.target_visible = None;
                shared.aim = None;
                self.set_mode(&mut shared, TrackingMode::Idle);
                Some(kind)
            }
        };

        if let Some(kind) = completed {
            info!(target = %kind, "Slew complete");
            self.log(EventKind::SlewComplete, kind, "slew complete");
        }
    }

    fn check_axes(&self) {
        for axis in [&self.altitude, &self.azimuth] {
            let state = axis.state();
            if state.mode == AxisMode::Fault {
                self.enter_fault(axis.kind(), "axis reported fault");
                return;
            }
        }
    }

    fn enter_fault(&self, axis: AxisKind, reason: &str) {
        let target = {
            let mut shared = self.shared.lock();
            if shared.session.mode == TrackingMode::Fault {
                return;
            }
            shared.epoch += 1;
            let target = shared.session.target_kind();
            shared.session.target = None;
            shared.session.target_visible = None;
            shared.aim = None;
            shared.session.fault_reason = Some(format!("{axis} axis: {reason}"));
            self.set_mode(&mut shared, TrackingMode::Fault);
            target
        };

        self.altitude.stop();
        self.azimuth.stop();
        let error = MountError::ActuatorFault {
            axis,
            reason: reason.to_string(),
        };
        warn!(%error, "Mount faulted");
        self.log(EventKind::Fault, target, error.to_string());
    }

    /// Transition to Stopped (Fault stays Fault) under the session lock.
    /// Returns the target kind that was active.
    fn halt_locked(&self, shared: &mut Shared) -> TargetKind {
        shared.epoch += 1;
        let target = shared.session.target_kind();
        shared.session.target = None;
        shared.session.target_visible = None;
        shared.aim = None;
        if shared.session.mode != TrackingMode::Fault {
            self.set_mode(shared, TrackingMode::Stopped);
        }
        target
    }

    fn finish_halt(&self, kind: EventKind, target: TargetKind, reason: &str) -> TrackingMode {
        self.altitude.stop();
        self.azimuth.stop();
        info!(%target, reason, "Mount stopped");
        self.log(kind, target, reason);
        self.mode()
    }

    pub fn stop_tracking(&self) -> TrackingMode {
        let target = self.halt_locked(&mut self.shared.lock());
        self.finish_halt(EventKind::TrackStop, target, "tracking stopped")
    }

    pub fn emergency_stop(&self) -> TrackingMode {
        let target = self.halt_locked(&mut self.shared.lock());
        self.finish_halt(EventKind::EmergencyStop, target, "emergency stop")
    }

    /// Confirm or revoke solar safety. Revoking during Sun motion stops
    /// the mount immediately.
    pub fn confirm_safety(&self, confirmed: bool) -> TrackingMode {
        let (current, halted) = {
            let mut shared = self.shared.lock();
            shared.session.safety_confirmed = confirmed;
            let current = shared.session.target_kind();
            let sun_active =
                shared.session.target == Some(Target::Sun) && shared.session.mode.is_active();
            let halted = (!confirmed && sun_active).then(|| self.halt_locked(&mut shared));
            (current, halted)
        };

        let (kind, notes) = if confirmed {
            (EventKind::SafetyConfirmed, "solar safety confirmed")
        } else {
            (EventKind::SafetyRevoked, "solar safety revoked")
        };
        self.log(kind, current, notes);

        match halted {
            Some(target) => self.finish_halt(EventKind::TrackStop, target, "safety revoked"),
            None => self.mode(),
        }
    }

    /// Clear axis and coordinator faults
    pub fn reset(&self) -> TrackingMode {
        self.altitude.reset();
        self.azimuth.reset();

        let cleared = {
            let mut shared = self.shared.lock();
            if shared.session.mode == TrackingMode::Fault {
                shared.epoch += 1;
                shared.session.fault_reason = None;
                self.set_mode(&mut shared, TrackingMode::Idle);
                true
            } else {
                false
            }
        };

        if cleared {
            info!("Mount fault cleared");
            self.log(EventKind::FaultCleared, TargetKind::None, "fault reset");
        }
        self.mode()
    }

    /// Update the observer; used from the next tracking tick on
    pub fn set_observer(&self, latitude: f64, longitude: f64) -> Result<Observer> {
        match self.calculator.set_observer(latitude, longitude) {
            Ok(observer) => {
                let target = self.shared.lock().session.target_kind();
                self.log(
                    EventKind::ObserverChanged,
                    target,
                    format!("observer set to {}", observer.label()),
                );
                Ok(observer)
            }
            Err(e) => {
                let e = MountError::from(e);
                self.reject(TargetKind::None, &e);
                Err(e)
            }
        }
    }

    pub fn execute(&self, command: Command, at: DateTime<Utc>) -> Result<CommandOutcome> {
        let mode = |mode| Ok(CommandOutcome::Mode { mode });
        match command {
            Command::SetTarget { axis, angle } => Ok(CommandOutcome::Angle {
                axis,
                value: self.axis(axis).set_target(angle),
            }),
            Command::SetSpeed { axis, speed } => Ok(CommandOutcome::Angle {
                axis,
                value: self.axis(axis).set_speed(speed),
            }),
            Command::SlewTo { target } => mode(self.slew_to(target, at)?),
            Command::StartTracking { target } => mode(self.start_tracking(target, at)?),
            Command::StopTracking => mode(self.stop_tracking()),
            Command::ConfirmSafety { confirmed } => mode(self.confirm_safety(confirmed)),
            Command::EmergencyStop => mode(self.emergency_stop()),
            Command::Reset => mode(self.reset()),
            Command::SetObserver { latitude, longitude } => Ok(CommandOutcome::Observer {
                observer: self.set_observer(latitude, longitude)?,
            }),
        }
    }
}
