//! Async runtime
//!
//! Spawns the periodic workers onto the current tokio runtime:
//! - one tick loop per axis (fast, 20-50 ms)
//! - the tracking loop (slow, 1-5 s)
//! - an axis-feedback forwarder into the coordinator
//! - a command loop fed by a bounded queue
//!
//! Emergency stop bypasses the queue and hits the coordinator directly.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::actuator::{Actuator, SimulatedActuator};
use crate::axis::{AxisController, AxisEvent};
use crate::config::MountConfig;
use crate::coordinator::{Command, CommandOutcome, TrackingCoordinator, TrackingMode};
use crate::events::EventSink;
use crate::snapshot::PointingContext;
use crate::{AxisKind, MountError, Result};

const COMMAND_QUEUE: usize = 64;

struct Envelope {
    command: Command,
    reply: Option<oneshot::Sender<Result<CommandOutcome>>>,
}

/// Configured mount, not yet running
pub struct Mount {
    config: MountConfig,
    coordinator: Arc<TrackingCoordinator>,
}

impl Mount {
    pub fn new(
        config: MountConfig,
        altitude_actuator: Box<dyn Actuator>,
        azimuth_actuator: Box<dyn Actuator>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        let coordinator =
            TrackingCoordinator::from_config(&config, altitude_actuator, azimuth_actuator, sink)?;
        Ok(Self {
            config,
            coordinator: Arc::new(coordinator),
        })
    }

    /// Mount driven by simulated actuators
    pub fn simulated(config: MountConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        Self::new(
            config,
            Box::new(SimulatedActuator::new()),
            Box::new(SimulatedActuator::new()),
            sink,
        )
    }

    pub fn coordinator(&self) -> &Arc<TrackingCoordinator> {
        &self.coordinator
    }

    /// Start all workers. Must be called from within a tokio runtime.
    pub fn spawn(self) -> MountHandle {
        let coordinator = self.coordinator;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);

        // Subscribe before the axis loops start so no feedback is missed
        let alt_rx = coordinator.axis(AxisKind::Altitude).subscribe();
        let az_rx = coordinator.axis(AxisKind::Azimuth).subscribe();

        let axis_period = self.config.axis_period();
        let tasks = vec![
            tokio::spawn(axis_loop(
                coordinator.axis(AxisKind::Altitude).clone(),
                axis_period,
                shutdown_rx.clone(),
            )),
            tokio::spawn(axis_loop(
                coordinator.axis(AxisKind::Azimuth).clone(),
                axis_period,
                shutdown_rx.clone(),
            )),
            tokio::spawn(tracking_loop(
                coordinator.clone(),
                self.config.tracking_period(),
                shutdown_rx.clone(),
            )),
            tokio::spawn(feedback_loop(
                coordinator.clone(),
                alt_rx,
                az_rx,
                shutdown_rx.clone(),
            )),
            tokio::spawn(command_loop(coordinator.clone(), command_rx, shutdown_rx)),
        ];

        info!(
            axis_tick_ms = self.config.timing.axis_tick_ms,
            tracking_tick_ms = self.config.timing.tracking_tick_ms,
            observer = %coordinator.calculator().observer().label(),
            "Mount runtime started"
        );

        MountHandle {
            coordinator,
            commands: command_tx,
            shutdown: Arc::new(shutdown_tx),
            tasks: Arc::new(Mutex::new(tasks)),
        }
    }
}

/// Cloneable handle to a running mount. Dropping the last handle stops
/// the workers.
#[derive(Clone)]
pub struct MountHandle {
    coordinator: Arc<TrackingCoordinator>,
    commands: mpsc::Sender<Envelope>,
    shutdown: Arc<watch::Sender<bool>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl MountHandle {
    pub fn coordinator(&self) -> &Arc<TrackingCoordinator> {
        &self.coordinator
    }

    /// Enqueue without waiting for the result
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .try_send(Envelope {
                command,
                reply: None,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => MountError::Busy,
                mpsc::error::TrySendError::Closed(_) => MountError::RuntimeClosed,
            })
    }

    /// Enqueue and wait for the coordinator's answer
    pub async fn execute(&self, command: Command) -> Result<CommandOutcome> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Envelope {
                command,
                reply: Some(reply),
            })
            .await
            .map_err(|_| MountError::RuntimeClosed)?;
        rx.await.map_err(|_| MountError::RuntimeClosed)?
    }

    pub fn emergency_stop(&self) -> TrackingMode {
        self.coordinator.emergency_stop()
    }

    pub fn snapshot(&self) -> PointingContext {
        self.coordinator.snapshot(Utc::now())
    }

    pub fn subscribe_axis(&self, axis: AxisKind) -> broadcast::Receiver<AxisEvent> {
        self.coordinator.axis(axis).subscribe()
    }

    pub fn subscribe_mode(&self) -> watch::Receiver<TrackingMode> {
        self.coordinator.subscribe_mode()
    }

    /// Stop every worker and wait for them to exit. Axes are left neutral.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Mount worker ended abnormally: {}", e);
            }
        }
        info!("Mount runtime stopped");
    }
}

fn ticker(period: Duration) -> time::Interval {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn axis_loop(axis: Arc<AxisController>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = ticker(period);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                axis.tick();
            }
            _ = shutdown.changed() => break,
        }
    }
    axis.stop();
    debug!(axis = %axis.kind(), "Axis loop exited");
}

async fn tracking_loop(
    coordinator: Arc<TrackingCoordinator>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = ticker(period);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Failures are logged inside; the next tick retries
                let _ = coordinator.tracking_tick(Utc::now());
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("Tracking loop exited");
}

/// Returns false once the axis channel has closed
fn forward(coordinator: &TrackingCoordinator, received: std::result::Result<AxisEvent, RecvError>) -> bool {
    match received {
        Ok(event) => {
            coordinator.handle_axis_event(&event);
            true
        }
        Err(RecvError::Lagged(skipped)) => {
            debug!(skipped, "Axis feedback lagged, resyncing from state");
            coordinator.check_progress();
            true
        }
        Err(RecvError::Closed) => false,
    }
}

async fn feedback_loop(
    coordinator: Arc<TrackingCoordinator>,
    mut alt_rx: broadcast::Receiver<AxisEvent>,
    mut az_rx: broadcast::Receiver<AxisEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let open = tokio::select! {
            received = alt_rx.recv() => forward(&coordinator, received),
            received = az_rx.recv() => forward(&coordinator, received),
            _ = shutdown.changed() => false,
        };
        if !open {
            break;
        }
    }
    debug!("Feedback loop exited");
}

async fn command_loop(
    coordinator: Arc<TrackingCoordinator>,
    mut commands: mpsc::Receiver<Envelope>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            envelope = commands.recv() => {
                let Some(Envelope { command, reply }) = envelope else { break };
                debug!(?command, "Command received");
                let result = coordinator.execute(command, Utc::now());
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("Command loop exited");
}
