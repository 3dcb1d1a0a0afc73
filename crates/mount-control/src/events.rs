//! Event sinks
//!
//! Append-only stream of [`LogEvent`]s. Recording never blocks and never
//! reports failure back to the control loops: a full or closed sink just
//! drops the event.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::coordinator::TargetKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SlewStart,
    SlewComplete,
    TrackStart,
    TrackStop,
    EmergencyStop,
    BelowHorizon,
    AboveHorizon,
    SafetyConfirmed,
    SafetyRevoked,
    CommandRejected,
    ObserverChanged,
    Fault,
    FaultCleared,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::SlewStart => "slew_start",
            EventKind::SlewComplete => "slew_complete",
            EventKind::TrackStart => "track_start",
            EventKind::TrackStop => "track_stop",
            EventKind::EmergencyStop => "emergency_stop",
            EventKind::BelowHorizon => "below_horizon",
            EventKind::AboveHorizon => "above_horizon",
            EventKind::SafetyConfirmed => "safety_confirmed",
            EventKind::SafetyRevoked => "safety_revoked",
            EventKind::CommandRejected => "command_rejected",
            EventKind::ObserverChanged => "observer_changed",
            EventKind::Fault => "fault",
            EventKind::FaultCleared => "fault_cleared",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub altitude: f64,
    pub azimuth: f64,
    pub target: TargetKind,
    pub kind: EventKind,
    pub notes: String,
}

pub trait EventSink: Send + Sync {
    fn record(&self, event: LogEvent);
}

/// Writes each event as a structured tracing record
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: LogEvent) {
        match event.kind {
            EventKind::CommandRejected | EventKind::Fault | EventKind::SafetyRevoked | EventKind::EmergencyStop => {
                warn!(
                    kind = %event.kind,
                    target = %event.target,
                    altitude = event.altitude,
                    azimuth = event.azimuth,
                    "{}",
                    event.notes
                );
            }
            _ => {
                info!(
                    kind = %event.kind,
                    target = %event.target,
                    altitude = event.altitude,
                    azimuth = event.azimuth,
                    "{}",
                    event.notes
                );
            }
        }
    }
}

/// Keeps the newest `capacity` events in memory
pub struct MemorySink {
    capacity: usize,
    buffer: Mutex<VecDeque<LogEvent>>,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Up to `limit` most recent events, oldest first
    pub fn recent(&self, limit: usize) -> Vec<LogEvent> {
        let buffer = self.buffer.lock();
        let skip = buffer.len().saturating_sub(limit);
        buffer.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: LogEvent) {
        let mut buffer = self.buffer.lock();
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(event);
    }
}

/// Fan-out to live subscribers (e.g. WebSocket clients)
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<LogEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn record(&self, event: LogEvent) {
        let _ = self.tx.send(event);
    }
}

/// Records into every inner sink in order
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn record(&self, event: LogEvent) {
        for sink in &self.sinks {
            sink.record(event.clone());
        }
    }
}
