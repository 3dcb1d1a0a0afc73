//! Read-only pointing context for external consumers

use std::fmt;

use celestial_mechanics::Observer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::axis::{AxisMode, AxisState};
use crate::coordinator::{Target, TrackingMode, TrackingSession};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisSnapshot {
    pub current: f64,
    pub target: f64,
    pub speed: f64,
    pub mode: AxisMode,
}

impl From<AxisState> for AxisSnapshot {
    fn from(state: AxisState) -> Self {
        Self {
            current: state.current,
            target: state.target,
            speed: state.speed,
            mode: state.mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointingContext {
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<Uuid>,
    pub mode: TrackingMode,
    pub target: Option<Target>,
    pub safety_confirmed: bool,
    pub altitude: AxisSnapshot,
    pub azimuth: AxisSnapshot,
    pub observer: Observer,
    pub fault_reason: Option<String>,
}

impl PointingContext {
    pub fn capture(
        timestamp: DateTime<Utc>,
        session: &TrackingSession,
        altitude: AxisState,
        azimuth: AxisState,
        observer: Observer,
    ) -> Self {
        Self {
            timestamp,
            session_id: session.id,
            mode: session.mode,
            target: session.target,
            safety_confirmed: session.safety_confirmed,
            altitude: altitude.into(),
            azimuth: azimuth.into(),
            observer,
            fault_reason: session.fault_reason.clone(),
        }
    }
}

impl fmt::Display for PointingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mount {}", self.mode)?;
        if let Some(target) = &self.target {
            write!(f, " ({target})")?;
        }
        write!(
            f,
            "; altitude {:.2}° (target {:.2}°), azimuth {:.2}° (target {:.2}°)",
            self.altitude.current, self.altitude.target, self.azimuth.current, self.azimuth.target
        )?;
        write!(f, "; observer {}", self.observer.label())?;
        let safety = if self.safety_confirmed { "confirmed" } else { "not confirmed" };
        write!(f, "; solar safety {safety}")?;
        if let Some(reason) = &self.fault_reason {
            write!(f, "; fault: {reason}")?;
        }
        Ok(())
    }
}
