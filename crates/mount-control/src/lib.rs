//! Mount Control
//!
//! Two axis controllers (altitude, azimuth) driven by a tracking
//! coordinator that slews to or follows a manual angle, the Sun or the
//! Moon. Solar motion is gated behind an explicit safety confirmation.

use std::fmt;
use std::str::FromStr;

use celestial_mechanics::{AngleError, CelestialError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod actuator;
pub mod axis;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod runtime;
pub mod snapshot;

pub use actuator::{Actuator, ActuatorError, Direction, SimulatedActuator};
pub use axis::{AxisConfig, AxisController, AxisDomain, AxisEvent, AxisMode, AxisState};
pub use config::{ConfigError, MountConfig};
pub use coordinator::{Command, CommandOutcome, Target, TargetKind, TrackingCoordinator, TrackingMode, TrackingSession};
pub use events::{EventKind, EventSink, LogEvent};
pub use runtime::{Mount, MountHandle};
pub use snapshot::PointingContext;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MountError {
    #[error("Invalid angle: {0}")]
    InvalidAngle(String),
    #[error("Invalid location: latitude {latitude}, longitude {longitude} (expected [-90, 90], [-180, 180])")]
    InvalidLocation { latitude: f64, longitude: f64 },
    #[error("Safety interlock: confirm the solar filter is fitted before pointing at the Sun")]
    SafetyInterlock,
    #[error("Actuator fault on {axis} axis: {reason}")]
    ActuatorFault { axis: AxisKind, reason: String },
    #[error("Calculation error: {0}")]
    CalculationDomain(String),
    #[error("Mount is in fault state; reset required")]
    Faulted,
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    #[error("Mount runtime is not running")]
    RuntimeClosed,
    #[error("Command queue full")]
    Busy,
    #[error("{0}")]
    Config(String),
}

impl From<ConfigError> for MountError {
    fn from(e: ConfigError) -> Self {
        MountError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MountError>;

impl From<CelestialError> for MountError {
    fn from(e: CelestialError) -> Self {
        match e {
            CelestialError::InvalidLocation { latitude, longitude } => {
                MountError::InvalidLocation { latitude, longitude }
            }
            CelestialError::CalculationDomain(reason) => MountError::CalculationDomain(reason),
            CelestialError::Angle(e) => MountError::InvalidAngle(e.to_string()),
            CelestialError::UnknownBody(body) => {
                MountError::InvalidCommand(format!("unknown body '{body}'"))
            }
        }
    }
}

impl From<AngleError> for MountError {
    fn from(e: AngleError) -> Self {
        MountError::InvalidAngle(e.to_string())
    }
}

/// Mechanical axis of the mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    Altitude,
    Azimuth,
}

impl AxisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AxisKind::Altitude => "altitude",
            AxisKind::Azimuth => "azimuth",
        }
    }
}

impl fmt::Display for AxisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AxisKind {
    type Err = MountError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alt" | "altitude" => Ok(AxisKind::Altitude),
            "az" | "azimuth" => Ok(AxisKind::Azimuth),
            other => Err(MountError::InvalidCommand(format!("unknown axis '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_kind_parse() {
        assert_eq!("alt".parse::<AxisKind>().unwrap(), AxisKind::Altitude);
        assert_eq!("Azimuth".parse::<AxisKind>().unwrap(), AxisKind::Azimuth);
        assert!("roll".parse::<AxisKind>().is_err());
    }

    #[test]
    fn test_location_error_carries_reason() {
        let err: MountError = CelestialError::InvalidLocation {
            latitude: 95.0,
            longitude: 0.0,
        }
        .into();
        assert!(err.to_string().contains("latitude 95"));
    }
}
