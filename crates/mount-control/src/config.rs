//! Mount configuration
//!
//! Read once at startup from an optional JSON file plus `MOUNT_*`
//! environment overrides. Any key missing from the file falls back to its
//! default, so a file containing only `{"observer": {...}}` is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use celestial_mechanics::Observer;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::axis::{AxisConfig, AxisDomain};
use crate::AxisKind;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: String, value: String },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AltitudeLimits {
    pub min_deg: f64,
    pub max_deg: f64,
}

impl Default for AltitudeLimits {
    fn default() -> Self {
        Self {
            min_deg: 0.0,
            max_deg: 90.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzimuthLimits {
    pub period_deg: f64,
}

impl Default for AzimuthLimits {
    fn default() -> Self {
        Self { period_deg: 360.0 }
    }
}

/// Slew speed in degrees per axis tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            min: 0.1,
            max: 5.0,
            default: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub axis_tick_ms: u64,
    pub tracking_tick_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            axis_tick_ms: 50,
            tracking_tick_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub arrival_tolerance_deg: f64,
    /// Consecutive actuator errors before the axis faults
    pub fault_threshold: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            arrival_tolerance_deg: 0.1,
            fault_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub recent_capacity: usize,
    pub channel_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 1_000,
            channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    pub observer: Observer,
    pub altitude: AltitudeLimits,
    pub azimuth: AzimuthLimits,
    pub speed: SpeedConfig,
    pub timing: TimingConfig,
    pub control: ControlConfig,
    pub events: EventConfig,
}

impl MountConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: MountConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&json)?;
        info!(path = %path.display(), "Loaded mount config");
        Ok(config)
    }

    /// File named by `MOUNT_CONFIG` (or defaults), then `MOUNT_LAT` /
    /// `MOUNT_LON` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("MOUNT_CONFIG") {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `MOUNT_LAT` / `MOUNT_LON` from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |key: &str| -> Result<Option<f64>, ConfigError> {
            match lookup(key) {
                Some(value) => value
                    .trim()
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| ConfigError::InvalidOverride {
                        key: key.to_string(),
                        value,
                    }),
                None => Ok(None),
            }
        };

        if let Some(latitude) = parse("MOUNT_LAT")? {
            self.observer.latitude = latitude;
        }
        if let Some(longitude) = parse("MOUNT_LON")? {
            self.observer.longitude = longitude;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.observer
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let alt = &self.altitude;
        if !(alt.min_deg.is_finite() && alt.max_deg.is_finite()) || alt.min_deg > alt.max_deg {
            return Err(ConfigError::Invalid(format!(
                "altitude limits [{}, {}]",
                alt.min_deg, alt.max_deg
            )));
        }
        if !(self.azimuth.period_deg.is_finite() && self.azimuth.period_deg > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "azimuth period {}",
                self.azimuth.period_deg
            )));
        }

        let speed = &self.speed;
        let speeds_finite = [speed.min, speed.max, speed.default]
            .iter()
            .all(|v| v.is_finite());
        if !speeds_finite
            || speed.min <= 0.0
            || speed.min > speed.max
            || !(speed.min..=speed.max).contains(&speed.default)
        {
            return Err(ConfigError::Invalid(format!(
                "speed min {} / max {} / default {}",
                speed.min, speed.max, speed.default
            )));
        }

        let timing = &self.timing;
        if timing.axis_tick_ms == 0 || timing.tracking_tick_ms <= timing.axis_tick_ms {
            return Err(ConfigError::Invalid(format!(
                "timing: axis tick {} ms must be non-zero and shorter than tracking tick {} ms",
                timing.axis_tick_ms, timing.tracking_tick_ms
            )));
        }

        let tolerance = self.control.arrival_tolerance_deg;
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(ConfigError::Invalid(format!("arrival tolerance {tolerance}")));
        }
        if self.control.fault_threshold == 0 {
            return Err(ConfigError::Invalid("fault threshold must be at least 1".into()));
        }
        if self.events.recent_capacity == 0 || self.events.channel_capacity == 0 {
            return Err(ConfigError::Invalid("event capacities must be non-zero".into()));
        }
        Ok(())
    }

    pub fn axis_config(&self, kind: AxisKind) -> AxisConfig {
        let domain = match kind {
            AxisKind::Altitude => AxisDomain::Bounded {
                min: self.altitude.min_deg,
                max: self.altitude.max_deg,
            },
            AxisKind::Azimuth => AxisDomain::Wrapping {
                period: self.azimuth.period_deg,
            },
        };
        AxisConfig {
            kind,
            domain,
            min_speed: self.speed.min,
            max_speed: self.speed.max,
            default_speed: self.speed.default,
            tolerance: self.control.arrival_tolerance_deg,
            fault_threshold: self.control.fault_threshold,
        }
    }

    pub fn axis_period(&self) -> Duration {
        Duration::from_millis(self.timing.axis_tick_ms)
    }

    pub fn tracking_period(&self) -> Duration {
        Duration::from_millis(self.timing.tracking_tick_ms)
    }
}
