//! Celestial Mechanics Library
//!
//! Angle math, low-precision Sun/Moon ephemeris and topocentric
//! altitude/azimuth for pointing an alt/az mount. Positions are derived
//! from mean orbital elements and are accurate to a few tenths of a degree.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod angles;
pub mod calculator;
pub mod horizon;
pub mod moon;
pub mod observer;
pub mod phase;
pub mod riseset;
pub mod sun;
pub mod time;

pub use angles::AngleError;
pub use calculator::CelestialCalculator;
pub use observer::Observer;
pub use phase::{MoonPhase, PhaseName};
pub use riseset::{rise_and_set, RiseSet};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CelestialError {
    #[error("Invalid location: latitude {latitude}, longitude {longitude} (expected [-90, 90], [-180, 180])")]
    InvalidLocation { latitude: f64, longitude: f64 },
    #[error("Calculation domain error: {0}")]
    CalculationDomain(String),
    #[error("Unknown body: {0}")]
    UnknownBody(String),
    #[error(transparent)]
    Angle(#[from] AngleError),
}

pub type Result<T> = std::result::Result<T, CelestialError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Body {
    Sun,
    Moon,
}

impl Body {
    pub fn as_str(&self) -> &'static str {
        match self {
            Body::Sun => "sun",
            Body::Moon => "moon",
        }
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Body {
    type Err = CelestialError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sun" => Ok(Body::Sun),
            "moon" => Ok(Body::Moon),
            other => Err(CelestialError::UnknownBody(other.to_string())),
        }
    }
}

/// Topocentric position of a body; a fresh value on every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CelestialPosition {
    pub body: Body,
    pub altitude: f64,
    pub azimuth: f64,
    pub visible: bool,
    pub right_ascension: f64,
    pub declination: f64,
    pub distance_km: f64,
    /// Present for the Moon only
    pub moon: Option<MoonPhase>,
    pub computed_at: DateTime<Utc>,
}

impl CelestialPosition {
    pub fn illumination_pct(&self) -> Option<f64> {
        self.moon.map(|m| m.illumination_pct)
    }

    pub fn phase_name(&self) -> Option<PhaseName> {
        self.moon.map(|m| m.phase)
    }
}

/// Topocentric position of `body` for `observer` at `at`.
///
/// A pure function of its inputs. Fails with `InvalidLocation` for an
/// out-of-range observer and `CalculationDomain` if the pipeline produces
/// a non-finite value.
pub fn position(body: Body, observer: &Observer, at: DateTime<Utc>) -> Result<CelestialPosition> {
    observer.validate()?;

    let d = time::days_since_j2000_tt(at);
    let lst = time::local_sidereal_deg(at, observer.longitude);

    let geocentric = match body {
        Body::Sun => sun::geocentric_equatorial(d),
        Body::Moon => moon::geocentric_equatorial(d),
    };
    let topocentric = geocentric - horizon::observer_vector(observer, lst);
    let coords = horizon::to_horizon(&topocentric, observer, lst);

    let moon = match body {
        Body::Moon => Some(phase::moon_phase(d)),
        Body::Sun => None,
    };

    let finite = [
        coords.altitude_deg,
        coords.azimuth_deg,
        coords.right_ascension_deg,
        coords.declination_deg,
        coords.distance_km,
    ]
    .iter()
    .chain(moon.as_ref().map(|m| &m.illumination_pct))
    .all(|v| v.is_finite());

    if !finite {
        return Err(CelestialError::CalculationDomain(format!(
            "non-finite {} position at {}",
            body,
            at.to_rfc3339()
        )));
    }

    Ok(CelestialPosition {
        body,
        altitude: coords.altitude_deg,
        azimuth: coords.azimuth_deg,
        visible: coords.altitude_deg > 0.0,
        right_ascension: coords.right_ascension_deg,
        declination: coords.declination_deg,
        distance_km: coords.distance_km,
        moon,
        computed_at: at,
    })
}
