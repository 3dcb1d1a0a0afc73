//! Moon illumination and phase naming
//!
//! The illuminated fraction follows from the phase angle, which in turn
//! comes from the Sun–Moon elongation seen from the Earth's centre. The
//! waxing/waning sense is the sign of the elongation's rate of change,
//! since illumination alone is symmetric about full moon.

use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::angles::unit;
use crate::{moon, sun};

/// Half-width of the central difference used for d(elongation)/dt
const RATE_STEP_DAYS: f64 = 1.0 / 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    NewMoon,
    WaxingCrescent,
    FirstQuarter,
    WaxingGibbous,
    FullMoon,
    WaningGibbous,
    LastQuarter,
    WaningCrescent,
}

impl PhaseName {
    /// Classify from illuminated percentage and direction.
    ///
    /// `< 2` new, `< 48` crescent, `48..=52` quarter, `< 98` gibbous,
    /// otherwise full.
    pub fn classify(illumination_pct: f64, waxing: bool) -> Self {
        match (illumination_pct, waxing) {
            (p, _) if p < 2.0 => Self::NewMoon,
            (p, true) if p < 48.0 => Self::WaxingCrescent,
            (p, false) if p < 48.0 => Self::WaningCrescent,
            (p, true) if p <= 52.0 => Self::FirstQuarter,
            (p, false) if p <= 52.0 => Self::LastQuarter,
            (p, true) if p < 98.0 => Self::WaxingGibbous,
            (p, false) if p < 98.0 => Self::WaningGibbous,
            _ => Self::FullMoon,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewMoon => "New Moon",
            Self::WaxingCrescent => "Waxing Crescent",
            Self::FirstQuarter => "First Quarter",
            Self::WaxingGibbous => "Waxing Gibbous",
            Self::FullMoon => "Full Moon",
            Self::WaningGibbous => "Waning Gibbous",
            Self::LastQuarter => "Last Quarter",
            Self::WaningCrescent => "Waning Crescent",
        }
    }
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoonPhase {
    pub illumination_pct: f64,
    pub phase: PhaseName,
    pub waxing: bool,
    pub elongation_deg: f64,
    pub phase_angle_deg: f64,
}

fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    unit(a.dot(b) / (a.norm() * b.norm())).acos().to_degrees()
}

/// Geocentric Sun–Moon elongation in degrees
pub fn elongation(d: f64) -> f64 {
    angle_between(&sun::geocentric_equatorial(d), &moon::geocentric_equatorial(d))
}

/// Moon phase for `d` days since J2000.0 (TT)
pub fn moon_phase(d: f64) -> MoonPhase {
    let sun = sun::geocentric_equatorial(d);
    let moon = moon::geocentric_equatorial(d);

    let elongation_deg = angle_between(&sun, &moon);
    let psi = elongation_deg.to_radians();
    let (r_sun, r_moon) = (sun.norm(), moon.norm());
    let phase_angle = (r_sun * psi.sin()).atan2(r_moon - r_sun * psi.cos());

    let illumination_pct = (1.0 + phase_angle.cos()) / 2.0 * 100.0;
    let waxing = elongation(d + RATE_STEP_DAYS) > elongation(d - RATE_STEP_DAYS);

    MoonPhase {
        illumination_pct,
        phase: PhaseName::classify(illumination_pct, waxing),
        waxing,
        elongation_deg,
        phase_angle_deg: phase_angle.to_degrees(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_thresholds() {
        assert_eq!(PhaseName::classify(1.9, true), PhaseName::NewMoon);
        assert_eq!(PhaseName::classify(1.9, false), PhaseName::NewMoon);
        assert_eq!(PhaseName::classify(2.0, true), PhaseName::WaxingCrescent);
        assert_eq!(PhaseName::classify(47.9, false), PhaseName::WaningCrescent);
        assert_eq!(PhaseName::classify(48.0, true), PhaseName::FirstQuarter);
        assert_eq!(PhaseName::classify(52.0, false), PhaseName::LastQuarter);
        assert_eq!(PhaseName::classify(52.1, true), PhaseName::WaxingGibbous);
        assert_eq!(PhaseName::classify(97.9, false), PhaseName::WaningGibbous);
        assert_eq!(PhaseName::classify(98.0, false), PhaseName::FullMoon);
    }

    #[test]
    fn test_phase_name_display() {
        assert_eq!(PhaseName::WaxingGibbous.to_string(), "Waxing Gibbous");
        assert_eq!(
            serde_json::to_string(&PhaseName::LastQuarter).unwrap(),
            "\"last_quarter\""
        );
    }

    #[test]
    fn test_illumination_bounds() {
        for n in 0..60 {
            let phase = moon_phase(8_800.0 + n as f64 * 0.5);
            assert!((0.0..=100.0).contains(&phase.illumination_pct));
            assert!((0.0..=180.0).contains(&phase.elongation_deg));
        }
    }
}
