//! Low-precision solar coordinates
//!
//! Mean longitude / mean anomaly series with a two-term equation of centre
//! and a linearly drifting obliquity. Good to about 0.01° between 1950 and
//! 2050, which is far below the mount's arrival tolerance.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::angles::revolution;
use crate::horizon::ecliptic_to_equatorial;

/// Astronomical unit in km
pub const AU_KM: f64 = 149_597_870.7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolarCoordinates {
    pub mean_longitude_deg: f64,
    pub mean_anomaly_deg: f64,
    pub ecliptic_longitude_deg: f64,
    pub obliquity_deg: f64,
    pub distance_au: f64,
}

/// Solar coordinates for `d` days since J2000.0 (TT)
pub fn solar_coordinates(d: f64) -> SolarCoordinates {
    let mean_longitude_deg = revolution(280.460 + 0.985_647_4 * d);
    let mean_anomaly_deg = revolution(357.528 + 0.985_600_3 * d);

    let g = mean_anomaly_deg.to_radians();
    let ecliptic_longitude_deg =
        revolution(mean_longitude_deg + 1.915 * g.sin() + 0.020 * (2.0 * g).sin());
    let distance_au = 1.000_14 - 0.016_71 * g.cos() - 0.000_14 * (2.0 * g).cos();
    let obliquity_deg = 23.439 - 0.000_000_4 * d;

    SolarCoordinates {
        mean_longitude_deg,
        mean_anomaly_deg,
        ecliptic_longitude_deg,
        obliquity_deg,
        distance_au,
    }
}

/// Geocentric equatorial position of the Sun in km
pub fn geocentric_equatorial(d: f64) -> Vector3<f64> {
    let sun = solar_coordinates(d);
    ecliptic_to_equatorial(
        sun.ecliptic_longitude_deg,
        0.0,
        sun.distance_au * AU_KM,
        sun.obliquity_deg,
    )
}
