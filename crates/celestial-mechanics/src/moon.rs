//! Lunar position from mean orbital elements
//!
//! Keplerian ellipse for the Moon's mean orbit, rotated by the node and
//! argument of perigee, then corrected with the largest solar
//! perturbation terms (evection, variation, yearly equation and friends).
//! Longitude is good to a few arc-minutes, which leaves the topocentric
//! direction well inside the mount's pointing tolerance.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::angles::revolution;
use crate::horizon::{ecliptic_to_equatorial, EARTH_RADIUS_KM};

const INCLINATION_DEG: f64 = 5.1454;
const SEMI_MAJOR_AXIS_EARTH_RADII: f64 = 60.2666;
const ECCENTRICITY: f64 = 0.054_900;

/// The element series counts days from 1999-12-31 0h rather than J2000.0
const ELEMENT_EPOCH_OFFSET_DAYS: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LunarCoordinates {
    pub ecliptic_longitude_deg: f64,
    pub ecliptic_latitude_deg: f64,
    pub distance_km: f64,
    pub obliquity_deg: f64,
}

#[derive(Debug, Clone, Copy)]
struct OrbitalElements {
    node: f64,
    perigee: f64,
    mean_anomaly: f64,
    sun_perigee: f64,
    sun_mean_anomaly: f64,
}

impl OrbitalElements {
    fn at(ds: f64) -> Self {
        Self {
            node: revolution(125.1228 - 0.052_953_808_3 * ds),
            perigee: revolution(318.0634 + 0.164_357_322_3 * ds),
            mean_anomaly: revolution(115.3654 + 13.064_992_950_9 * ds),
            sun_perigee: revolution(282.9404 + 4.709_35e-5 * ds),
            sun_mean_anomaly: revolution(356.0470 + 0.985_600_258_5 * ds),
        }
    }
}

fn sind(deg: f64) -> f64 {
    deg.to_radians().sin()
}

fn cosd(deg: f64) -> f64 {
    deg.to_radians().cos()
}

/// Solve Kepler's equation `M = E - e sin E` (degrees) by Newton iteration
fn eccentric_anomaly(mean_anomaly: f64, e: f64) -> f64 {
    let mut ecc = mean_anomaly
        + (e * sind(mean_anomaly) * (1.0 + e * cosd(mean_anomaly))).to_degrees();
    for _ in 0..10 {
        let next = ecc
            - (ecc - (e * sind(ecc)).to_degrees() - mean_anomaly) / (1.0 - e * cosd(ecc));
        let converged = (next - ecc).abs() < 1e-9;
        ecc = next;
        if converged {
            break;
        }
    }
    ecc
}

/// Geocentric ecliptic coordinates of the Moon for `d` days since J2000.0 (TT)
pub fn lunar_coordinates(d: f64) -> LunarCoordinates {
    let ds = d + ELEMENT_EPOCH_OFFSET_DAYS;
    let el = OrbitalElements::at(ds);

    let ecc = eccentric_anomaly(el.mean_anomaly, ECCENTRICITY);
    let xv = SEMI_MAJOR_AXIS_EARTH_RADII * (cosd(ecc) - ECCENTRICITY);
    let yv = SEMI_MAJOR_AXIS_EARTH_RADII * (1.0 - ECCENTRICITY * ECCENTRICITY).sqrt() * sind(ecc);
    let true_anomaly = yv.atan2(xv).to_degrees();
    let mut radius = xv.hypot(yv);

    let arg = true_anomaly + el.perigee;
    let xh = radius * (cosd(el.node) * cosd(arg) - sind(el.node) * sind(arg) * cosd(INCLINATION_DEG));
    let yh = radius * (sind(el.node) * cosd(arg) + cosd(el.node) * sind(arg) * cosd(INCLINATION_DEG));
    let zh = radius * sind(arg) * sind(INCLINATION_DEG);

    let mut lon = yh.atan2(xh).to_degrees();
    let mut lat = zh.atan2(xh.hypot(yh)).to_degrees();

    // Fundamental arguments for the perturbation series
    let m = el.mean_anomaly;
    let ms = el.sun_mean_anomaly;
    let sun_lon = revolution(ms + el.sun_perigee);
    let moon_lon = revolution(m + el.perigee + el.node);
    let elong = revolution(moon_lon - sun_lon);
    let lat_arg = revolution(moon_lon - el.node);

    lon += -1.274 * sind(m - 2.0 * elong)
        + 0.658 * sind(2.0 * elong)
        - 0.186 * sind(ms)
        - 0.059 * sind(2.0 * m - 2.0 * elong)
        - 0.057 * sind(m - 2.0 * elong + ms)
        + 0.053 * sind(m + 2.0 * elong)
        + 0.046 * sind(2.0 * elong - ms)
        + 0.041 * sind(m - ms)
        - 0.035 * sind(elong)
        - 0.031 * sind(m + ms)
        - 0.015 * sind(2.0 * lat_arg - 2.0 * elong)
        + 0.011 * sind(m - 4.0 * elong);

    lat += -0.173 * sind(lat_arg - 2.0 * elong)
        - 0.055 * sind(m - lat_arg - 2.0 * elong)
        - 0.046 * sind(m + lat_arg - 2.0 * elong)
        + 0.033 * sind(lat_arg + 2.0 * elong)
        + 0.017 * sind(2.0 * m + lat_arg);

    radius += -0.58 * cosd(m - 2.0 * elong) - 0.46 * cosd(2.0 * elong);

    LunarCoordinates {
        ecliptic_longitude_deg: revolution(lon),
        ecliptic_latitude_deg: lat,
        distance_km: radius * EARTH_RADIUS_KM,
        obliquity_deg: 23.4393 - 3.563e-7 * ds,
    }
}

/// Geocentric equatorial position of the Moon in km
pub fn geocentric_equatorial(d: f64) -> Vector3<f64> {
    let moon = lunar_coordinates(d);
    ecliptic_to_equatorial(
        moon.ecliptic_longitude_deg,
        moon.ecliptic_latitude_deg,
        moon.distance_km,
        moon.obliquity_deg,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kepler_circular_orbit_is_identity() {
        assert!((eccentric_anomaly(123.4, 0.0) - 123.4).abs() < 1e-12);
    }

    #[test]
    fn test_kepler_satisfies_equation() {
        let m = 200.0;
        let e = eccentric_anomaly(m, ECCENTRICITY);
        let residual = e - (ECCENTRICITY * sind(e)).to_degrees() - m;
        assert!(residual.abs() < 1e-6);
    }

    #[test]
    fn test_distance_within_perigee_apogee() {
        for day in (0..400).map(|n| n as f64 * 0.75) {
            let moon = lunar_coordinates(8_800.0 + day);
            assert!(moon.distance_km > 355_000.0 && moon.distance_km < 407_500.0);
            assert!(moon.ecliptic_latitude_deg.abs() < 5.4);
        }
    }

    #[test]
    fn test_moves_roughly_thirteen_degrees_per_day() {
        let a = lunar_coordinates(8_900.0).ecliptic_longitude_deg;
        let b = lunar_coordinates(8_901.0).ecliptic_longitude_deg;
        let step = revolution(b - a);
        assert!(step > 11.0 && step < 15.5, "step {step}");
    }
}
