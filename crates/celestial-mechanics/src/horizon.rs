//! Frame conversions: ecliptic → equatorial → topocentric horizon.

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::angles::{revolution, unit};
use crate::Observer;

/// Equatorial Earth radius in km
pub const EARTH_RADIUS_KM: f64 = 6_378.14;

/// Topocentric direction to a body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizonCoordinates {
    pub altitude_deg: f64,
    pub azimuth_deg: f64,
    pub right_ascension_deg: f64,
    pub declination_deg: f64,
    pub distance_km: f64,
}

/// Rectangular equatorial vector from ecliptic longitude/latitude/distance
pub fn ecliptic_to_equatorial(
    longitude_deg: f64,
    latitude_deg: f64,
    distance: f64,
    obliquity_deg: f64,
) -> Vector3<f64> {
    let (lon, lat) = (longitude_deg.to_radians(), latitude_deg.to_radians());
    let ecliptic = Vector3::new(
        distance * lat.cos() * lon.cos(),
        distance * lat.cos() * lon.sin(),
        distance * lat.sin(),
    );
    Rotation3::from_axis_angle(&Vector3::x_axis(), obliquity_deg.to_radians()) * ecliptic
}

/// Observer's geocentric position (km) in the equatorial frame at the
/// given local sidereal time, on the reference ellipsoid.
pub fn observer_vector(observer: &Observer, lst_deg: f64) -> Vector3<f64> {
    let lat = observer.latitude;
    let geocentric_lat = (lat - 0.1924 * (2.0 * lat).to_radians().sin()).to_radians();
    let rho = EARTH_RADIUS_KM * (0.998_33 + 0.001_67 * (2.0 * lat).to_radians().cos());
    let lst = lst_deg.to_radians();

    Vector3::new(
        rho * geocentric_lat.cos() * lst.cos(),
        rho * geocentric_lat.cos() * lst.sin(),
        rho * geocentric_lat.sin(),
    )
}

/// Convert a topocentric equatorial vector to altitude/azimuth.
///
/// Azimuth is measured from north through east.
pub fn to_horizon(topocentric: &Vector3<f64>, observer: &Observer, lst_deg: f64) -> HorizonCoordinates {
    let distance_km = topocentric.norm();
    let right_ascension_deg = revolution(topocentric.y.atan2(topocentric.x).to_degrees());
    let declination_deg = unit(topocentric.z / distance_km).asin().to_degrees();

    let hour_angle = (lst_deg - right_ascension_deg).to_radians();
    let (lat, dec) = (observer.latitude.to_radians(), declination_deg.to_radians());

    let sin_alt = lat.sin() * dec.sin() + lat.cos() * dec.cos() * hour_angle.cos();
    let altitude_deg = unit(sin_alt).asin().to_degrees();

    let azimuth_deg = revolution(
        (-dec.cos() * hour_angle.sin())
            .atan2(dec.sin() * lat.cos() - dec.cos() * lat.sin() * hour_angle.cos())
            .to_degrees(),
    );

    HorizonCoordinates {
        altitude_deg,
        azimuth_deg,
        right_ascension_deg,
        declination_deg,
        distance_km,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obliquity_rotation_tilts_summer_solstice() {
        // Ecliptic longitude 90° sits at declination +ε
        let v = ecliptic_to_equatorial(90.0, 0.0, 1.0, 23.44);
        let dec = v.z.asin().to_degrees();
        assert!((dec - 23.44).abs() < 1e-9);
    }

    #[test]
    fn test_object_on_meridian_south_of_zenith() {
        let observer = Observer::new(45.0, 0.0).unwrap();
        // RA == LST, dec 0 → due south at 90 - 45 = 45° altitude
        let lst = 100.0_f64;
        let dir = Vector3::new(lst.to_radians().cos(), lst.to_radians().sin(), 0.0) * 1.0e8;
        let h = to_horizon(&dir, &observer, lst);
        assert!((h.altitude_deg - 45.0).abs() < 1e-6);
        assert!((h.azimuth_deg - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_rising_object_is_in_the_east() {
        let observer = Observer::new(30.0, 0.0).unwrap();
        // Hour angle -6h: on the horizon, due east for dec 0
        let lst = 0.0_f64;
        let ra = 90.0_f64;
        let dir = Vector3::new(ra.to_radians().cos(), ra.to_radians().sin(), 0.0) * 1.0e8;
        let h = to_horizon(&dir, &observer, lst);
        assert!(h.altitude_deg.abs() < 1e-6);
        assert!((h.azimuth_deg - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_observer_vector_radius() {
        let equator = observer_vector(&Observer::new(0.0, 0.0).unwrap(), 0.0);
        let pole = observer_vector(&Observer::new(90.0, 0.0).unwrap(), 0.0);
        assert!((equator.norm() - EARTH_RADIUS_KM).abs() < 0.1);
        assert!(pole.norm() < equator.norm());
    }
}
