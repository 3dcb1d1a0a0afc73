//! Time scales used by the ephemeris: days since J2000 and sidereal time.

use chrono::{DateTime, Utc};

use crate::angles::revolution;

/// J2000.0 epoch (2000-01-01T12:00:00 UTC) in Unix milliseconds
const J2000_UNIX_MS: i64 = 946_728_000_000;

const MS_PER_DAY: f64 = 86_400_000.0;

/// TT - UTC, close enough for visual pointing over the coming decades
pub const DELTA_T_SECONDS: f64 = 69.2;

/// Days since J2000.0 on the UT scale (drives Earth rotation)
pub fn days_since_j2000(at: DateTime<Utc>) -> f64 {
    (at.timestamp_millis() - J2000_UNIX_MS) as f64 / MS_PER_DAY
}

/// Days since J2000.0 on the TT scale (drives orbital motion)
pub fn days_since_j2000_tt(at: DateTime<Utc>) -> f64 {
    days_since_j2000(at) + DELTA_T_SECONDS / 86_400.0
}

/// Greenwich mean sidereal time in degrees
pub fn gmst_deg(at: DateTime<Utc>) -> f64 {
    let d = days_since_j2000(at);
    let t = d / 36_525.0;
    revolution(280.460_618_37 + 360.985_647_366_29 * d + 0.000_387_933 * t * t - t * t * t / 38_710_000.0)
}

/// Local sidereal time in degrees for an east-positive longitude
pub fn local_sidereal_deg(at: DateTime<Utc>, longitude_deg: f64) -> f64 {
    revolution(gmst_deg(at) + longitude_deg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_j2000_epoch() {
        let epoch = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(days_since_j2000(epoch), 0.0);
    }

    #[test]
    fn test_gmst_at_epoch() {
        let epoch = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert!((gmst_deg(epoch) - 280.460_618_37).abs() < 1e-9);
    }

    #[test]
    fn test_sidereal_day_is_shorter_than_solar_day() {
        // After one solar day the sky has advanced by ~0.9856°
        let a = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let advance = revolution(gmst_deg(b) - gmst_deg(a));
        assert!((advance - 0.985_647).abs() < 1e-3);
    }

    #[test]
    fn test_local_sidereal_offsets_by_longitude() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 6, 30, 0).unwrap();
        let lst = local_sidereal_deg(at, -90.0);
        assert!((revolution(gmst_deg(at) - 90.0) - lst).abs() < 1e-9);
    }
}
