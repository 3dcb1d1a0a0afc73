//! Argument parsing and report formatting for `mountctl`

use celestial_mechanics::{CelestialPosition, RiseSet};
use chrono::{DateTime, NaiveDate, Utc};
use mount_control::Target;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CliError {
    #[error("Invalid target '{0}': expected sun, moon or ALT,AZ")]
    InvalidTarget(String),
    #[error("Invalid time '{0}': expected RFC 3339, e.g. 2024-04-08T18:18:00Z")]
    InvalidTime(String),
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// `sun`, `moon` or `ALT,AZ` in degrees
pub fn parse_target(s: &str) -> Result<Target, CliError> {
    let trimmed = s.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "sun" => return Ok(Target::Sun),
        "moon" => return Ok(Target::Moon),
        _ => {}
    }

    let invalid = || CliError::InvalidTarget(s.to_string());
    let (alt, az) = trimmed.split_once(',').ok_or_else(invalid)?;
    let altitude: f64 = alt.trim().parse().map_err(|_| invalid())?;
    let azimuth: f64 = az.trim().parse().map_err(|_| invalid())?;
    if !(altitude.is_finite() && azimuth.is_finite()) {
        return Err(invalid());
    }
    Ok(Target::Manual { altitude, azimuth })
}

pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, CliError> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| CliError::InvalidTime(s.to_string()))
}

pub fn parse_date(s: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| CliError::InvalidDate(s.to_string()))
}

pub fn format_position(p: &CelestialPosition) -> String {
    let mut line = format!(
        "{:<4}  alt {:>7.2}°  az {:>7.2}°  ra {:>7.2}°  dec {:>+7.2}°  {:>12.0} km  {}",
        p.body,
        p.altitude,
        p.azimuth,
        p.right_ascension,
        p.declination,
        p.distance_km,
        if p.visible { "visible" } else { "below horizon" }
    );
    if let Some(moon) = &p.moon {
        line.push_str(&format!(
            "\n      {} ({:.1}% illuminated, elongation {:.1}°)",
            moon.phase, moon.illumination_pct, moon.elongation_deg
        ));
    }
    line
}

pub fn format_riseset(rs: &RiseSet) -> String {
    let show = |t: Option<DateTime<Utc>>| {
        t.map(|t| t.format("%H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "none".to_string())
    };
    format!(
        "{:<4}  {}  rise {}  set {}",
        rs.body,
        rs.date,
        show(rs.rise),
        show(rs.set)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use celestial_mechanics::{position, Body, Observer};
    use chrono::TimeZone;

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("Sun").unwrap(), Target::Sun);
        assert_eq!(parse_target("moon").unwrap(), Target::Moon);
        assert_eq!(
            parse_target(" 45.5, 270 ").unwrap(),
            Target::Manual {
                altitude: 45.5,
                azimuth: 270.0
            }
        );
        assert!(parse_target("mars").is_err());
        assert!(parse_target("45").is_err());
        assert!(parse_target("NaN,10").is_err());
    }

    #[test]
    fn test_parse_instant_and_date() {
        assert_eq!(
            parse_instant("2024-04-08T13:18:00-05:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 4, 8, 18, 18, 0).unwrap()
        );
        assert!(parse_instant("yesterday").is_err());
        assert_eq!(
            parse_date("2024-06-20").unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 20).unwrap()
        );
        assert!(parse_date("20/06/2024").is_err());
    }

    #[test]
    fn test_format_moon_includes_phase() {
        let at = Utc.with_ymd_and_hms(2024, 4, 23, 23, 49, 0).unwrap();
        let moon = position(Body::Moon, &Observer::default(), at).unwrap();
        let text = format_position(&moon);
        assert!(text.starts_with("moon"));
        assert!(text.contains("Full Moon"));
    }

    #[test]
    fn test_format_riseset_polar_night() {
        let rs = RiseSet {
            body: Body::Sun,
            date: NaiveDate::from_ymd_opt(2024, 12, 20).unwrap(),
            rise: None,
            set: None,
        };
        assert_eq!(format_riseset(&rs), "sun   2024-12-20  rise none  set none");
    }
}
