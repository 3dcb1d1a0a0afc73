//! Horizon crossing search

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{position, Body, Observer, Result};

const SCAN_STEP_SECONDS: i64 = 60;
const MINUTES_PER_DAY: i64 = 24 * 60;

/// First rise and first set of a body during one UTC day.
///
/// Either is `None` when the body stays above (polar day) or below
/// (polar night) the horizon, or simply does not cross that day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiseSet {
    pub body: Body,
    pub date: NaiveDate,
    pub rise: Option<DateTime<Utc>>,
    pub set: Option<DateTime<Utc>>,
}

/// Linear interpolation of the zero crossing between two samples
fn crossing(t0: DateTime<Utc>, alt0: f64, alt1: f64) -> DateTime<Utc> {
    let fraction = alt0 / (alt0 - alt1);
    t0 + Duration::milliseconds((fraction * SCAN_STEP_SECONDS as f64 * 1000.0).round() as i64)
}

pub fn rise_and_set(body: Body, observer: &Observer, date: NaiveDate) -> Result<RiseSet> {
    observer.validate()?;

    let start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
    let step = Duration::seconds(SCAN_STEP_SECONDS);

    let mut prev_t = start;
    let mut prev_alt = position(body, observer, start)?.altitude;
    let mut rise = None;
    let mut set = None;

    for _ in 0..MINUTES_PER_DAY {
        let t = prev_t + step;
        let alt = position(body, observer, t)?.altitude;

        if rise.is_none() && prev_alt < 0.0 && alt >= 0.0 {
            rise = Some(crossing(prev_t, prev_alt, alt));
        }
        if set.is_none() && prev_alt >= 0.0 && alt < 0.0 {
            set = Some(crossing(prev_t, prev_alt, alt));
        }
        if rise.is_some() && set.is_some() {
            break;
        }
        prev_t = t;
        prev_alt = alt;
    }

    debug!(%body, %date, ?rise, ?set, "Rise/set search complete");
    Ok(RiseSet {
        body,
        date,
        rise,
        set,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crossing_interpolates() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
        let t = crossing(t0, -1.0, 1.0);
        assert_eq!(t, t0 + Duration::seconds(30));
    }

    #[test]
    fn test_invalid_observer_rejected() {
        let bad = Observer {
            latitude: 0.0,
            longitude: 200.0,
        };
        let date = NaiveDate::from_ymd_opt(2024, 6, 20).unwrap();
        assert!(rise_and_set(Body::Sun, &bad, date).is_err());
    }
}
