//! Angle Math
//!
//! Clamping, wraparound and shortest-path helpers shared by the mount axes
//! and the ephemeris code. Every function rejects NaN/Inf input with
//! [`AngleError::InvalidAngle`]; finite input never fails.

use thiserror::Error;

/// Full turn in degrees
pub const FULL_TURN_DEG: f64 = 360.0;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum AngleError {
    #[error("Invalid angle: {0} is not a finite number")]
    InvalidAngle(f64),
    #[error("Invalid range: [{min}, {max}]")]
    InvalidRange { min: f64, max: f64 },
}

pub type Result<T> = std::result::Result<T, AngleError>;

fn finite(value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AngleError::InvalidAngle(value))
    }
}

fn period_of(period: f64) -> Result<f64> {
    let period = finite(period)?;
    if period <= 0.0 {
        return Err(AngleError::InvalidRange { min: 0.0, max: period });
    }
    Ok(period)
}

/// Clamp a value into a closed range (bounded axes)
pub fn clamp(value: f64, min: f64, max: f64) -> Result<f64> {
    let value = finite(value)?;
    let (min, max) = (finite(min)?, finite(max)?);
    if min > max {
        return Err(AngleError::InvalidRange { min, max });
    }
    Ok(value.clamp(min, max))
}

/// Wrap a value into `[0, period)`
pub fn wrap(value: f64, period: f64) -> Result<f64> {
    let value = finite(value)?;
    let period = period_of(period)?;
    let wrapped = value.rem_euclid(period);
    // rem_euclid rounds tiny negative inputs up to exactly `period`
    Ok(if wrapped >= period { 0.0 } else { wrapped })
}

/// Signed travel from `current` to `target` along the shorter way round.
///
/// The result satisfies `|delta| <= period / 2`. At exactly half a period
/// both directions are equal and the positive (increasing) one is chosen.
pub fn shortest_delta(current: f64, target: f64, period: f64) -> Result<f64> {
    let period = period_of(period)?;
    let half = period / 2.0;

    let mut delta = wrap(target, period)? - wrap(current, period)?;
    if delta > half {
        delta -= period;
    } else if delta <= -half {
        delta += period;
    }
    Ok(delta)
}

/// Unsigned angular distance on a modular axis
pub fn separation(a: f64, b: f64, period: f64) -> Result<f64> {
    Ok(shortest_delta(a, b, period)?.abs())
}

/// Reduce degrees into `[0, 360)` for values already known to be finite.
pub(crate) fn revolution(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(FULL_TURN_DEG);
    if wrapped >= FULL_TURN_DEG {
        0.0
    } else {
        wrapped
    }
}

/// Clamp an inverse-trig argument into `[-1, 1]` before `asin`/`acos`.
pub(crate) fn unit(value: f64) -> f64 {
    value.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_bounded_axis() {
        assert_eq!(clamp(95.0, 0.0, 90.0).unwrap(), 90.0);
        assert_eq!(clamp(-3.0, 0.0, 90.0).unwrap(), 0.0);
        assert_eq!(clamp(45.5, 0.0, 90.0).unwrap(), 45.5);
    }

    #[test]
    fn test_clamp_rejects_inverted_range() {
        assert!(matches!(
            clamp(10.0, 90.0, 0.0),
            Err(AngleError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_wrap_azimuth() {
        assert_eq!(wrap(370.0, 360.0).unwrap(), 10.0);
        assert_eq!(wrap(-10.0, 360.0).unwrap(), 350.0);
        assert_eq!(wrap(360.0, 360.0).unwrap(), 0.0);
        assert_eq!(wrap(-1e-18, 360.0).unwrap(), 0.0);
    }

    #[test]
    fn test_shortest_delta_crosses_north() {
        // 350° -> 10° is +20°, not -340°
        let delta = shortest_delta(350.0, 10.0, 360.0).unwrap();
        assert!((delta - 20.0).abs() < 1e-9);

        let delta = shortest_delta(10.0, 350.0, 360.0).unwrap();
        assert!((delta + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_shortest_delta_half_turn_prefers_positive() {
        assert_eq!(shortest_delta(0.0, 180.0, 360.0).unwrap(), 180.0);
        assert_eq!(shortest_delta(180.0, 0.0, 360.0).unwrap(), 180.0);
        assert_eq!(shortest_delta(270.0, 90.0, 360.0).unwrap(), 180.0);
    }

    #[test]
    fn test_non_finite_rejected() {
        assert_eq!(
            wrap(f64::NAN, 360.0).unwrap_err().to_string(),
            "Invalid angle: NaN is not a finite number"
        );
        assert!(matches!(
            shortest_delta(0.0, f64::INFINITY, 360.0),
            Err(AngleError::InvalidAngle(_))
        ));
        assert!(matches!(
            clamp(f64::NEG_INFINITY, 0.0, 90.0),
            Err(AngleError::InvalidAngle(_))
        ));
    }

    #[test]
    fn test_separation() {
        assert!((separation(359.0, 1.0, 360.0).unwrap() - 2.0).abs() < 1e-9);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn angle_strategy() -> impl Strategy<Value = f64> {
        -1.0e6f64..1.0e6f64
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(5000))]

        #[test]
        fn fuzz_shortest_delta_bounded(c in angle_strategy(), t in angle_strategy()) {
            let delta = shortest_delta(c, t, FULL_TURN_DEG).unwrap();
            prop_assert!(delta.abs() <= 180.0 + 1e-9);
        }

        #[test]
        fn fuzz_shortest_delta_lands_on_target(c in angle_strategy(), t in angle_strategy()) {
            let delta = shortest_delta(c, t, FULL_TURN_DEG).unwrap();
            let landed = wrap(c + delta, FULL_TURN_DEG).unwrap();
            let expected = wrap(t, FULL_TURN_DEG).unwrap();
            // Compare on the circle so 359.999... and 0.0 agree
            prop_assert!(separation(landed, expected, FULL_TURN_DEG).unwrap() < 1e-6);
        }

        #[test]
        fn fuzz_wrap_in_range(v in angle_strategy(), period in 1.0f64..1000.0) {
            let w = wrap(v, period).unwrap();
            prop_assert!(w >= 0.0 && w < period);
        }

        #[test]
        fn fuzz_clamp_in_range(v in angle_strategy(), lo in -90.0f64..0.0, hi in 0.0f64..90.0) {
            let c = clamp(v, lo, hi).unwrap();
            prop_assert!(c >= lo && c <= hi);
        }
    }
}
