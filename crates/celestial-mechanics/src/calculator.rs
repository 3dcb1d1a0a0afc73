//! Shared calculator holding the live observer location

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::riseset::{self, RiseSet};
use crate::{Body, CelestialError, CelestialPosition, Observer, Result};

/// Sun/Moon calculator bound to a mutable observer.
///
/// The observer is swapped as a whole under a write lock, so readers never
/// see a latitude from one location paired with the longitude of another.
pub struct CelestialCalculator {
    observer: RwLock<Observer>,
    last_good: Mutex<HashMap<Body, CelestialPosition>>,
}

impl CelestialCalculator {
    pub fn new(observer: Observer) -> Result<Self> {
        observer.validate()?;
        Ok(Self {
            observer: RwLock::new(observer),
            last_good: Mutex::new(HashMap::new()),
        })
    }

    pub fn observer(&self) -> Observer {
        *self.observer.read()
    }

    /// Replace the observer. On error the previous location is kept.
    pub fn set_observer(&self, latitude: f64, longitude: f64) -> Result<Observer> {
        let next = Observer::new(latitude, longitude)?;
        *self.observer.write() = next;
        info!(latitude, longitude, "Observer updated");
        Ok(next)
    }

    /// Position of `body` for the current observer.
    ///
    /// A domain failure in the pipeline falls back to the last good
    /// position for that body, if there is one.
    pub fn position(&self, body: Body, at: DateTime<Utc>) -> Result<CelestialPosition> {
        let observer = self.observer();
        self.resolve(body, crate::position(body, &observer, at))
    }

    fn resolve(&self, body: Body, computed: Result<CelestialPosition>) -> Result<CelestialPosition> {
        match computed {
            Ok(position) => {
                self.last_good.lock().insert(body, position);
                Ok(position)
            }
            Err(CelestialError::CalculationDomain(reason)) => {
                match self.last_good.lock().get(&body).copied() {
                    Some(cached) => {
                        warn!(%body, %reason, "Calculation failed, returning cached position");
                        Ok(cached)
                    }
                    None => Err(CelestialError::CalculationDomain(reason)),
                }
            }
            Err(e) => Err(e),
        }
    }

    pub fn rise_and_set(&self, body: Body, date: NaiveDate) -> Result<RiseSet> {
        riseset::rise_and_set(body, &self.observer(), date)
    }
}

impl Default for CelestialCalculator {
    fn default() -> Self {
        Self {
            observer: RwLock::new(Observer::default()),
            last_good: Mutex::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_set_observer_keeps_previous_on_error() {
        let calc = CelestialCalculator::default();
        calc.set_observer(51.4779, 0.0).unwrap();

        let err = calc.set_observer(120.0, 0.0).unwrap_err();
        assert!(matches!(err, CelestialError::InvalidLocation { .. }));
        assert_eq!(calc.observer(), Observer::new(51.4779, 0.0).unwrap());
    }

    #[test]
    fn test_domain_error_returns_cached_position() {
        let calc = CelestialCalculator::default();
        let good = calc.position(Body::Moon, noon()).unwrap();

        let fallback = calc
            .resolve(Body::Moon, Err(CelestialError::CalculationDomain("nan".into())))
            .unwrap();
        assert_eq!(fallback, good);
    }

    #[test]
    fn test_domain_error_without_cache_propagates() {
        let calc = CelestialCalculator::default();
        let result = calc.resolve(Body::Sun, Err(CelestialError::CalculationDomain("nan".into())));
        assert!(matches!(result, Err(CelestialError::CalculationDomain(_))));
    }

    #[test]
    fn test_position_uses_current_observer() {
        let calc = CelestialCalculator::default();
        let nyc = calc.position(Body::Sun, noon()).unwrap();
        calc.set_observer(-33.8688, 151.2093).unwrap();
        let sydney = calc.position(Body::Sun, noon()).unwrap();
        assert!(nyc.visible);
        assert!(!sydney.visible);
    }
}
