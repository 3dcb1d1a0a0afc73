//! Observer location

use serde::{Deserialize, Serialize};

use crate::{CelestialError, Result};

/// Geodetic observer position in degrees (east-positive longitude)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observer {
    pub latitude: f64,
    pub longitude: f64,
}

impl Observer {
    /// Build a validated observer
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let observer = Self { latitude, longitude };
        observer.validate()?;
        Ok(observer)
    }

    /// Reject non-finite or out-of-range coordinates
    pub fn validate(&self) -> Result<()> {
        let lat_ok = self.latitude.is_finite() && (-90.0..=90.0).contains(&self.latitude);
        let lon_ok = self.longitude.is_finite() && (-180.0..=180.0).contains(&self.longitude);
        if lat_ok && lon_ok {
            Ok(())
        } else {
            Err(CelestialError::InvalidLocation {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }

    /// "40.7128° N, 74.0060° W"
    pub fn label(&self) -> String {
        let ns = if self.latitude >= 0.0 { "N" } else { "S" };
        let ew = if self.longitude >= 0.0 { "E" } else { "W" };
        format!(
            "{:.4}° {}, {:.4}° {}",
            self.latitude.abs(),
            ns,
            self.longitude.abs(),
            ew
        )
    }
}

impl Default for Observer {
    fn default() -> Self {
        // New York City
        Self {
            latitude: 40.7128,
            longitude: -74.0060,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_bounds() {
        assert!(Observer::new(90.0, 180.0).is_ok());
        assert!(Observer::new(-90.0, -180.0).is_ok());
        assert!(Observer::new(90.5, 0.0).is_err());
        assert!(Observer::new(0.0, -181.0).is_err());
        assert!(Observer::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_observer_label() {
        assert_eq!(Observer::default().label(), "40.7128° N, 74.0060° W");
    }
}
