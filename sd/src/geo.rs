//! Great-circle distance between coordinates
//!
//! Haversine on a spherical Earth. Inputs are validated, never clamped.

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult};

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A point on the Earth's surface in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a validated coordinate
    pub fn new(latitude: f64, longitude: f64) -> DispatchResult<Self> {
        let coordinate = Self { latitude, longitude };
        coordinate.validate()?;
        Ok(coordinate)
    }

    /// Check the ranges: latitude in [-90, 90], longitude in [-180, 180]
    ///
    /// Values that arrive through deserialization bypass `new`, so anything
    /// read from the outside world gets re-checked here.
    pub fn validate(&self) -> DispatchResult<()> {
        let lat_ok = self.latitude.is_finite() && (-90.0..=90.0).contains(&self.latitude);
        let lon_ok = self.longitude.is_finite() && (-180.0..=180.0).contains(&self.longitude);
        if lat_ok && lon_ok {
            Ok(())
        } else {
            Err(DispatchError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.5}, {:.5})", self.latitude, self.longitude)
    }
}

/// Haversine distance in kilometers
///
/// Symmetric bit for bit: only absolute deltas and a commutative product
/// enter the formula.
pub fn distance_km(a: &Coordinate, b: &Coordinate) -> DispatchResult<f64> {
    a.validate()?;
    b.validate()?;

    let delta_lat = (b.latitude - a.latitude).abs().to_radians();
    let delta_lon = (b.longitude - a.longitude).abs().to_radians();
    let cos_product = a.latitude.to_radians().cos() * b.latitude.to_radians().cos();

    let h = (delta_lat / 2.0).sin().powi(2) + cos_product * (delta_lon / 2.0).sin().powi(2);
    // rounding can push h a hair past 1 for antipodal points
    let c = 2.0 * h.min(1.0).sqrt().asin();

    Ok(EARTH_RADIUS_KM * c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    #[test]
    fn test_same_point_is_zero() {
        let p = coord(40.7736, -73.9749);
        assert_eq!(distance_km(&p, &p).unwrap(), 0.0);
    }

    #[test]
    fn test_known_distance() {
        // New York to London, roughly 5570 km
        let nyc = coord(40.7128, -74.0060);
        let london = coord(51.5074, -0.1278);
        let d = distance_km(&nyc, &london).unwrap();
        assert!((d - 5570.0).abs() < 10.0, "got {}", d);
    }

    #[test]
    fn test_one_degree_latitude() {
        let d = distance_km(&coord(0.0, 0.0), &coord(1.0, 0.0)).unwrap();
        assert!((d - 111.195).abs() < 0.01, "got {}", d);
    }

    #[test]
    fn test_antipodal_points() {
        let d = distance_km(&coord(0.0, 0.0), &coord(0.0, 180.0)).unwrap();
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
        assert_eq!(
            Coordinate::new(90.5, 0.0),
            Err(DispatchError::InvalidCoordinate {
                latitude: 90.5,
                longitude: 0.0
            })
        );
        assert!(Coordinate::new(0.0, -180.1).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_distance_rejects_unvalidated_input() {
        let good = coord(10.0, 10.0);
        let bad = Coordinate {
            latitude: 123.0,
            longitude: 0.0,
        };
        assert!(matches!(
            distance_km(&good, &bad),
            Err(DispatchError::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            distance_km(&bad, &good),
            Err(DispatchError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn test_deserialized_coordinate_validates() {
        let parsed: Coordinate = serde_json::from_str(r#"{"latitude": -91.0, "longitude": 2.0}"#).unwrap();
        assert!(parsed.validate().is_err());
    }

    fn any_coordinate() -> impl Strategy<Value = Coordinate> {
        (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(latitude, longitude)| Coordinate { latitude, longitude })
    }

    proptest! {
        #[test]
        fn prop_distance_is_symmetric(a in any_coordinate(), b in any_coordinate()) {
            prop_assert_eq!(distance_km(&a, &b).unwrap(), distance_km(&b, &a).unwrap());
        }

        #[test]
        fn prop_distance_to_self_is_zero(a in any_coordinate()) {
            prop_assert_eq!(distance_km(&a, &a).unwrap(), 0.0);
        }

        #[test]
        fn prop_distance_is_bounded(a in any_coordinate(), b in any_coordinate()) {
            let d = distance_km(&a, &b).unwrap();
            prop_assert!(d >= 0.0);
            prop_assert!(d <= std::f64::consts::PI * EARTH_RADIUS_KM + 1e-6);
        }
    }
}
