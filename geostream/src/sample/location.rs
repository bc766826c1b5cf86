//! Position samples and great-circle distance.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters, used for haversine distance.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A single position fix reported by the sample source.
///
/// Coordinates are WGS84 degrees. `horizontal_accuracy` is the radius of
/// the 68% confidence circle in meters; accuracy predicates compare
/// against it, so a smaller value means a better fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Latitude in degrees (positive north).
    pub latitude: f64,
    /// Longitude in degrees (positive east).
    pub longitude: f64,
    /// Altitude above mean sea level in meters, if known.
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters.
    pub horizontal_accuracy: f64,
    /// Vertical accuracy in meters, if known.
    pub vertical_accuracy: Option<f64>,
    /// Ground speed in meters per second, if known.
    pub speed: Option<f64>,
    /// Course over ground in degrees (0 = north, 90 = east), if known.
    pub course: Option<f64>,
    /// Wall-clock time of the fix.
    pub timestamp: SystemTime,
}

impl LocationSample {
    /// Creates a sample with the given coordinates and horizontal accuracy,
    /// timestamped now. Optional fields are unset.
    pub fn new(latitude: f64, longitude: f64, horizontal_accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            horizontal_accuracy,
            vertical_accuracy: None,
            speed: None,
            course: None,
            timestamp: SystemTime::now(),
        }
    }

    /// Great-circle distance to another sample in meters (haversine).
    pub fn distance_to(&self, other: &LocationSample) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }

    /// Bearing from this sample to another in degrees (0-360, 0 = north).
    pub fn bearing_to(&self, other: &LocationSample) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
        let bearing = y.atan2(x).to_degrees();

        if bearing < 0.0 {
            bearing + 360.0
        } else {
            bearing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(lat: f64, lon: f64) -> LocationSample {
        LocationSample::new(lat, lon, 10.0)
    }

    #[test]
    fn test_distance_zero_for_same_point() {
        let a = sample(53.5, 10.0);
        let b = sample(53.5, 10.0);
        assert!(a.distance_to(&b) < 0.001);
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        // One degree of latitude is ~111.2 km everywhere.
        let a = sample(53.0, 10.0);
        let b = sample(54.0, 10.0);
        let d = a.distance_to(&b);
        assert!((d - 111_195.0).abs() < 500.0, "got {d}");
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = sample(53.0, 10.0);
        let b = sample(53.2, 10.3);
        assert!((a.distance_to(&b) - b.distance_to(&a)).abs() < 0.001);
    }

    #[test]
    fn test_bearing_north_and_east() {
        let origin = sample(0.0, 0.0);
        assert!((origin.bearing_to(&sample(1.0, 0.0)) - 0.0).abs() < 0.1);
        assert!((origin.bearing_to(&sample(0.0, 1.0)) - 90.0).abs() < 0.1);
        assert!((origin.bearing_to(&sample(-1.0, 0.0)) - 180.0).abs() < 0.1);
        assert!((origin.bearing_to(&sample(0.0, -1.0)) - 270.0).abs() < 0.1);
    }

    #[test]
    fn test_serde_round_trip() {
        let a = sample(53.5, 10.0);
        let json = serde_json::to_string(&a).unwrap();
        let back: LocationSample = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }
}
