//! Great-circle distance and coarse bounding boxes for geofence checks.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by every distance computation in the crate.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters spanned by one degree of latitude on the mean sphere.
const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Keep the longitude span finite when the box center sits on a pole.
const MIN_COS_LATITUDE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns `None` unless both components are finite.
    #[must_use]
    pub fn checked(latitude: f64, longitude: f64) -> Option<Self> {
        (latitude.is_finite() && longitude.is_finite()).then(|| Self::new(latitude, longitude))
    }
}

/// Haversine distance in meters between two points.
#[must_use]
pub fn haversine_distance_m(a: Coordinates, b: Coordinates) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push `h` a hair past 1.0 for antipodal points.
    let c = 2.0 * h.clamp(0.0, 1.0).sqrt().asin();
    EARTH_RADIUS_M * c
}

/// Coarse lat/lng rectangle used by memory stores to answer "near" queries.
///
/// The box always contains the full circle of `radius_m` around its center;
/// exact filtering happens afterwards in the geofence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    #[must_use]
    pub fn around(center: Coordinates, radius_m: f64) -> Self {
        let radius_m = radius_m.max(0.0);
        let lat_span = radius_m / METERS_PER_DEGREE;
        let cos_lat = center.latitude.to_radians().cos().abs().max(MIN_COS_LATITUDE);
        let lng_span = (radius_m / (METERS_PER_DEGREE * cos_lat)).min(180.0);
        Self {
            min_latitude: (center.latitude - lat_span).max(-90.0),
            max_latitude: (center.latitude + lat_span).min(90.0),
            min_longitude: center.longitude - lng_span,
            max_longitude: center.longitude + lng_span,
        }
    }

    #[must_use]
    pub fn contains(&self, point: Coordinates) -> bool {
        if point.latitude < self.min_latitude || point.latitude > self.max_latitude {
            return false;
        }
        if self.max_longitude - self.min_longitude >= 360.0 {
            return true;
        }
        // Shift the point into the box's longitude window so boxes that cross
        // the antimeridian still match.
        let lng = self.min_longitude + (point.longitude - self.min_longitude).rem_euclid(360.0);
        lng <= self.max_longitude
    }
}
