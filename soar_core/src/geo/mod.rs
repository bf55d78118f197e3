//! Spherical-earth geodesy used by the task engine.
//!
//! All angles are in degrees, all distances in metres. The earth is modelled
//! as a sphere, which is accurate to well below a metre over the size of a
//! start sector.

use serde::{Deserialize, Serialize};

/// Mean earth radius in metres.
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// A location on the earth surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn distance(&self, other: &GeoPoint) -> f64 {
        distance(self, other)
    }

    pub fn bearing(&self, other: &GeoPoint) -> f64 {
        bearing(self, other)
    }
}

/// Great-circle distance between two points (haversine).
pub fn distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS * h.sqrt().min(1.0).asin()
}

/// Initial bearing from `a` towards `b`, normalized to `[0, 360)`.
pub fn bearing(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    normalize_bearing(y.atan2(x).to_degrees())
}

/// Point reached by travelling `distance` metres from `origin` along the
/// initial `bearing`.
pub fn destination(origin: &GeoPoint, bearing: f64, distance: f64) -> GeoPoint {
    let delta = distance / EARTH_RADIUS;
    let theta = bearing.to_radians();
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    GeoPoint {
        latitude: lat2.to_degrees(),
        longitude: normalize_longitude(lon2.to_degrees()),
    }
}

/// Length of the path `a -> b -> c`.
pub fn double_distance(a: &GeoPoint, b: &GeoPoint, c: &GeoPoint) -> f64 {
    distance(a, b) + distance(b, c)
}

/// Normalize any angle to `[0, 360)`.
pub fn normalize_bearing(degrees: f64) -> f64 {
    let d = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if d >= 360.0 {
        0.0
    } else {
        d
    }
}

fn normalize_longitude(degrees: f64) -> f64 {
    let d = normalize_bearing(degrees + 180.0) - 180.0;
    if d == -180.0 {
        180.0
    } else {
        d
    }
}

/// Absolute angular difference between two bearings, in `[0, 180]`.
pub fn bearing_difference(a: f64, b: f64) -> f64 {
    let d = normalize_bearing(a - b);
    if d > 180.0 {
        360.0 - d
    } else {
        d
    }
}

/// Whether `b` lies on the clockwise arc from `start` to `end`.
pub fn is_bearing_within(b: f64, start: f64, end: f64) -> bool {
    let span = normalize_bearing(end - start);
    let offset = normalize_bearing(b - start);
    if span == 0.0 {
        // start == end describes a full circle
        return true;
    }
    offset <= span
}
