use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// One GPS fix worth of flight state.
///
/// The task engine only ever compares two consecutive snapshots and never
/// keeps them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AircraftState {
    pub location: GeoPoint,
    /// Altitude above mean sea level, m.
    pub altitude: f64,
    /// Ground speed, m/s.
    pub ground_speed: f64,
    /// Seconds of day (UTC).
    pub time: f64,
}

/// A named turn point with its terrain elevation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: String,
    pub location: GeoPoint,
    /// Elevation above mean sea level, m.
    #[serde(default)]
    pub elevation: f64,
}

impl Waypoint {
    pub fn new(name: impl Into<String>, location: GeoPoint, elevation: f64) -> Self {
        Self {
            name: name.into(),
            location,
            elevation,
        }
    }
}
