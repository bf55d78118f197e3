use crate::geo::GeoPoint;
use crate::task::aircraft::{AircraftState, Waypoint};
use crate::task::zone::ObservationZone;

use super::TaskPointBase;

/// A turn point between start and finish.
#[derive(Debug, Clone, PartialEq)]
pub struct IntermediatePoint {
    base: TaskPointBase,
}

impl IntermediatePoint {
    pub fn new(shape: ObservationZone, waypoint: Waypoint) -> Self {
        Self {
            base: TaskPointBase::new(shape, waypoint),
        }
    }

    pub fn base(&self) -> &TaskPointBase {
        &self.base
    }

    pub fn set_neighbours(&mut self, previous: Option<&GeoPoint>, next: Option<&GeoPoint>) {
        self.base.set_legs(previous, next);
    }

    pub fn check_enter_transition(&self, now: &AircraftState, last: &AircraftState) -> bool {
        self.base
            .zone()
            .check_enter_transition(&now.location, &last.location)
    }
}
