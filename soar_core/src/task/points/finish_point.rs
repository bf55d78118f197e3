use crate::geo::GeoPoint;
use crate::task::aircraft::{AircraftState, Waypoint};
use crate::task::behaviour::OrderedTaskSettings;
use crate::task::constraints::FinishConstraints;
use crate::task::zone::ObservationZone;

use super::TaskPointBase;

/// The last point of an ordered task.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishPoint {
    base: TaskPointBase,
    constraints: FinishConstraints,
}

impl FinishPoint {
    pub fn new(shape: ObservationZone, waypoint: Waypoint, constraints: FinishConstraints) -> Self {
        Self {
            base: TaskPointBase::new(shape, waypoint),
            constraints,
        }
    }

    pub fn base(&self) -> &TaskPointBase {
        &self.base
    }

    pub fn constraints(&self) -> &FinishConstraints {
        &self.constraints
    }

    pub fn set_ordered_task_settings(&mut self, settings: &OrderedTaskSettings) {
        self.constraints = settings.finish_constraints;
    }

    /// A finish never has an outbound leg.
    pub fn set_neighbours(&mut self, previous: Option<&GeoPoint>, next: Option<&GeoPoint>) {
        debug_assert!(next.is_none(), "finish point must not have a successor");
        self.base.set_legs(previous, None);
    }

    pub fn is_in_sector(&self, state: &AircraftState) -> bool {
        self.base.is_in_sector(state)
            && self.constraints.check_height(state, self.base.base_elevation())
    }

    pub fn check_enter_transition(&self, now: &AircraftState, last: &AircraftState) -> bool {
        self.constraints.check_height(now, self.base.base_elevation())
            && self
                .base
                .zone()
                .check_enter_transition(&now.location, &last.location)
    }
}
