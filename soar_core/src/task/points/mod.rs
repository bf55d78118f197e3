mod finish_point;
mod intermediate_point;
mod start_point;

pub use finish_point::FinishPoint;
pub use intermediate_point::IntermediatePoint;
pub use start_point::{StartPoint, StartState};

use crate::geo::GeoPoint;

use super::aircraft::{AircraftState, Waypoint};
use super::behaviour::{OrderedTaskSettings, TaskBehaviour};
use super::zone::{ObservationZone, ZoneGeometry};

/// Waypoint and observation zone shared by every kind of task point.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskPointBase {
    waypoint: Waypoint,
    zone: ZoneGeometry,
}

impl TaskPointBase {
    pub fn new(shape: ObservationZone, waypoint: Waypoint) -> Self {
        let zone = ZoneGeometry::new(shape, waypoint.location);
        Self { waypoint, zone }
    }

    pub fn waypoint(&self) -> &Waypoint {
        &self.waypoint
    }

    pub fn zone(&self) -> &ZoneGeometry {
        &self.zone
    }

    pub fn location(&self) -> &GeoPoint {
        &self.waypoint.location
    }

    pub fn base_elevation(&self) -> f64 {
        self.waypoint.elevation
    }

    /// Pure geometric containment, without any height rule.
    pub fn is_in_sector(&self, state: &AircraftState) -> bool {
        self.zone.is_in_sector(&state.location)
    }

    pub(crate) fn set_legs(&mut self, previous: Option<&GeoPoint>, next: Option<&GeoPoint>) {
        self.zone.set_legs(previous, next);
    }
}

/// One point of an ordered task.
///
/// The set of task point kinds is closed, so this is an enum rather than a
/// trait object.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderedTaskPoint {
    Start(StartPoint),
    Intermediate(IntermediatePoint),
    Finish(FinishPoint),
}

impl OrderedTaskPoint {
    pub fn base(&self) -> &TaskPointBase {
        match self {
            OrderedTaskPoint::Start(p) => p.base(),
            OrderedTaskPoint::Intermediate(p) => p.base(),
            OrderedTaskPoint::Finish(p) => p.base(),
        }
    }

    pub fn waypoint(&self) -> &Waypoint {
        self.base().waypoint()
    }

    pub fn zone(&self) -> &ZoneGeometry {
        self.base().zone()
    }

    pub fn location(&self) -> &GeoPoint {
        self.base().location()
    }

    pub fn is_in_sector(&self, state: &AircraftState) -> bool {
        match self {
            OrderedTaskPoint::Start(p) => p.is_in_sector(state),
            OrderedTaskPoint::Intermediate(p) => p.base().is_in_sector(state),
            OrderedTaskPoint::Finish(p) => p.is_in_sector(state),
        }
    }

    pub fn set_neighbours(&mut self, previous: Option<&GeoPoint>, next: Option<&GeoPoint>) {
        match self {
            OrderedTaskPoint::Start(p) => p.set_neighbours(previous, next),
            OrderedTaskPoint::Intermediate(p) => p.set_neighbours(previous, next),
            OrderedTaskPoint::Finish(p) => p.set_neighbours(previous, next),
        }
    }

    pub fn set_task_behaviour(&mut self, behaviour: &TaskBehaviour) {
        if let OrderedTaskPoint::Start(p) = self {
            p.set_task_behaviour(behaviour);
        }
    }

    pub fn set_ordered_task_settings(&mut self, settings: &OrderedTaskSettings) {
        match self {
            OrderedTaskPoint::Start(p) => p.set_ordered_task_settings(settings),
            OrderedTaskPoint::Finish(p) => p.set_ordered_task_settings(settings),
            OrderedTaskPoint::Intermediate(_) => {}
        }
    }
}
