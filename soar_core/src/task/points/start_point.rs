use crate::geo::{double_distance, GeoPoint};
use crate::task::aircraft::{AircraftState, Waypoint};
use crate::task::behaviour::{OrderedTaskSettings, TaskBehaviour};
use crate::task::constraints::{StartConstraints, StartMargins};
use crate::task::zone::ObservationZone;

use super::TaskPointBase;

/// Progress of the start point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartState {
    NotStarted,
    /// `time` is the time of the first sample outside the start zone.
    Started { time: f64 },
}

/// The first point of an ordered task, together with the start gate rules.
///
/// A start point never has a predecessor. The only way to change its state
/// from [`StartState::NotStarted`] to [`StartState::Started`] is a sample pair
/// accepted by [`StartPoint::check_exit_transition`].
#[derive(Debug, Clone, PartialEq)]
pub struct StartPoint {
    base: TaskPointBase,
    safety_height: f64,
    margins: StartMargins,
    start_through_top: bool,
    constraints: StartConstraints,
    search_min: Option<GeoPoint>,
    state: StartState,
}

impl StartPoint {
    pub fn new(
        shape: ObservationZone,
        waypoint: Waypoint,
        behaviour: &TaskBehaviour,
        constraints: StartConstraints,
    ) -> Self {
        Self {
            base: TaskPointBase::new(shape, waypoint),
            safety_height: behaviour.safety_height_arrival,
            margins: behaviour.start_margins,
            start_through_top: behaviour.can_start_through_top(),
            constraints,
            search_min: None,
            state: StartState::NotStarted,
        }
    }

    pub fn base(&self) -> &TaskPointBase {
        &self.base
    }

    pub fn constraints(&self) -> &StartConstraints {
        &self.constraints
    }

    pub fn set_task_behaviour(&mut self, behaviour: &TaskBehaviour) {
        self.safety_height = behaviour.safety_height_arrival;
        self.margins = behaviour.start_margins;
        self.start_through_top = behaviour.can_start_through_top();
    }

    pub fn set_ordered_task_settings(&mut self, settings: &OrderedTaskSettings) {
        self.constraints = settings.start_constraints;
    }

    /// Orients the start zone along the first leg.
    pub fn set_neighbours(&mut self, previous: Option<&GeoPoint>, next: Option<&GeoPoint>) {
        debug_assert!(previous.is_none(), "start point must not have an inbound leg");
        self.base.set_legs(None, next);
    }

    /// Elevation the glider should arrive at when returning to the start.
    pub fn elevation(&self) -> f64 {
        self.base.base_elevation() + self.safety_height
    }

    /// Inside the zone and below the start height limit.
    pub fn is_in_sector(&self, state: &AircraftState) -> bool {
        self.base.is_in_sector(state) && self.check_height(state)
    }

    fn check_height(&self, state: &AircraftState) -> bool {
        self.constraints
            .check_height(state, self.base.base_elevation(), Some(&self.margins))
    }

    /// Decides whether the pair `last -> now` is a valid start.
    ///
    /// This is a pure predicate; callers pass samples in chronological order.
    pub fn check_exit_transition(&self, now: &AircraftState, last: &AircraftState) -> bool {
        let span = &self.constraints.open_time_span;

        if !span.has_begun(last.time) {
            // the gate was not yet open when we left the zone
            return false;
        }

        if span.has_ended(now.time) {
            // the gate had already closed
            return false;
        }

        if !self.constraints.check_pev(now.time) {
            return false;
        }

        if !self.constraints.check_speed(now.ground_speed, Some(&self.margins))
            || !self.constraints.check_speed(last.ground_speed, Some(&self.margins))
        {
            return false;
        }

        let now_in_height = self.check_height(now);
        let last_in_height = self.check_height(last);

        let zone = self.base.zone();
        if now_in_height && last_in_height {
            return zone.check_exit_transition(&now.location, &last.location);
        }

        // vertical crossings never count for a line
        if zone.is_line() || !zone.transition_constraint(&now.location, &last.location) {
            return false;
        }

        // climbed out through the top of the zone
        !now_in_height
            && last_in_height
            && zone.is_in_sector(&last.location)
            && zone.can_start_through_top()
            && self.start_through_top
    }

    /// Picks the boundary point giving the shortest path from the aircraft
    /// via the start to `next`. The first of several equal points wins.
    pub fn find_best_start(&mut self, state: &AircraftState, next: &GeoPoint) -> GeoPoint {
        let boundary = self.base.zone().boundary();

        let mut best_location = boundary.first().copied().unwrap_or(*self.base.location());
        let mut best_distance = double_distance(&state.location, &best_location, next);

        for location in boundary.iter().skip(1) {
            let distance = double_distance(&state.location, location, next);
            if distance < best_distance {
                best_location = *location;
                best_distance = distance;
            }
        }

        self.search_min = Some(best_location);
        best_location
    }

    /// Result of the last [`StartPoint::find_best_start`].
    pub fn search_min(&self) -> Option<&GeoPoint> {
        self.search_min.as_ref()
    }

    pub fn state(&self) -> StartState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        matches!(self.state, StartState::Started { .. })
    }

    /// Feeds one sample pair into the state machine. Returns `true` only on
    /// the call that performs the start.
    pub fn update(&mut self, now: &AircraftState, last: &AircraftState) -> bool {
        if self.is_started() {
            return false;
        }
        if !self.check_exit_transition(now, last) {
            return false;
        }

        log::info!(
            "[start_point] start at {} through {} (alt={:.0}m, gs={:.1}m/s)",
            now.time,
            self.base.waypoint().name,
            now.altitude,
            now.ground_speed
        );
        self.state = StartState::Started { time: now.time };
        true
    }

    /// Back to [`StartState::NotStarted`], e.g. when the task is restarted.
    pub fn reset(&mut self) {
        self.state = StartState::NotStarted;
        self.search_min = None;
    }
}
