use serde::{Deserialize, Serialize};

use crate::geo::{bearing, bearing_difference, destination, distance, is_bearing_within, normalize_bearing, GeoPoint};

/// Number of points used to approximate a full circle boundary.
const CIRCLE_STEPS: usize = 40;

/// Number of segments used to approximate a sector arc.
const ARC_STEPS: usize = 20;

/// Number of segments a line boundary is split into.
const LINE_STEPS: usize = 10;

/// Shape of an observation zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObservationZone {
    /// Circle around the waypoint.
    Cylinder { radius: f64 },
    /// Sector between two fixed radials, measured clockwise.
    Sector {
        radius: f64,
        start_radial: f64,
        end_radial: f64,
    },
    /// Sector of `angle` degrees centred on the zone direction (FAI sector).
    SymmetricSector { radius: f64, angle: f64 },
    /// Start or finish line of `length` metres, perpendicular to the leg.
    Line { length: f64 },
}

impl ObservationZone {
    pub fn is_line(&self) -> bool {
        matches!(self, ObservationZone::Line { .. })
    }

    /// Whether leaving the zone through its ceiling can count as a start.
    pub fn can_start_through_top(&self) -> bool {
        !self.is_line()
    }
}

/// An observation zone anchored at a waypoint and oriented along the task legs.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneGeometry {
    shape: ObservationZone,
    center: GeoPoint,
    /// Bearing from the center into the zone half-plane (lines) or along the
    /// sector bisector (symmetric sectors).
    direction: f64,
}

impl ZoneGeometry {
    pub fn new(shape: ObservationZone, center: GeoPoint) -> Self {
        Self {
            shape,
            center,
            direction: 0.0,
        }
    }

    pub fn shape(&self) -> &ObservationZone {
        &self.shape
    }

    pub fn center(&self) -> &GeoPoint {
        &self.center
    }

    pub fn direction(&self) -> f64 {
        self.direction
    }

    pub fn is_line(&self) -> bool {
        self.shape.is_line()
    }

    pub fn can_start_through_top(&self) -> bool {
        self.shape.can_start_through_top()
    }

    /// Orients the zone from the neighbouring task points.
    ///
    /// A start zone faces away from the first leg, a finish zone faces away
    /// from the last leg, and a turnpoint zone faces outward on the bisector
    /// of its two legs.
    pub fn set_legs(&mut self, previous: Option<&GeoPoint>, next: Option<&GeoPoint>) {
        self.direction = match (previous, next) {
            (None, Some(next)) => normalize_bearing(bearing(&self.center, next) + 180.0),
            (Some(previous), None) => normalize_bearing(bearing(&self.center, previous) + 180.0),
            (Some(previous), Some(next)) => {
                let to_previous = bearing(&self.center, previous);
                let to_next = bearing(&self.center, next);
                let diff = normalize_bearing(to_next - to_previous);
                let half = if diff <= 180.0 { diff / 2.0 } else { (diff - 360.0) / 2.0 };
                normalize_bearing(to_previous + half + 180.0)
            }
            (None, None) => self.direction,
        };
    }

    pub fn is_in_sector(&self, location: &GeoPoint) -> bool {
        let d = distance(&self.center, location);
        match self.shape {
            ObservationZone::Cylinder { radius } => d <= radius,
            ObservationZone::Sector {
                radius,
                start_radial,
                end_radial,
            } => {
                d <= radius
                    && (d == 0.0
                        || is_bearing_within(bearing(&self.center, location), start_radial, end_radial))
            }
            ObservationZone::SymmetricSector { radius, angle } => {
                d <= radius
                    && (d == 0.0
                        || bearing_difference(bearing(&self.center, location), self.direction)
                            <= angle / 2.0)
            }
            ObservationZone::Line { length } => {
                d <= length / 2.0
                    && (d == 0.0
                        || bearing_difference(bearing(&self.center, location), self.direction) <= 90.0)
            }
        }
    }

    /// Additional geometric condition a crossing must satisfy. Area zones
    /// accept any crossing; a line only counts when both samples are within
    /// half its length of the center.
    pub fn transition_constraint(&self, now: &GeoPoint, last: &GeoPoint) -> bool {
        match self.shape {
            ObservationZone::Line { length } => {
                distance(&self.center, now) <= length / 2.0
                    && distance(&self.center, last) <= length / 2.0
            }
            _ => true,
        }
    }

    /// `last` inside, `now` outside and the crossing is admissible.
    pub fn check_exit_transition(&self, now: &GeoPoint, last: &GeoPoint) -> bool {
        self.is_in_sector(last) && !self.is_in_sector(now) && self.transition_constraint(now, last)
    }

    /// `last` outside, `now` inside and the crossing is admissible.
    pub fn check_enter_transition(&self, now: &GeoPoint, last: &GeoPoint) -> bool {
        !self.is_in_sector(last) && self.is_in_sector(now) && self.transition_constraint(now, last)
    }

    /// Enumerates points along the zone boundary. Never empty.
    pub fn boundary(&self) -> Vec<GeoPoint> {
        match self.shape {
            ObservationZone::Cylinder { radius } => (0..CIRCLE_STEPS)
                .map(|i| destination(&self.center, i as f64 * 360.0 / CIRCLE_STEPS as f64, radius))
                .collect(),
            ObservationZone::Sector {
                radius,
                start_radial,
                end_radial,
            } => self.arc_boundary(radius, start_radial, end_radial),
            ObservationZone::SymmetricSector { radius, angle } => self.arc_boundary(
                radius,
                normalize_bearing(self.direction - angle / 2.0),
                normalize_bearing(self.direction + angle / 2.0),
            ),
            ObservationZone::Line { length } => {
                let half = length / 2.0;
                let left = normalize_bearing(self.direction - 90.0);
                let right = normalize_bearing(self.direction + 90.0);
                (0..=LINE_STEPS)
                    .map(|i| {
                        let offset = -half + length * i as f64 / LINE_STEPS as f64;
                        if offset < 0.0 {
                            destination(&self.center, left, -offset)
                        } else {
                            destination(&self.center, right, offset)
                        }
                    })
                    .collect()
            }
        }
    }

    fn arc_boundary(&self, radius: f64, start: f64, end: f64) -> Vec<GeoPoint> {
        let mut span = normalize_bearing(end - start);
        if span == 0.0 {
            span = 360.0;
        }

        let mut points = Vec::with_capacity(ARC_STEPS + 2);
        points.push(self.center);
        for i in 0..=ARC_STEPS {
            let b = start + span * i as f64 / ARC_STEPS as f64;
            points.push(destination(&self.center, normalize_bearing(b), radius));
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn center() -> GeoPoint {
        GeoPoint::new(46.0, 8.0)
    }

    #[test]
    fn test_cylinder_containment() {
        let zone = ZoneGeometry::new(ObservationZone::Cylinder { radius: 1_000.0 }, center());
        assert!(zone.is_in_sector(&center()));
        assert!(zone.is_in_sector(&destination(&center(), 45.0, 999.0)));
        assert!(!zone.is_in_sector(&destination(&center(), 45.0, 1_001.0)));
    }

    #[test]
    fn test_sector_respects_radials() {
        let zone = ZoneGeometry::new(
            ObservationZone::Sector {
                radius: 5_000.0,
                start_radial: 90.0,
                end_radial: 180.0,
            },
            center(),
        );
        assert!(zone.is_in_sector(&destination(&center(), 135.0, 2_000.0)));
        assert!(!zone.is_in_sector(&destination(&center(), 45.0, 2_000.0)));
        assert!(!zone.is_in_sector(&destination(&center(), 135.0, 6_000.0)));
    }

    #[test]
    fn test_start_line_faces_away_from_first_leg() {
        let mut zone = ZoneGeometry::new(ObservationZone::Line { length: 2_000.0 }, center());
        let next = destination(&center(), 0.0, 20_000.0);
        zone.set_legs(None, Some(&next));
        assert!((zone.direction() - 180.0).abs() < 1e-6);

        // behind the line (south) is inside, beyond it (north) is outside
        assert!(zone.is_in_sector(&destination(&center(), 180.0, 300.0)));
        assert!(!zone.is_in_sector(&destination(&center(), 0.0, 300.0)));
    }

    #[test]
    fn test_line_transition_constraint_requires_both_near_center() {
        let mut zone = ZoneGeometry::new(ObservationZone::Line { length: 2_000.0 }, center());
        zone.set_legs(None, Some(&destination(&center(), 0.0, 20_000.0)));

        let last = destination(&center(), 180.0, 200.0);
        let now = destination(&center(), 0.0, 200.0);
        assert!(zone.check_exit_transition(&now, &last));

        // crossing the extension of the line, far to the side
        let far_last = destination(&destination(&center(), 90.0, 3_000.0), 180.0, 200.0);
        let far_now = destination(&destination(&center(), 90.0, 3_000.0), 0.0, 200.0);
        assert!(!zone.transition_constraint(&far_now, &far_last));
        assert!(!zone.check_exit_transition(&far_now, &far_last));
    }

    #[test]
    fn test_turnpoint_bisector_points_outward() {
        let mut zone = ZoneGeometry::new(ObservationZone::SymmetricSector { radius: 10_000.0, angle: 90.0 }, center());
        // previous leg comes from the west, next leg goes to the north
        let previous = destination(&center(), 270.0, 30_000.0);
        let next = destination(&center(), 0.0, 30_000.0);
        zone.set_legs(Some(&previous), Some(&next));
        assert!((zone.direction() - 135.0).abs() < 0.1, "got {}", zone.direction());
    }

    #[test]
    fn test_boundary_shapes() {
        let cylinder = ZoneGeometry::new(ObservationZone::Cylinder { radius: 500.0 }, center());
        let points = cylinder.boundary();
        assert_eq!(points.len(), CIRCLE_STEPS);
        for p in &points {
            assert!((distance(&center(), p) - 500.0).abs() < 0.01);
        }

        let line = ZoneGeometry::new(ObservationZone::Line { length: 1_000.0 }, center());
        let points = line.boundary();
        assert_eq!(points.len(), LINE_STEPS + 1);
        assert!((distance(&points[0], &points[LINE_STEPS]) - 1_000.0).abs() < 0.1);

        let sector = ZoneGeometry::new(
            ObservationZone::Sector {
                radius: 1_000.0,
                start_radial: 0.0,
                end_radial: 90.0,
            },
            center(),
        );
        let points = sector.boundary();
        assert_eq!(points[0], center());
        assert_eq!(points.len(), ARC_STEPS + 2);
    }
}
