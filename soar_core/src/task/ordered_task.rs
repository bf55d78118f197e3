use crate::geo::GeoPoint;

use super::aircraft::AircraftState;
use super::behaviour::{OrderedTaskSettings, TaskBehaviour};
use super::points::{OrderedTaskPoint, StartPoint};
use super::TaskError;

/// What happened while feeding a sample pair into the task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskEvent {
    None,
    Started { time: f64 },
    TurnpointAchieved { index: usize },
    Finished { time: f64 },
}

/// A start, any number of turn points, and a finish.
#[derive(Debug, Clone)]
pub struct OrderedTask {
    points: Vec<OrderedTaskPoint>,
    active: usize,
    finished: bool,
}

impl OrderedTask {
    pub fn new(
        mut points: Vec<OrderedTaskPoint>,
        behaviour: &TaskBehaviour,
        settings: &OrderedTaskSettings,
    ) -> Result<Self, TaskError> {
        validate_shape(&points)?;

        for point in points.iter_mut() {
            point.set_task_behaviour(behaviour);
            point.set_ordered_task_settings(settings);
        }

        let locations: Vec<GeoPoint> = points.iter().map(|p| *p.location()).collect();
        for (i, point) in points.iter_mut().enumerate() {
            let previous = i.checked_sub(1).map(|j| &locations[j]);
            let next = locations.get(i + 1);
            point.set_neighbours(previous, next);
        }

        Ok(Self {
            points,
            active: 0,
            finished: false,
        })
    }

    pub fn points(&self) -> &[OrderedTaskPoint] {
        &self.points
    }

    pub fn start(&self) -> Option<&StartPoint> {
        match self.points.first() {
            Some(OrderedTaskPoint::Start(p)) => Some(p),
            _ => None,
        }
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn is_started(&self) -> bool {
        self.start().is_some_and(StartPoint::is_started)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn set_task_behaviour(&mut self, behaviour: &TaskBehaviour) {
        for point in self.points.iter_mut() {
            point.set_task_behaviour(behaviour);
        }
    }

    pub fn set_ordered_task_settings(&mut self, settings: &OrderedTaskSettings) {
        for point in self.points.iter_mut() {
            point.set_ordered_task_settings(settings);
        }
    }

    /// Advances the task with one sample pair.
    pub fn update(&mut self, now: &AircraftState, last: &AircraftState) -> TaskEvent {
        if self.finished {
            return TaskEvent::None;
        }

        let index = self.active;
        let Some(point) = self.points.get_mut(index) else {
            return TaskEvent::None;
        };

        match point {
            OrderedTaskPoint::Start(start) => {
                if start.update(now, last) {
                    self.active = 1;
                    return TaskEvent::Started { time: now.time };
                }
            }
            OrderedTaskPoint::Intermediate(turn) => {
                if turn.check_enter_transition(now, last) {
                    log::info!("[ordered_task] turn point {} achieved at {}", index, now.time);
                    self.active += 1;
                    return TaskEvent::TurnpointAchieved { index };
                }
            }
            OrderedTaskPoint::Finish(finish) => {
                if finish.check_enter_transition(now, last) {
                    log::info!("[ordered_task] finished at {}", now.time);
                    self.finished = true;
                    return TaskEvent::Finished { time: now.time };
                }
            }
        }

        TaskEvent::None
    }

    /// Discards all progress.
    pub fn reset(&mut self) {
        if let Some(OrderedTaskPoint::Start(start)) = self.points.first_mut() {
            start.reset();
        }
        self.active = 0;
        self.finished = false;
    }
}

fn validate_shape(points: &[OrderedTaskPoint]) -> Result<(), TaskError> {
    if points.len() < 2 {
        return Err(TaskError::InvalidShape(format!(
            "a task needs at least a start and a finish, got {} point(s)",
            points.len()
        )));
    }

    let last = points.len() - 1;
    for (i, point) in points.iter().enumerate() {
        let ok = match point {
            OrderedTaskPoint::Start(_) => i == 0,
            OrderedTaskPoint::Finish(_) => i == last,
            OrderedTaskPoint::Intermediate(_) => i != 0 && i != last,
        };
        if !ok {
            return Err(TaskError::InvalidShape(format!(
                "unexpected task point '{}' at position {}",
                point.waypoint().name,
                i
            )));
        }
    }

    Ok(())
}
