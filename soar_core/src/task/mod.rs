//! Ordered task engine: observation zones, start gate rules and the task
//! point state machine.

pub mod aircraft;
pub mod behaviour;
pub mod constraints;
pub mod ordered_task;
pub mod points;
pub mod zone;

pub use aircraft::{AircraftState, Waypoint};
pub use behaviour::{OrderedTaskSettings, TaskBehaviour};
pub use constraints::{AltitudeReference, FinishConstraints, StartConstraints, StartMargins, TimeSpan};
pub use ordered_task::{OrderedTask, TaskEvent};
pub use points::{FinishPoint, IntermediatePoint, OrderedTaskPoint, StartPoint, StartState, TaskPointBase};
pub use zone::{ObservationZone, ZoneGeometry};

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TaskError {
    #[error("time span begins at {begin} but ends at {end}")]
    InvalidTimeSpan { begin: f64, end: f64 },

    #[error("invalid task shape: {0}")]
    InvalidShape(String),
}
