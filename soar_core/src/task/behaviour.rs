use serde::{Deserialize, Serialize};

use super::constraints::{FinishConstraints, StartConstraints, StartMargins};

/// Pilot preferences that influence how task points are evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskBehaviour {
    /// Height reserve added to the start elevation, m.
    pub safety_height_arrival: f64,
    pub start_margins: StartMargins,
    /// Accept a climb out through the ceiling of an area start zone as a start.
    pub start_through_top: bool,
}

impl TaskBehaviour {
    pub fn can_start_through_top(&self) -> bool {
        self.start_through_top
    }
}

/// Rules of the ordered task, edited by the task settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderedTaskSettings {
    pub start_constraints: StartConstraints,
    pub finish_constraints: FinishConstraints,
}
