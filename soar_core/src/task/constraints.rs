use serde::{Deserialize, Serialize};

use super::aircraft::AircraftState;
use super::TaskError;

/// Time window in seconds of day (UTC). An undefined bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTimeSpan")]
pub struct TimeSpan {
    begin: Option<f64>,
    end: Option<f64>,
}

impl TimeSpan {
    pub fn new(begin: Option<f64>, end: Option<f64>) -> Result<Self, TaskError> {
        if let (Some(b), Some(e)) = (begin, end) {
            if b > e {
                return Err(TaskError::InvalidTimeSpan { begin: b, end: e });
            }
        }
        Ok(Self { begin, end })
    }

    /// A span without any bound; always open.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Option<f64> {
        self.begin
    }

    pub fn end(&self) -> Option<f64> {
        self.end
    }

    pub fn has_begun(&self, time: f64) -> bool {
        self.begin.map_or(true, |begin| time >= begin)
    }

    pub fn has_ended(&self, time: f64) -> bool {
        self.end.is_some_and(|end| time >= end)
    }
}

#[derive(Deserialize)]
struct RawTimeSpan {
    #[serde(default)]
    begin: Option<f64>,
    #[serde(default)]
    end: Option<f64>,
}

impl TryFrom<RawTimeSpan> for TimeSpan {
    type Error = TaskError;

    fn try_from(raw: RawTimeSpan) -> Result<Self, Self::Error> {
        TimeSpan::new(raw.begin, raw.end)
    }
}

/// Reference surface for a height limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AltitudeReference {
    /// Above mean sea level.
    #[default]
    Msl,
    /// Above the start point elevation.
    Agl,
}

/// Tolerances applied on top of the published limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StartMargins {
    /// m/s
    pub max_speed_margin: f64,
    /// m
    pub max_height_margin: f64,
}

/// Competition rules gating a valid start.
///
/// Zero limits mean "unlimited". PEV bounds are expressed in the same time
/// base as [`AircraftState::time`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartConstraints {
    pub open_time_span: TimeSpan,
    /// Minimum ground speed, m/s.
    pub min_speed: f64,
    /// Maximum ground speed, m/s.
    pub max_speed: f64,
    /// Maximum height, m.
    pub max_height: f64,
    pub max_height_ref: AltitudeReference,
    /// Pilot event: the start opens at this time.
    pub pev_open: Option<f64>,
    /// Pilot event: the start closes at this time.
    pub pev_closed: Option<f64>,
}

impl StartConstraints {
    pub fn check_speed(&self, ground_speed: f64, margins: Option<&StartMargins>) -> bool {
        if ground_speed < self.min_speed {
            return false;
        }
        if self.max_speed <= 0.0 {
            return true;
        }
        let margin = margins.map_or(0.0, |m| m.max_speed_margin);
        ground_speed <= self.max_speed + margin
    }

    pub fn check_height(
        &self,
        state: &AircraftState,
        base_elevation: f64,
        margins: Option<&StartMargins>,
    ) -> bool {
        if self.max_height <= 0.0 {
            return true;
        }
        let margin = margins.map_or(0.0, |m| m.max_height_margin);
        let height = match self.max_height_ref {
            AltitudeReference::Msl => state.altitude,
            AltitudeReference::Agl => state.altitude - base_elevation,
        };
        height <= self.max_height + margin
    }

    /// Whether the pilot event window admits `time`.
    pub fn check_pev(&self, time: f64) -> bool {
        if self.pev_open.is_some_and(|open| open > time) {
            return false;
        }
        if self.pev_closed.is_some_and(|closed| closed < time) {
            return false;
        }
        true
    }
}

/// Competition rules gating a valid finish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinishConstraints {
    /// Minimum height, m; zero disables the check.
    pub min_height: f64,
    pub min_height_ref: AltitudeReference,
}

impl FinishConstraints {
    pub fn check_height(&self, state: &AircraftState, base_elevation: f64) -> bool {
        if self.min_height <= 0.0 {
            return true;
        }
        let height = match self.min_height_ref {
            AltitudeReference::Msl => state.altitude,
            AltitudeReference::Agl => state.altitude - base_elevation,
        };
        height >= self.min_height
    }
}
