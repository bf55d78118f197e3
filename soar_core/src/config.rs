//! On-disk formats: task definitions, recorded fix tracks and transport
//! settings. Everything is JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::{
    AircraftState, FinishPoint, IntermediatePoint, ObservationZone, OrderedTask, OrderedTaskPoint,
    OrderedTaskSettings, StartPoint, TaskBehaviour, TaskError, Waypoint,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Task(#[from] TaskError),
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub user_agent: String,
    /// No connect timeout when unset.
    pub connect_timeout_secs: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_secs: None,
        }
    }
}

fn default_user_agent() -> String {
    format!("soar/{}", env!("CARGO_PKG_VERSION"))
}

pub const SKYSIGHT_BASE_URL: &str = "https://skysight.io/api";

/// SkySight account and endpoint.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SkysightConfig {
    pub username: String,
    pub password: String,
    #[serde(default = "default_skysight_url")]
    pub base_url: String,
    /// Sent as `X-API-Key` while no credential key is valid.
    #[serde(default = "default_app_key")]
    pub app_key: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl SkysightConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            base_url: default_skysight_url(),
            app_key: default_app_key(),
            user_agent: default_user_agent(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// `base_url`, or `base_url/part` when `part` is non-empty.
    pub fn url(&self, part: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if part.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, part.trim_start_matches('/'))
        }
    }

    pub fn auth_url(&self) -> String {
        self.url("auth")
    }
}

impl std::fmt::Debug for SkysightConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkysightConfig")
            .field("username", &self.username)
            .field("base_url", &self.base_url)
            .field("app_key", &self.app_key)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

fn default_skysight_url() -> String {
    SKYSIGHT_BASE_URL.to_string()
}

fn default_app_key() -> String {
    "OpenSoar".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPointKind {
    Start,
    Turn,
    Finish,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPointConfig {
    pub kind: TaskPointKind,
    pub waypoint: Waypoint,
    pub zone: ObservationZone,
}

/// A task as stored on disk.
///
/// ```json
/// {
///   "behaviour": { "start_through_top": true },
///   "settings": { "start_constraints": { "max_height": 1500 } },
///   "points": [
///     { "kind": "start",
///       "waypoint": { "name": "Home", "location": { "latitude": 46.1, "longitude": 8.2 } },
///       "zone": { "type": "line", "length": 2000 } },
///     ...
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFile {
    #[serde(default)]
    pub behaviour: TaskBehaviour,
    #[serde(default)]
    pub settings: OrderedTaskSettings,
    pub points: Vec<TaskPointConfig>,
}

impl TaskFile {
    pub fn build(&self) -> Result<OrderedTask, TaskError> {
        let points = self
            .points
            .iter()
            .map(|p| match p.kind {
                TaskPointKind::Start => OrderedTaskPoint::Start(StartPoint::new(
                    p.zone,
                    p.waypoint.clone(),
                    &self.behaviour,
                    self.settings.start_constraints,
                )),
                TaskPointKind::Turn => {
                    OrderedTaskPoint::Intermediate(IntermediatePoint::new(p.zone, p.waypoint.clone()))
                }
                TaskPointKind::Finish => OrderedTaskPoint::Finish(FinishPoint::new(
                    p.zone,
                    p.waypoint.clone(),
                    self.settings.finish_constraints,
                )),
            })
            .collect();

        OrderedTask::new(points, &self.behaviour, &self.settings)
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_task_file(path: &Path) -> Result<TaskFile, ConfigError> {
    let file: TaskFile = read_json(path)?;
    log::debug!("[config] loaded task with {} point(s) from {}", file.points.len(), path.display());
    Ok(file)
}

/// Loads a task file and builds the task from it.
pub fn load_task(path: &Path) -> Result<OrderedTask, ConfigError> {
    Ok(load_task_file(path)?.build()?)
}

/// A fix track: a JSON array of [`AircraftState`], oldest first.
pub fn load_track(path: &Path) -> Result<Vec<AircraftState>, ConfigError> {
    let track: Vec<AircraftState> = read_json(path)?;
    log::debug!("[config] loaded {} fix(es) from {}", track.len(), path.display());
    Ok(track)
}
