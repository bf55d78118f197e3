use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// What a queued request produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadKind {
    File,
    Json,
    Buffer,
}

/// A shared cell the transport fills in once a request succeeds.
///
/// The caller keeps one clone and hands the other to the queue; the value
/// becomes visible after `on_download_complete` fired for the request.
pub struct ResultSlot<T> {
    inner: Arc<Mutex<Option<T>>>,
}

impl<T> ResultSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set(&self, value: T) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    pub fn take(&self) -> Option<T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn is_filled(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<T: Clone> ResultSlot<T> {
    pub fn get(&self) -> Option<T> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T> Clone for ResultSlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for ResultSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ResultSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSlot")
            .field("filled", &self.is_filled())
            .finish()
    }
}

/// Where the response body ends up.
#[derive(Debug, Clone)]
pub enum Destination {
    File(PathBuf),
    Json(ResultSlot<Value>),
    Buffer(ResultSlot<Vec<u8>>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationInfo {
    pub username: String,
    pub password: String,
}

/// Optional request metadata handed through to the transport.
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    pub headers: HashMap<String, Vec<String>>,
    /// Raw request body; forces a POST.
    pub body: Option<String>,
    /// Multipart form fields; forces a POST.
    pub form: Vec<(String, String)>,
    pub authentication: Option<AuthenticationInfo>,
    /// Receives the SHA-256 of a downloaded file.
    pub sha256: Option<ResultSlot<[u8; 32]>>,
}

impl RequestData {
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(key.into()).or_default().push(value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_form_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((key.into(), value.into()));
        self
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.authentication = Some(AuthenticationInfo {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_sha256(mut self, slot: ResultSlot<[u8; 32]>) -> Self {
        self.sha256 = Some(slot);
        self
    }

    pub fn is_post(&self) -> bool {
        self.body.is_some() || !self.form.is_empty()
    }
}

/// One entry of the download queue.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub uri: String,
    /// Logical name used for notifications and [`cancel`](crate::downloader::DownloadManager::cancel).
    pub name: String,
    pub destination: Destination,
    pub data: RequestData,
}

impl DownloadRequest {
    /// A file download, named after the basename of `path`.
    pub fn file(
        uri: impl Into<String>,
        path: impl Into<PathBuf>,
        data: RequestData,
    ) -> Result<Self, DownloadError> {
        let path = path.into();
        let name = file_name_of(&path)?;
        Ok(Self {
            uri: uri.into(),
            name,
            destination: Destination::File(path),
            data,
        })
    }

    pub fn json(
        uri: impl Into<String>,
        name: impl Into<String>,
        slot: ResultSlot<Value>,
        data: RequestData,
    ) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            destination: Destination::Json(slot),
            data,
        }
    }

    pub fn buffer(
        uri: impl Into<String>,
        name: impl Into<String>,
        slot: ResultSlot<Vec<u8>>,
        data: RequestData,
    ) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            destination: Destination::Buffer(slot),
            data,
        }
    }

    pub fn kind(&self) -> DownloadKind {
        match self.destination {
            Destination::File(_) => DownloadKind::File,
            Destination::Json(_) => DownloadKind::Json,
            Destination::Buffer(_) => DownloadKind::Buffer,
        }
    }
}

fn file_name_of(path: &Path) -> Result<String, DownloadError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            DownloadError::InvalidRequest(format!("'{}' has no file name", path.display()))
        })
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("malformed JSON response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("download cancelled")]
    Cancelled,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport failure: {0}")]
    Transport(String),
}
