use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use super::credential::{Credential, CredentialReply, KeyRequest};
use crate::config::SkysightConfig;
use crate::downloader::DownloadManager;
use crate::progress::notifier::ListenerId;
use crate::progress::observer::DownloadListener;
use crate::types::types::{DownloadError, RequestData, ResultSlot};

/// Queue name of the credential request.
pub const AUTH_REQUEST: &str = "authent";

#[derive(Debug, Error)]
pub enum SkysightError {
    #[error("not logged in to SkySight")]
    NotLoggedIn,

    #[error(transparent)]
    Download(#[from] DownloadError),
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Receives the JSON documents the client fetched, routed by request name.
///
/// Each method returns whether the document was usable.
pub trait SkysightHandler: Send + Sync {
    /// `regions`
    fn update_regions(&self, details: &Value) -> bool;

    /// `layers*`
    fn update_layers(&self, details: &Value) -> bool;

    /// `last_updated*`
    fn update_last_updates(&self, details: &Value) -> bool;

    /// `datafiles*`
    fn update_datafiles(&self, details: &Value) -> bool;

    /// Any other JSON request finished.
    fn set_update_flag(&self) {}

    /// A new credential key is in use.
    fn key_is_new(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRequestKind {
    /// Plain download, no API headers.
    Normal,
    Live,
    Forecast,
}

/// SkySight requests on top of a [`DownloadManager`].
///
/// Keeps the credential key fresh, attaches the API headers to every
/// request and hands finished JSON documents to a [`SkysightHandler`].
/// A failed credential request invalidates the key.
pub struct SkysightClient {
    inner: Arc<ClientInner>,
    listener_id: ListenerId,
}

struct ClientInner {
    manager: DownloadManager,
    config: SkysightConfig,
    handler: Arc<dyn SkysightHandler>,
    clock: Arc<dyn Clock>,
    credential: Mutex<Credential>,
    /// Result slots of queued JSON requests, oldest first per name.
    pending: Mutex<HashMap<String, VecDeque<ResultSlot<Value>>>>,
}

impl SkysightClient {
    /// Registers with `manager` and asks for a credential key right away.
    pub fn new(
        manager: DownloadManager,
        config: SkysightConfig,
        handler: Arc<dyn SkysightHandler>,
    ) -> Self {
        Self::with_clock(manager, config, handler, Arc::new(SystemClock))
    }

    pub fn with_clock(
        manager: DownloadManager,
        config: SkysightConfig,
        handler: Arc<dyn SkysightHandler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let inner = Arc::new(ClientInner {
            manager: manager.clone(),
            config,
            handler,
            clock,
            credential: Mutex::new(Credential::new()),
            pending: Mutex::new(HashMap::new()),
        });
        let listener_id = manager.add_listener(Arc::new(SkysightListener {
            client: Arc::downgrade(&inner),
        }));

        inner.request_credential_key();
        Self { inner, listener_id }
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.is_logged_in()
    }

    pub fn allowed_regions(&self) -> Vec<String> {
        self.inner.credential().allowed_regions().to_vec()
    }

    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        self.inner.credential().valid_until()
    }

    /// Queues a credential request unless one went out within the last
    /// minute. Returns `false` only when throttled; a key that is still
    /// good for two minutes counts as success without a request.
    pub fn request_credential_key(&self) -> bool {
        self.inner.request_credential_key()
    }

    /// Queues a JSON request for `base_url/url_part` under `name`.
    pub fn request_json(&self, name: &str, url_part: &str) {
        self.inner.request_json(name, url_part);
    }

    /// Queues a file download. Needs a valid key.
    pub fn download_file(
        &self,
        url: &str,
        path: impl Into<PathBuf>,
        kind: FileRequestKind,
    ) -> Result<(), SkysightError> {
        if !self.inner.is_logged_in() {
            return Err(SkysightError::NotLoggedIn);
        }
        let data = match kind {
            FileRequestKind::Normal => RequestData::default(),
            FileRequestKind::Live | FileRequestKind::Forecast => self.inner.headers(),
        };
        let path = path.into();
        log::debug!("[skysight] file {} -> {}", url, path.display());
        self.inner.manager.enqueue_file(url, path, data)?;
        Ok(())
    }
}

impl Drop for SkysightClient {
    fn drop(&mut self) {
        self.inner.manager.remove_listener(self.listener_id);
    }
}

impl ClientInner {
    fn credential(&self) -> MutexGuard<'_, Credential> {
        self.credential.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, VecDeque<ResultSlot<Value>>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_logged_in(&self) -> bool {
        self.credential().is_valid(self.clock.now())
    }

    /// `X-API-Key` (the credential key, or the application key without
    /// one), `User-Agent` and `Content-Type`.
    fn headers(&self) -> RequestData {
        let key = self
            .credential()
            .key(self.clock.now())
            .map(str::to_string)
            .unwrap_or_else(|| self.config.app_key.clone());
        RequestData::default()
            .with_header("X-API-Key", key)
            .with_header("User-Agent", self.config.user_agent.clone())
            .with_header("Content-Type", "application/json")
    }

    fn request_credential_key(&self) -> bool {
        let decision = self.credential().begin_request(self.clock.now());
        match decision {
            KeyRequest::Throttled => {
                log::warn!("[skysight] credential requested again within a minute, skipped");
                return false;
            }
            KeyRequest::Reuse => {
                log::debug!("[skysight] credential key still valid, reused");
                return true;
            }
            KeyRequest::Send => {}
        }

        let body = json!({
            "username": self.config.username,
            "password": self.config.password,
        });
        let data = RequestData::default()
            .with_header("X-API-Key", self.config.app_key.clone())
            .with_header("User-Agent", self.config.user_agent.clone())
            .with_header("Content-Type", "application/json")
            .with_body(body.to_string());

        log::info!("[skysight] requesting credential key for {}", self.config.username);
        self.enqueue_json(AUTH_REQUEST, self.config.auth_url(), data);
        true
    }

    fn request_json(&self, name: &str, url_part: &str) {
        log::debug!("[skysight] json request '{}'", name);
        self.enqueue_json(name, self.config.url(url_part), self.headers());
    }

    fn enqueue_json(&self, name: &str, url: String, data: RequestData) {
        let slot = ResultSlot::new();
        self.pending()
            .entry(name.to_string())
            .or_default()
            .push_back(slot.clone());
        self.manager.enqueue_json(url, name, slot, data);
    }

    /// The slot of the oldest queued request called `name`, if it is ours.
    fn take_pending(&self, name: &str) -> Option<ResultSlot<Value>> {
        let mut pending = self.pending();
        let slots = pending.get_mut(name)?;
        let slot = slots.pop_front();
        if slots.is_empty() {
            pending.remove(name);
        }
        slot
    }

    /// Adopts a credential reply, or with `None` drops the key and asks
    /// for a new one.
    fn set_credential_key(&self, reply: Option<&Value>) -> bool {
        let Some(reply) = reply else {
            self.credential().invalidate();
            self.request_credential_key();
            return false;
        };

        let reply = match CredentialReply::deserialize(reply) {
            Ok(reply) => reply,
            Err(e) => {
                log::error!("[skysight] unusable credential reply: {}", e);
                return false;
            }
        };

        let now = self.clock.now();
        let logged_in = self.credential().apply(reply, now);
        if logged_in {
            log::info!(
                "[skysight] logged in, key valid until {:?}",
                self.credential().valid_until()
            );
            self.handler.key_is_new();
        } else {
            log::error!("[skysight] credential reply holds no valid key");
        }
        logged_in
    }

    fn on_json(&self, name: &str, details: &Value) {
        let success = if name == AUTH_REQUEST {
            self.set_credential_key(Some(details))
        } else if name == "regions" {
            self.handler.update_regions(details)
        } else if name.starts_with("layers") {
            self.handler.update_layers(details)
        } else if name.starts_with("last_updated") {
            self.handler.update_last_updates(details)
        } else if name.starts_with("datafiles") {
            self.handler.update_datafiles(details)
        } else {
            self.handler.set_update_flag();
            true
        };

        if !success {
            log::warn!("[skysight] '{}' was not accepted", name);
        }
    }
}

/// Routes the queue's notifications back into the client.
struct SkysightListener {
    client: Weak<ClientInner>,
}

impl DownloadListener for SkysightListener {
    fn on_download_added(&self, _name: &str, _size: i64, _position: i64) {}

    fn on_download_complete(&self, name: &str) {
        let Some(client) = self.client.upgrade() else {
            return;
        };
        // files and foreign requests have no slot
        let Some(slot) = client.take_pending(name) else {
            return;
        };
        match slot.take() {
            Some(details) => client.on_json(name, &details),
            None => log::warn!("[skysight] '{}' completed without a document", name),
        }
    }

    fn on_download_error(&self, name: &str, error: Option<&DownloadError>) {
        let Some(client) = self.client.upgrade() else {
            return;
        };
        if client.take_pending(name).is_none() {
            return;
        }
        match error {
            Some(e) => log::error!("[skysight] '{}' failed: {}", name, e),
            None => log::info!("[skysight] '{}' cancelled", name),
        }
        if name == AUTH_REQUEST {
            client.set_credential_key(None);
        }
    }
}
