use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

/// Minimum spacing between two credential requests.
pub const REQUEST_INTERVAL: TimeDelta = TimeDelta::seconds(60);

/// A key that stays valid at least this long is reused instead of
/// requesting a new one.
pub const REUSE_MARGIN: TimeDelta = TimeDelta::seconds(120);

/// Answer of the credential endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialReply {
    pub key: String,
    /// Epoch seconds.
    pub valid_until: i64,
    #[serde(default)]
    pub allowed_regions: Vec<String>,
}

/// What to do when a fresh key is wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRequest {
    /// The last request went out less than [`REQUEST_INTERVAL`] ago.
    Throttled,
    /// The current key is good for at least [`REUSE_MARGIN`].
    Reuse,
    Send,
}

/// The API key in use and the bookkeeping around requesting it.
#[derive(Debug, Clone, Default)]
pub struct Credential {
    key: Option<String>,
    valid_until: Option<DateTime<Utc>>,
    allowed_regions: Vec<String>,
    requested_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.key.is_some() && self.valid_until.is_some_and(|until| until > now)
    }

    /// The key, while it is valid.
    pub fn key(&self, now: DateTime<Utc>) -> Option<&str> {
        if self.is_valid(now) {
            self.key.as_deref()
        } else {
            None
        }
    }

    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        self.valid_until
    }

    pub fn allowed_regions(&self) -> &[String] {
        &self.allowed_regions
    }

    /// Decides about a new request and, for [`KeyRequest::Send`], records
    /// it as sent at `now`.
    pub fn begin_request(&mut self, now: DateTime<Utc>) -> KeyRequest {
        if self.requested_at.is_some_and(|at| now < at + REQUEST_INTERVAL) {
            return KeyRequest::Throttled;
        }
        if self.is_valid(now + REUSE_MARGIN) {
            return KeyRequest::Reuse;
        }
        self.requested_at = Some(now);
        KeyRequest::Send
    }

    /// Adopts a reply; returns whether it yields a usable key at `now`.
    pub fn apply(&mut self, reply: CredentialReply, now: DateTime<Utc>) -> bool {
        self.valid_until = DateTime::from_timestamp(reply.valid_until, 0);
        self.key = Some(reply.key).filter(|k| !k.is_empty());
        self.allowed_regions = reply.allowed_regions;
        self.is_valid(now)
    }

    /// Forgets the key; the request throttle stays in place.
    pub fn invalidate(&mut self) {
        self.key = None;
        self.valid_until = None;
    }
}
