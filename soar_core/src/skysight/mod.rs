//! SkySight weather service requests, queued through the download manager.

pub mod client;
pub mod credential;

pub use client::{
    Clock, FileRequestKind, SkysightClient, SkysightError, SkysightHandler, SystemClock,
    AUTH_REQUEST,
};
pub use credential::{Credential, CredentialReply, KeyRequest};
