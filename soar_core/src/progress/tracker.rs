use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::types::types::DownloadError;
use super::observer::DownloadListener;
use super::snapshot::DownloadStatus;

#[derive(Debug, Default)]
struct TrackerState {
    downloads: BTreeMap<String, DownloadStatus>,
    /// name -> error message; `None` for a cancelled download.
    failures: BTreeMap<String, Option<String>>,
}

/// A listener that keeps a per-name view of the queue, the way a file
/// manager screen would: pending and running downloads with their
/// progress, plus the names whose last attempt failed.
///
/// A new `on_download_added` for a name clears its failure.
#[derive(Debug, Default)]
pub struct DownloadTracker {
    state: Mutex<TrackerState>,
}

impl DownloadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downloads(&self) -> BTreeMap<String, DownloadStatus> {
        self.lock().downloads.clone()
    }

    pub fn status(&self, name: &str) -> Option<DownloadStatus> {
        self.lock().downloads.get(name).copied()
    }

    pub fn is_downloading(&self, name: &str) -> bool {
        self.lock().downloads.contains_key(name)
    }

    pub fn failures(&self) -> BTreeMap<String, Option<String>> {
        self.lock().failures.clone()
    }

    pub fn has_failed(&self, name: &str) -> bool {
        self.lock().failures.contains_key(name)
    }

    /// Forget all state, e.g. before replaying the queue with `enumerate`.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.downloads.clear();
        state.failures.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DownloadListener for DownloadTracker {
    fn on_download_added(&self, name: &str, size: i64, position: i64) {
        if name.is_empty() {
            return;
        }
        let mut state = self.lock();
        state
            .downloads
            .insert(name.to_string(), DownloadStatus { size, position });
        state.failures.remove(name);
    }

    fn on_download_complete(&self, name: &str) {
        if name.is_empty() {
            return;
        }
        self.lock().downloads.remove(name);
    }

    fn on_download_error(&self, name: &str, error: Option<&DownloadError>) {
        if name.is_empty() {
            return;
        }
        let mut state = self.lock();
        state.downloads.remove(name);
        state
            .failures
            .insert(name.to_string(), error.map(ToString::to_string));
    }
}
