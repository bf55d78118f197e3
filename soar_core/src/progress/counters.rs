use std::sync::{Mutex, PoisonError};

use super::observer::ProgressListener;
use super::snapshot::DownloadStatus;

/// The `(size, position)` pair of the active download.
///
/// Written by the transport task and read by `enumerate`, possibly from
/// different threads, so both values live behind one mutex.
#[derive(Debug)]
pub struct ProgressCounters {
    inner: Mutex<DownloadStatus>,
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(DownloadStatus::queued()),
        }
    }

    /// Marks the transfer as started: size unknown, nothing received.
    pub fn begin(&self) {
        *self.lock() = DownloadStatus {
            size: -1,
            position: 0,
        };
    }

    /// Back to "not started".
    pub fn reset(&self) {
        *self.lock() = DownloadStatus::queued();
    }

    pub fn get(&self) -> DownloadStatus {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DownloadStatus> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ProgressCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressListener for ProgressCounters {
    fn set_progress_range(&self, range: u64) {
        self.lock().size = i64::try_from(range).unwrap_or(i64::MAX);
    }

    fn set_progress_position(&self, position: u64) {
        self.lock().position = i64::try_from(position).unwrap_or(i64::MAX);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_lifecycle() {
        let counters = ProgressCounters::new();
        assert_eq!(counters.get(), DownloadStatus::queued());

        counters.begin();
        assert_eq!(counters.get(), DownloadStatus { size: -1, position: 0 });

        counters.set_progress_range(4096);
        counters.set_progress_position(1024);
        assert_eq!(counters.get(), DownloadStatus { size: 4096, position: 1024 });

        counters.reset();
        assert!(counters.get().is_queued());
    }
}
