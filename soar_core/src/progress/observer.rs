use crate::types::types::DownloadError;

/// Observes the lifecycle of every item passing through the download queue.
///
/// Lifecycle per item:
/// - `on_download_added` when the item is queued (size and position are
///   `-1` until the transfer starts), and again for every
///   [`enumerate`](crate::downloader::DownloadManager::enumerate) replay.
/// - exactly one terminal event: `on_download_complete`, or
///   `on_download_error` with `None` when the item was cancelled.
///
/// Callbacks are delivered one at a time, in the order the queue changed,
/// possibly on another thread than the one that caused them. They never
/// run while the manager holds an internal lock, so a listener may add or
/// remove listeners, enqueue or cancel from inside them; notifications
/// caused that way arrive after the current callback returns.
pub trait DownloadListener: Send + Sync {
    fn on_download_added(&self, name: &str, size: i64, position: i64);

    fn on_download_complete(&self, name: &str);

    fn on_download_error(&self, name: &str, error: Option<&DownloadError>);
}

/// Receives byte progress of the transfer in flight.
pub trait ProgressListener: Send + Sync {
    /// Total size, once known.
    fn set_progress_range(&self, range: u64);

    /// Bytes transferred so far.
    fn set_progress_position(&self, position: u64);
}
