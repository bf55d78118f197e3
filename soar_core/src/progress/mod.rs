pub mod counters;
pub mod notifier;
pub mod observer;
pub mod snapshot;
pub mod tracker;

pub use counters::ProgressCounters;
pub use notifier::{ListenerId, ListenerList};
pub use observer::{DownloadListener, ProgressListener};
pub use snapshot::{format_bytes, DownloadStatus};
pub use tracker::DownloadTracker;
