use serde::Serialize;

/// Size and position of one queue entry as reported to listeners.
///
/// `-1` means unknown; an entry that has not started reports `-1` for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownloadStatus {
    pub size: i64,
    pub position: i64,
}

impl DownloadStatus {
    pub fn queued() -> Self {
        Self {
            size: -1,
            position: -1,
        }
    }

    pub fn is_queued(&self) -> bool {
        self.position < 0
    }

    /// Completion in percent, when the size is known.
    pub fn percent(&self) -> Option<f64> {
        if self.size <= 0 || self.position < 0 {
            return None;
        }
        Some((self.position as f64 / self.size as f64 * 100.0).min(100.0))
    }
}

/// Human-readable byte formatting.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;

    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GB", b / GB)
    } else if b >= MB {
        format!("{:.2} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}
