use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use soar_core::progress::{format_bytes, DownloadListener};
use soar_core::types::DownloadError;

/// Renders the download queue as indicatif terminal bars, one per name.
///
/// Bars are created on `on_download_added` and move with every
/// `enumerate` replay.
pub struct TerminalDownloadListener {
    multi: MultiProgress,
    /// name → ProgressBar
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl TerminalDownloadListener {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn with_bar(&self, name: &str, f: impl FnOnce(&ProgressBar)) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        let bar = bars.entry(name.to_string()).or_insert_with(|| {
            let pb = self.multi.add(ProgressBar::new(1));
            if let Ok(style) = ProgressStyle::with_template(
                "[{bar:30.cyan/blue}] {bytes}/{total_bytes} ({binary_bytes_per_sec}) {msg}",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb.set_message(format!("{} (queued)", name));
            pb
        });
        f(bar);
    }
}

impl DownloadListener for TerminalDownloadListener {
    fn on_download_added(&self, name: &str, size: i64, position: i64) {
        self.with_bar(name, |pb| {
            if position < 0 {
                return;
            }
            if size > 0 {
                pb.set_length(size as u64);
            }
            pb.set_position(position as u64);
            pb.set_message(name.to_string());
        });
    }

    fn on_download_complete(&self, name: &str) {
        self.with_bar(name, |pb| {
            let total = format_bytes(pb.position());
            pb.finish_with_message(format!("{} done ({})", name, total));
        });
    }

    fn on_download_error(&self, name: &str, error: Option<&DownloadError>) {
        self.with_bar(name, |pb| match error {
            Some(e) => pb.abandon_with_message(format!("{} failed: {}", name, e)),
            None => pb.abandon_with_message(format!("{} cancelled", name)),
        });
    }
}
