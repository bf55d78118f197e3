use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use serde_json::Value;

use soar_core::config::{self, SkysightConfig, TransportConfig};
use soar_core::downloader::{DownloadManager, HttpTransport};
use soar_core::progress::DownloadTracker;
use soar_core::skysight::{SkysightClient, SkysightHandler};
use soar_core::task::TaskEvent;
use soar_core::types::{RequestData, ResultSlot};

mod terminal_observer;
use terminal_observer::TerminalDownloadListener;

#[derive(Parser)]
#[command(name = "soar", about = "Glide computer task and download tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download files one after another through the download queue
    Download {
        /// URLs to download, in order
        #[arg(required = true)]
        urls: Vec<String>,

        /// Directory the files are written to
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// User agent sent with every request
        #[arg(long, env = "SOAR_USER_AGENT")]
        user_agent: Option<String>,

        /// Connect timeout in seconds
        #[arg(long)]
        connect_timeout: Option<u64>,
    },
    /// Replay a recorded track through a task and report start, turn points and finish
    StartCheck {
        /// Task definition (JSON)
        #[arg(short, long)]
        task: PathBuf,

        /// Fix track (JSON array of aircraft states, oldest first)
        #[arg(short = 'r', long)]
        track: PathBuf,
    },
    /// Log in to SkySight and list the regions and layers of the account
    Skysight {
        #[arg(long, env = "SKYSIGHT_USERNAME")]
        username: String,

        #[arg(long, env = "SKYSIGHT_PASSWORD", hide_env_values = true)]
        password: String,

        /// Region whose layers are listed
        #[arg(long, default_value = "EUROPE")]
        region: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let result = match args.command {
        Command::Download {
            urls,
            output_dir,
            user_agent,
            connect_timeout,
        } => {
            let mut config = TransportConfig::default();
            if let Some(user_agent) = user_agent {
                config.user_agent = user_agent;
            }
            config.connect_timeout_secs = connect_timeout;
            download(&urls, &output_dir, &config).await
        }
        Command::StartCheck { task, track } => start_check(&task, &track),
        Command::Skysight {
            username,
            password,
            region,
        } => skysight(SkysightConfig::new(username, password), &region).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns `false` if any download failed.
async fn download(urls: &[String], output_dir: &Path, config: &TransportConfig) -> Result<bool, Box<dyn Error>> {
    let transport = Arc::new(HttpTransport::new(config)?);
    let manager = DownloadManager::with_current_runtime(transport);

    let terminal = Arc::new(TerminalDownloadListener::new());
    let tracker = Arc::new(DownloadTracker::new());
    manager.add_listener(terminal.clone());
    manager.add_listener(tracker.clone());

    let mut digests = Vec::with_capacity(urls.len());
    for url in urls {
        let path = output_dir.join(file_name_from_url(url));
        let slot = ResultSlot::new();
        manager.enqueue_file(url.as_str(), &path, RequestData::default().with_sha256(slot.clone()))?;
        digests.push((path, slot));
    }

    // the queue only reports progress when asked, so poll it
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let idle = manager.wait_idle();
    tokio::pin!(idle);
    loop {
        tokio::select! {
            _ = &mut idle => break,
            _ = ticker.tick() => manager.enumerate(terminal.as_ref()),
        }
    }

    for (path, slot) in &digests {
        if let Some(digest) = slot.get() {
            println!("{}  {}", to_hex(&digest), path.display());
        }
    }

    let failures = tracker.failures();
    for (name, error) in &failures {
        eprintln!("{}: {}", name, error.as_deref().unwrap_or("cancelled"));
    }
    Ok(failures.is_empty())
}

/// Prints the id and name of every entry of a SkySight listing.
struct ListingPrinter;

impl ListingPrinter {
    fn print(kind: &str, details: &Value) -> bool {
        let Some(entries) = details.as_array() else {
            return false;
        };
        for entry in entries {
            println!("{:<8} {:<16} {}", kind, text(entry, "id"), text(entry, "name"));
        }
        true
    }
}

fn text<'a>(entry: &'a Value, key: &str) -> &'a str {
    entry.get(key).and_then(Value::as_str).unwrap_or("")
}

impl SkysightHandler for ListingPrinter {
    fn update_regions(&self, details: &Value) -> bool {
        Self::print("region", details)
    }

    fn update_layers(&self, details: &Value) -> bool {
        Self::print("layer", details)
    }

    fn update_last_updates(&self, _details: &Value) -> bool {
        true
    }

    fn update_datafiles(&self, _details: &Value) -> bool {
        true
    }
}

/// Returns `false` if the login or a listing failed.
async fn skysight(config: SkysightConfig, region: &str) -> Result<bool, Box<dyn Error>> {
    let transport = Arc::new(HttpTransport::new(&TransportConfig::default())?);
    let manager = DownloadManager::with_current_runtime(transport);
    let tracker = Arc::new(DownloadTracker::new());
    manager.add_listener(tracker.clone());

    let client = SkysightClient::new(manager.clone(), config, Arc::new(ListingPrinter));
    manager.wait_idle().await;
    if !client.is_logged_in() {
        eprintln!("SkySight login failed");
        return Ok(false);
    }
    println!("allowed regions: {}", client.allowed_regions().join(", "));

    client.request_json("regions", "regions");
    client.request_json("layers", &format!("layers?region_id={}", region));
    manager.wait_idle().await;

    let failures = tracker.failures();
    for (name, error) in &failures {
        eprintln!("{}: {}", name, error.as_deref().unwrap_or("cancelled"));
    }
    Ok(failures.is_empty())
}

/// Returns `false` if the track never starts the task.
fn start_check(task_path: &Path, track_path: &Path) -> Result<bool, Box<dyn Error>> {
    let mut task = config::load_task(task_path)?;
    let track = config::load_track(track_path)?;

    for pair in track.windows(2) {
        let (last, now) = (&pair[0], &pair[1]);
        match task.update(now, last) {
            TaskEvent::None => {}
            TaskEvent::Started { time } => println!("started at {}", time),
            TaskEvent::TurnpointAchieved { index } => {
                println!("turn point {} ({}) at {}", index, task.points()[index].waypoint().name, now.time)
            }
            TaskEvent::Finished { time } => println!("finished at {}", time),
        }
    }

    if !task.is_started() {
        println!("no valid start in {} fix(es)", track.len());
    } else if !task.is_finished() {
        println!("task not finished, next point is #{}", task.active_index());
    }
    Ok(task.is_started())
}

fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "download".to_string(),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(file_name_from_url("https://example.com/maps/alps.xcm"), "alps.xcm");
        assert_eq!(file_name_from_url("https://example.com/a.txt?x=1#frag"), "a.txt");
        assert_eq!(file_name_from_url("https://example.com/dir/"), "download");
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[0x00, 0xab, 0x10]), "00ab10");
    }

    #[test]
    fn test_listing_printer_accepts_arrays_only() {
        let listing = serde_json::json!([{ "id": "EUROPE", "name": "Europe" }, { "id": 3 }]);
        assert!(ListingPrinter.update_regions(&listing));
        assert!(!ListingPrinter.update_layers(&serde_json::json!({ "id": "wstar" })));
        assert_eq!(text(&listing[0], "name"), "Europe");
        assert_eq!(text(&listing[1], "id"), "");
    }
}
