use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use soar_core::downloader::{DownloadManager, Transport};
use soar_core::progress::{
    DownloadListener, DownloadStatus, DownloadTracker, ListenerId, ProgressListener,
};
use soar_core::types::{DownloadError, DownloadKind, DownloadRequest, RequestData, ResultSlot};

const TIMEOUT: Duration = Duration::from_secs(5);

/// A transport whose requests hang until the test releases them by name.
///
/// On start it reports a size of 100 and a position of 10, then announces
/// the name on `started`. Requests named `fail*` end with an error.
struct ScriptedTransport {
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    started: mpsc::UnboundedSender<String>,
}

impl ScriptedTransport {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (started, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            gates: Mutex::new(HashMap::new()),
            started,
        });
        (transport, rx)
    }

    fn gate(&self, name: &str) -> Arc<Semaphore> {
        let mut gates = self.gates.lock().unwrap();
        Arc::clone(
            gates
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(0))),
        )
    }

    fn release(&self, name: &str) {
        self.gate(name).add_permits(1);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(
        &self,
        request: &DownloadRequest,
        progress: &dyn ProgressListener,
    ) -> Result<(), DownloadError> {
        let gate = self.gate(&request.name);
        progress.set_progress_range(100);
        progress.set_progress_position(10);
        let _ = self.started.send(request.name.clone());

        let _permit = gate
            .acquire()
            .await
            .map_err(|e| DownloadError::Transport(e.to_string()))?;

        if request.name.starts_with("fail") {
            Err(DownloadError::Transport("scripted failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Added(String, i64, i64),
    Complete(String),
    Error(String, Option<String>),
}

/// Forwards every callback into a channel.
struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
}

impl Recorder {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl DownloadListener for Recorder {
    fn on_download_added(&self, name: &str, size: i64, position: i64) {
        let _ = self.tx.send(Event::Added(name.to_string(), size, position));
    }

    fn on_download_complete(&self, name: &str) {
        let _ = self.tx.send(Event::Complete(name.to_string()));
    }

    fn on_download_error(&self, name: &str, error: Option<&DownloadError>) {
        let _ = self
            .tx
            .send(Event::Error(name.to_string(), error.map(ToString::to_string)));
    }
}

fn request(name: &str) -> DownloadRequest {
    DownloadRequest::buffer(
        format!("http://localhost/{}", name),
        name,
        ResultSlot::new(),
        RequestData::default(),
    )
}

async fn next_started(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a download to start")
        .expect("transport dropped")
}

/// Next `Complete` or `Error`, skipping `Added` events.
async fn next_terminal(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    loop {
        let event = tokio::time::timeout(TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for a terminal event")
            .expect("listener dropped");
        if !matches!(event, Event::Added(..)) {
            return event;
        }
    }
}

fn setup() -> (
    DownloadManager,
    Arc<ScriptedTransport>,
    mpsc::UnboundedReceiver<String>,
    mpsc::UnboundedReceiver<Event>,
) {
    let (transport, started) = ScriptedTransport::new();
    let manager = DownloadManager::with_current_runtime(transport.clone());
    let (recorder, events) = Recorder::new();
    manager.add_listener(recorder);
    (manager, transport, started, events)
}

// ---------------------------------------------------------------
// Ordering and single flight
// ---------------------------------------------------------------

#[tokio::test]
async fn test_enqueue_notifies_added_with_unknown_progress() {
    let (manager, _transport, _started, mut events) = setup();

    manager.enqueue(request("a"));

    let event = tokio::time::timeout(TIMEOUT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event, Event::Added("a".into(), -1, -1));
    assert_eq!(manager.len(), 1);
    assert!(!manager.is_idle());
}

#[tokio::test]
async fn test_completions_follow_enqueue_order() {
    let (manager, transport, mut started, mut events) = setup();

    for name in ["a", "b", "c"] {
        transport.release(name);
    }
    for name in ["a", "b", "c"] {
        manager.enqueue(request(name));
    }

    for name in ["a", "b", "c"] {
        assert_eq!(next_started(&mut started).await, name);
        assert_eq!(next_terminal(&mut events).await, Event::Complete(name.into()));
    }

    tokio::time::timeout(TIMEOUT, manager.wait_idle()).await.unwrap();
    assert!(manager.is_idle());
    assert_eq!(manager.len(), 0);
}

#[tokio::test]
async fn test_only_the_head_is_in_flight() {
    let (manager, transport, mut started, mut events) = setup();

    manager.enqueue(request("a"));
    manager.enqueue(request("b"));
    assert_eq!(next_started(&mut started).await, "a");

    assert_eq!(
        manager.entries(),
        vec![
            ("a".to_string(), DownloadStatus { size: 100, position: 10 }),
            ("b".to_string(), DownloadStatus::queued()),
        ]
    );
    assert!(started.try_recv().is_err(), "b must not start while a runs");

    transport.release("a");
    assert_eq!(next_terminal(&mut events).await, Event::Complete("a".into()));
    assert_eq!(next_started(&mut started).await, "b");
    assert_eq!(
        manager.entries(),
        vec![("b".to_string(), DownloadStatus { size: 100, position: 10 })]
    );
}

#[tokio::test]
async fn test_failure_is_reported_and_queue_moves_on() {
    let (manager, transport, mut started, mut events) = setup();

    transport.release("fail.bin");
    transport.release("ok.bin");
    manager.enqueue(request("fail.bin"));
    manager.enqueue(request("ok.bin"));

    assert_eq!(
        next_terminal(&mut events).await,
        Event::Error(
            "fail.bin".into(),
            Some("transport failure: scripted failure".into())
        )
    );
    assert_eq!(next_terminal(&mut events).await, Event::Complete("ok.bin".into()));
    assert_eq!(next_started(&mut started).await, "fail.bin");
    assert_eq!(next_started(&mut started).await, "ok.bin");
}

// ---------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------

#[tokio::test]
async fn test_cancel_of_active_starts_next() {
    let (manager, transport, mut started, mut events) = setup();

    manager.enqueue(request("a"));
    manager.enqueue(request("b"));
    assert_eq!(next_started(&mut started).await, "a");

    assert!(manager.cancel("a"));
    assert_eq!(next_terminal(&mut events).await, Event::Error("a".into(), None));

    // b starts without another enqueue
    assert_eq!(next_started(&mut started).await, "b");

    // releasing a now has no effect, its task is gone
    transport.release("a");
    transport.release("b");
    assert_eq!(next_terminal(&mut events).await, Event::Complete("b".into()));

    tokio::time::timeout(TIMEOUT, manager.wait_idle()).await.unwrap();
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_cancel_of_queued_is_silent() {
    let (manager, transport, mut started, mut events) = setup();

    manager.enqueue(request("a"));
    manager.enqueue(request("b"));
    assert_eq!(next_started(&mut started).await, "a");

    assert!(manager.cancel("b"));
    assert_eq!(next_terminal(&mut events).await, Event::Error("b".into(), None));
    assert_eq!(manager.len(), 1);

    transport.release("a");
    assert_eq!(next_terminal(&mut events).await, Event::Complete("a".into()));

    tokio::time::timeout(TIMEOUT, manager.wait_idle()).await.unwrap();
    assert!(started.try_recv().is_err(), "b must never start");
    assert!(events.try_recv().is_err(), "exactly one event for b");
}

#[tokio::test]
async fn test_cancel_of_unknown_name_is_a_no_op() {
    let (manager, _transport, mut started, mut events) = setup();

    manager.enqueue(request("a"));
    assert_eq!(next_started(&mut started).await, "a");
    assert_eq!(events.recv().await, Some(Event::Added("a".into(), -1, -1)));

    assert!(!manager.cancel("nope"));
    assert!(events.try_recv().is_err());
    assert_eq!(manager.len(), 1);
}

#[tokio::test]
async fn test_cancel_last_item_goes_idle() {
    let (manager, _transport, mut started, mut events) = setup();

    manager.enqueue(request("only"));
    assert_eq!(next_started(&mut started).await, "only");
    assert!(manager.cancel("only"));
    assert_eq!(next_terminal(&mut events).await, Event::Error("only".into(), None));

    assert!(manager.is_idle());
    assert!(manager.entries().is_empty());
}

#[tokio::test]
async fn test_shutdown_drops_queue_without_notifications() {
    let (manager, _transport, mut started, mut events) = setup();

    manager.enqueue(request("a"));
    manager.enqueue(request("b"));
    assert_eq!(next_started(&mut started).await, "a");
    while let Ok(event) = events.try_recv() {
        assert!(matches!(event, Event::Added(..)));
    }

    manager.shutdown();
    assert!(manager.is_idle());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err());
    assert!(started.try_recv().is_err());
}

// ---------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------

#[tokio::test]
async fn test_enumerate_replays_queue_to_one_listener() {
    let (manager, _transport, mut started, mut events) = setup();

    manager.enqueue(request("a"));
    manager.enqueue(request("b"));
    assert_eq!(next_started(&mut started).await, "a");
    while events.try_recv().is_ok() {}

    let (late, mut late_events) = Recorder::new();
    manager.enumerate(late.as_ref());

    assert_eq!(late_events.try_recv().ok(), Some(Event::Added("a".into(), 100, 10)));
    assert_eq!(late_events.try_recv().ok(), Some(Event::Added("b".into(), -1, -1)));
    assert!(late_events.try_recv().is_err());

    // registered listeners are not involved
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_removed_listener_gets_nothing() {
    let (transport, _started) = ScriptedTransport::new();
    let manager = DownloadManager::with_current_runtime(transport);
    let (recorder, mut events) = Recorder::new();

    let id = manager.add_listener(recorder);
    assert!(manager.remove_listener(id));
    assert!(!manager.remove_listener(id));

    manager.enqueue(request("a"));
    assert!(events.try_recv().is_err());
}

/// On its first callback: unregisters itself and queues another request.
struct Reentrant {
    manager: DownloadManager,
    id: Mutex<Option<ListenerId>>,
    fired: AtomicBool,
}

impl DownloadListener for Reentrant {
    fn on_download_added(&self, _name: &str, _size: i64, _position: i64) {
        if self.fired.swap(true, Ordering::SeqCst) {
            panic!("called again after removing itself");
        }
        if let Some(id) = self.id.lock().unwrap().take() {
            self.manager.remove_listener(id);
        }
        self.manager.enqueue(request("second"));
    }

    fn on_download_complete(&self, _name: &str) {}

    fn on_download_error(&self, _name: &str, _error: Option<&DownloadError>) {}
}

#[tokio::test]
async fn test_listener_may_mutate_manager_from_callback() {
    let (manager, transport, mut started, mut events) = setup();
    let reentrant = Arc::new(Reentrant {
        manager: manager.clone(),
        id: Mutex::new(None),
        fired: AtomicBool::new(false),
    });
    let id = manager.add_listener(reentrant.clone());
    *reentrant.id.lock().unwrap() = Some(id);

    transport.release("first");
    transport.release("second");
    manager.enqueue(request("first"));

    assert_eq!(next_started(&mut started).await, "first");
    assert_eq!(next_terminal(&mut events).await, Event::Complete("first".into()));
    assert_eq!(next_started(&mut started).await, "second");
    assert_eq!(next_terminal(&mut events).await, Event::Complete("second".into()));
    assert!(reentrant.fired.load(Ordering::SeqCst));
}

// ---------------------------------------------------------------
// Delivery across worker threads
// ---------------------------------------------------------------

/// Finishes every request after a millisecond.
struct QuickTransport;

#[async_trait]
impl Transport for QuickTransport {
    async fn fetch(
        &self,
        _request: &DownloadRequest,
        _progress: &dyn ProgressListener,
    ) -> Result<(), DownloadError> {
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok(())
    }
}

/// Logs every callback and stalls its thread on the completion of `slow`.
struct StallingLog {
    slow: &'static str,
    log: Mutex<Vec<String>>,
}

impl DownloadListener for StallingLog {
    fn on_download_added(&self, name: &str, _size: i64, _position: i64) {
        self.log.lock().unwrap().push(format!("added {}", name));
    }

    fn on_download_complete(&self, name: &str) {
        if name == self.slow {
            tokio::task::block_in_place(|| std::thread::sleep(Duration::from_millis(50)));
        }
        self.log.lock().unwrap().push(format!("complete {}", name));
    }

    fn on_download_error(&self, name: &str, _error: Option<&DownloadError>) {
        self.log.lock().unwrap().push(format!("error {}", name));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_listener_keeps_events_in_queue_order() {
    let manager = DownloadManager::with_current_runtime(Arc::new(QuickTransport));
    let listener = Arc::new(StallingLog {
        slow: "a",
        log: Mutex::new(Vec::new()),
    });
    let tracker = Arc::new(DownloadTracker::new());
    manager.add_listener(listener.clone());
    manager.add_listener(tracker.clone());

    let names = ["a", "b", "c", "d"];
    for name in names {
        manager.enqueue(request(name));
    }
    tokio::time::timeout(TIMEOUT, manager.wait_idle()).await.unwrap();

    let log = listener.log.lock().unwrap().clone();
    assert_eq!(log.len(), 8, "{:?}", log);
    let index_of = |entry: String| {
        log.iter()
            .position(|e| *e == entry)
            .unwrap_or_else(|| panic!("missing '{}' in {:?}", entry, log))
    };
    for name in names {
        assert!(
            index_of(format!("added {}", name)) < index_of(format!("complete {}", name)),
            "{:?}",
            log
        );
    }

    let completions: Vec<&str> = log.iter().filter_map(|e| e.strip_prefix("complete ")).collect();
    assert_eq!(completions, names);

    // every item was retired by the time the queue reports idle
    assert!(tracker.downloads().is_empty(), "{:?}", tracker.downloads());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_is_reported_before_the_next_item_finishes() {
    let (manager, transport, mut started, mut events) = setup();

    transport.release("b");
    manager.enqueue(request("a"));
    manager.enqueue(request("b"));
    assert_eq!(next_started(&mut started).await, "a");

    // b starts and finishes on another worker while the cancel is reported
    assert!(manager.cancel("a"));
    tokio::time::timeout(TIMEOUT, manager.wait_idle()).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            Event::Added("a".into(), -1, -1),
            Event::Added("b".into(), -1, -1),
            Event::Error("a".into(), None),
            Event::Complete("b".into()),
        ]
    );
}

// ---------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------

#[tokio::test]
async fn test_enqueue_file_uses_basename_as_name() {
    let (manager, _transport, mut started, mut events) = setup();

    manager
        .enqueue_file("http://localhost/x", "/tmp/maps/alps.xcm", RequestData::default())
        .unwrap();
    assert_eq!(next_started(&mut started).await, "alps.xcm");
    assert_eq!(events.recv().await, Some(Event::Added("alps.xcm".into(), -1, -1)));
    assert!(manager.cancel("alps.xcm"));
}

#[test]
fn test_request_kinds() {
    assert_eq!(request("a").kind(), DownloadKind::Buffer);
    let json = DownloadRequest::json("http://localhost", "forecast", ResultSlot::new(), RequestData::default());
    assert_eq!(json.kind(), DownloadKind::Json);
}
