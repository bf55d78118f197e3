use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::transport::download_transport::Transport;
use crate::progress::counters::ProgressCounters;
use crate::progress::notifier::{ListenerId, ListenerList};
use crate::progress::observer::DownloadListener;
use crate::progress::snapshot::DownloadStatus;
use crate::types::types::{DownloadError, DownloadRequest, RequestData, ResultSlot};

/// Serializes downloads through a single slot.
///
/// Requests run strictly in the order they were enqueued, one at a time,
/// on the runtime given to [`DownloadManager::new`]. Every request ends
/// with exactly one terminal notification: `on_download_complete`, or
/// `on_download_error` with the error (`None` if it was cancelled).
/// Nothing is retried.
///
/// Notifications are recorded under the queue lock in the order the queue
/// changed and delivered one at a time from that record, so listeners see
/// `added` before the terminal event of every request and terminal events
/// in queue order, whichever worker thread finished the transfer.
///
/// The manager is a cheap handle; clones share the same queue.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    runtime: Handle,
    listeners: ListenerList,
    state: Mutex<QueueState>,
    idle: Notify,
}

#[derive(Default)]
struct QueueState {
    /// The head is the running download whenever `active` is set.
    queue: VecDeque<DownloadRequest>,
    active: Option<ActiveDownload>,
    next_generation: u64,
    /// Notifications not yet handed to the listeners.
    outbox: VecDeque<Notification>,
    /// Some thread is draining `outbox`.
    delivering: bool,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.active.is_none() && self.queue.is_empty() && self.outbox.is_empty() && !self.delivering
    }
}

enum Notification {
    Added(String),
    Complete(String),
    Error(String, Option<DownloadError>),
}

struct ActiveDownload {
    /// Distinguishes the running task from an earlier, cancelled one.
    generation: u64,
    cancel: CancellationToken,
    counters: Arc<ProgressCounters>,
    handle: JoinHandle<()>,
}

impl ActiveDownload {
    fn stop(self) {
        self.cancel.cancel();
        self.handle.abort();
        self.counters.reset();
    }
}

impl DownloadManager {
    pub fn new(transport: Arc<dyn Transport>, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                runtime,
                listeners: ListenerList::new(),
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
            }),
        }
    }

    /// Uses the runtime of the calling task.
    ///
    /// Panics outside of a tokio runtime, like `tokio::spawn`.
    pub fn with_current_runtime(transport: Arc<dyn Transport>) -> Self {
        Self::new(transport, Handle::current())
    }

    pub fn add_listener(&self, listener: Arc<dyn DownloadListener>) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Replays `on_download_added` for every queued request, in queue
    /// order, to `listener` only. The running download reports its live
    /// size and position; the others report `-1`.
    pub fn enumerate(&self, listener: &dyn DownloadListener) {
        for (name, status) in self.entries() {
            listener.on_download_added(&name, status.size, status.position);
        }
    }

    /// The queue in order, with the same numbers `enumerate` reports.
    pub fn entries(&self) -> Vec<(String, DownloadStatus)> {
        let state = self.inner.lock();
        state
            .queue
            .iter()
            .enumerate()
            .map(|(i, request)| {
                let status = match (&state.active, i) {
                    (Some(active), 0) => active.counters.get(),
                    _ => DownloadStatus::queued(),
                };
                (request.name.clone(), status)
            })
            .collect()
    }

    /// Appends `request` to the queue and starts it if nothing is running.
    pub fn enqueue(&self, request: DownloadRequest) {
        log::info!("[download_manager] queued '{}' from {}", request.name, request.uri);
        {
            let mut state = self.inner.lock();
            state.outbox.push_back(Notification::Added(request.name.clone()));
            state.queue.push_back(request);
            self.start_head(&mut state);
        }
        self.inner.deliver();
    }

    /// Downloads `uri` into `path`; the request is named after the file name.
    pub fn enqueue_file(
        &self,
        uri: impl Into<String>,
        path: impl Into<PathBuf>,
        data: RequestData,
    ) -> Result<(), DownloadError> {
        self.enqueue(DownloadRequest::file(uri, path, data)?);
        Ok(())
    }

    pub fn enqueue_json(
        &self,
        uri: impl Into<String>,
        name: impl Into<String>,
        slot: ResultSlot<Value>,
        data: RequestData,
    ) {
        self.enqueue(DownloadRequest::json(uri, name, slot, data));
    }

    pub fn enqueue_buffer(
        &self,
        uri: impl Into<String>,
        name: impl Into<String>,
        slot: ResultSlot<Vec<u8>>,
        data: RequestData,
    ) {
        self.enqueue(DownloadRequest::buffer(uri, name, slot, data));
    }

    /// Cancels the first request called `name`.
    ///
    /// Cancelling the running download stops it and starts the next one.
    /// Either way listeners get `on_download_error(name, None)`. Returns
    /// `false`, without notifying anyone, if no such request is queued.
    pub fn cancel(&self, name: &str) -> bool {
        {
            let mut state = self.inner.lock();
            let Some(index) = state.queue.iter().position(|r| r.name == name) else {
                return false;
            };

            if index == 0 && state.active.is_some() {
                if let Some(active) = state.active.take() {
                    active.stop();
                }
                state.queue.pop_front();
                log::info!("[download_manager] cancelled running download '{}'", name);
            } else {
                state.queue.remove(index);
                log::info!("[download_manager] removed '{}' from the queue", name);
            }
            state.outbox.push_back(Notification::Error(name.to_string(), None));
            self.start_head(&mut state);
        }
        self.inner.deliver();
        true
    }

    /// True once the queue has drained and every notification was delivered.
    pub fn is_idle(&self) -> bool {
        self.inner.lock().is_idle()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves once the queue has drained.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Stops the running download and drops the queue without notifying
    /// listeners.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.lock();
            if let Some(active) = state.active.take() {
                active.stop();
            }
            let dropped = state.queue.len();
            state.queue.clear();
            log::info!("[download_manager] shut down, {} request(s) dropped", dropped);
        }
        self.inner.idle.notify_waiters();
    }

    /// Spawns the transfer of the queue head, if there is one and nothing
    /// is running yet.
    fn start_head(&self, state: &mut QueueState) {
        if state.active.is_some() {
            return;
        }
        let Some(request) = state.queue.front().cloned() else {
            return;
        };

        state.next_generation += 1;
        let generation = state.next_generation;
        let cancel = CancellationToken::new();
        let counters = Arc::new(ProgressCounters::new());
        counters.begin();

        log::info!(
            "[download_manager] starting '{}' ({} queued behind it)",
            request.name,
            state.queue.len() - 1
        );

        let transport = Arc::clone(&self.inner.transport);
        let task_counters = Arc::clone(&counters);
        let task_cancel = cancel.clone();
        let manager = Arc::downgrade(&self.inner);

        let handle = self.inner.runtime.spawn(async move {
            let result = tokio::select! {
                _ = task_cancel.cancelled() => Err(DownloadError::Cancelled),
                result = transport.fetch(&request, task_counters.as_ref()) => result,
            };
            on_completion(manager, generation, result);
        });

        state.active = Some(ActiveDownload {
            generation,
            cancel,
            counters,
            handle,
        });
    }
}

/// Retires the finished head, records its outcome and starts the next
/// request.
fn on_completion(manager: Weak<Inner>, generation: u64, result: Result<(), DownloadError>) {
    let Some(inner) = manager.upgrade() else {
        return;
    };
    let manager = DownloadManager { inner };

    {
        let mut state = manager.inner.lock();
        match &state.active {
            Some(active) if active.generation == generation => {}
            // cancelled or shut down while finishing
            _ => return,
        }
        state.active = None;
        let Some(request) = state.queue.pop_front() else {
            return;
        };

        let notification = match result {
            Ok(()) => {
                log::info!("[download_manager] '{}' complete", request.name);
                Notification::Complete(request.name)
            }
            Err(e) => {
                log::error!("[download_manager] '{}' failed: {}", request.name, e);
                Notification::Error(request.name, Some(e))
            }
        };
        state.outbox.push_back(notification);
        manager.start_head(&mut state);
    }

    manager.inner.deliver();
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drains the outbox to the listeners without holding the queue lock.
    ///
    /// Only one thread delivers at a time. A caller that finds delivery in
    /// progress (another worker, or a listener calling back into the
    /// manager) leaves its notifications to the thread already draining.
    fn deliver(&self) {
        {
            let mut state = self.lock();
            if state.delivering {
                return;
            }
            state.delivering = true;
        }
        let _guard = DeliveryGuard(self);

        let now_idle = loop {
            let notification = {
                let mut state = self.lock();
                match state.outbox.pop_front() {
                    Some(notification) => notification,
                    None => {
                        state.delivering = false;
                        break state.is_idle();
                    }
                }
            };

            match notification {
                Notification::Added(name) => self.listeners.notify_added(&name, -1, -1),
                Notification::Complete(name) => self.listeners.notify_complete(&name),
                Notification::Error(name, error) => {
                    self.listeners.notify_error(&name, error.as_ref())
                }
            }
        };

        if now_idle {
            self.idle.notify_waiters();
        }
    }
}

/// Releases the delivery flag if a listener panics.
struct DeliveryGuard<'a>(&'a Inner);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().delivering = false;
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = state.active.take() {
            active.stop();
        }
    }
}
