use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::types::types::DownloadError;
use super::observer::DownloadListener;

/// Handle returned by [`ListenerList::add`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registration-ordered set of download listeners.
///
/// Every notification first copies the current registrations and releases
/// the lock, then calls the listeners. A listener may therefore add or
/// remove listeners (itself included) from inside a callback; the change
/// takes effect with the next notification.
#[derive(Default)]
pub struct ListenerList {
    listeners: Mutex<Vec<(ListenerId, Arc<dyn DownloadListener>)>>,
    next_id: AtomicU64,
}

impl ListenerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn DownloadListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, listener));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn DownloadListener>> {
        self.lock().iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    pub fn notify_added(&self, name: &str, size: i64, position: i64) {
        for listener in self.snapshot() {
            listener.on_download_added(name, size, position);
        }
    }

    pub fn notify_complete(&self, name: &str) {
        for listener in self.snapshot() {
            listener.on_download_complete(name);
        }
    }

    pub fn notify_error(&self, name: &str, error: Option<&DownloadError>) {
        for listener in self.snapshot() {
            listener.on_download_error(name, error);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Arc<dyn DownloadListener>)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;

    #[derive(Default)]
    struct Counting {
        added: AtomicU64,
    }

    impl DownloadListener for Counting {
        fn on_download_added(&self, _name: &str, _size: i64, _position: i64) {
            self.added.fetch_add(1, Ordering::SeqCst);
        }
        fn on_download_complete(&self, _name: &str) {}
        fn on_download_error(&self, _name: &str, _error: Option<&DownloadError>) {}
    }

    /// Unregisters itself on its first callback.
    struct OneShot {
        list: Weak<ListenerList>,
        id: Mutex<Option<ListenerId>>,
        calls: AtomicU64,
    }

    impl DownloadListener for OneShot {
        fn on_download_added(&self, _name: &str, _size: i64, _position: i64) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let (Some(list), Some(id)) = (self.list.upgrade(), self.id.lock().unwrap().take()) {
                assert!(list.remove(id));
            }
        }
        fn on_download_complete(&self, _name: &str) {}
        fn on_download_error(&self, _name: &str, _error: Option<&DownloadError>) {}
    }

    #[test]
    fn test_add_and_remove() {
        let list = ListenerList::new();
        let counting = Arc::new(Counting::default());
        let id = list.add(counting.clone());
        list.notify_added("a", -1, -1);
        assert!(list.remove(id));
        assert!(!list.remove(id));
        list.notify_added("b", -1, -1);
        assert_eq!(counting.added.load(Ordering::SeqCst), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn test_listener_can_remove_itself_during_notification() {
        let list = Arc::new(ListenerList::new());
        let one_shot = Arc::new(OneShot {
            list: Arc::downgrade(&list),
            id: Mutex::new(None),
            calls: AtomicU64::new(0),
        });
        let counting = Arc::new(Counting::default());

        let id = list.add(one_shot.clone());
        *one_shot.id.lock().unwrap() = Some(id);
        list.add(counting.clone());

        list.notify_added("a", -1, -1);
        list.notify_added("b", -1, -1);

        assert_eq!(one_shot.calls.load(Ordering::SeqCst), 1);
        assert_eq!(counting.added.load(Ordering::SeqCst), 2);
        assert_eq!(list.len(), 1);
    }
}
