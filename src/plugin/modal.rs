//! Modal subsystem.

use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub trait Modal: Send + Sync {
    fn title(&self) -> String;

    /// Downcast hook for hosts that drive a concrete modal.
    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModalKey(u64);

impl fmt::Display for ModalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "modal-{}", self.0)
    }
}

pub trait ModalHost: Send + Sync {
    fn open_modal(&self, modal: Box<dyn Modal>) -> ModalKey;

    /// Returns whether a modal with `key` was open.
    fn close_modal(&self, key: ModalKey) -> bool;
}

/// In-memory modal host: the most recently opened modal is on top.
#[derive(Default)]
pub struct ModalStack {
    next: AtomicU64,
    open: Mutex<Vec<(ModalKey, Arc<dyn Modal>)>>,
}

impl fmt::Debug for ModalStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let titles: Vec<String> = self.open.lock().iter().map(|(_, m)| m.title()).collect();
        f.debug_struct("ModalStack").field("open", &titles).finish()
    }
}

impl ModalStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.open.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.lock().is_empty()
    }

    pub fn top(&self) -> Option<(ModalKey, Arc<dyn Modal>)> {
        self.open
            .lock()
            .last()
            .map(|(key, modal)| (*key, Arc::clone(modal)))
    }

    pub fn get(&self, key: ModalKey) -> Option<Arc<dyn Modal>> {
        self.open
            .lock()
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, modal)| Arc::clone(modal))
    }
}

impl ModalHost for ModalStack {
    fn open_modal(&self, modal: Box<dyn Modal>) -> ModalKey {
        let key = ModalKey(self.next.fetch_add(1, Ordering::Relaxed));
        self.open.lock().push((key, Arc::from(modal)));
        key
    }

    fn close_modal(&self, key: ModalKey) -> bool {
        let mut open = self.open.lock();
        let before = open.len();
        open.retain(|(k, _)| *k != key);
        open.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dialog(&'static str);

    impl Modal for Dialog {
        fn title(&self) -> String {
            self.0.to_string()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_open_and_close() {
        let stack = ModalStack::new();
        let first = stack.open_modal(Box::new(Dialog("first")));
        let second = stack.open_modal(Box::new(Dialog("second")));
        assert_ne!(first, second);
        assert_eq!(stack.top().map(|(_, m)| m.title()).as_deref(), Some("second"));

        assert!(stack.close_modal(second));
        assert!(!stack.close_modal(second));
        assert_eq!(stack.top().map(|(k, _)| k), Some(first));

        let modal = stack.get(first).unwrap();
        assert!(modal.as_any().downcast_ref::<Dialog>().is_some());
    }
}
