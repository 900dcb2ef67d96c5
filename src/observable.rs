//! Observable values.
//!
//! An [`Observable`] holds the latest value of some piece of state and
//! publishes every change to its subscribers. A new subscriber always sees
//! the current value first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Callback handle for unregistering callbacks.
///
/// Dropping the handle unregisters the callback.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

static CALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A publish/subscribe cell holding the latest value.
///
/// Cloning an `Observable` yields another handle to the same cell.
#[derive(Debug)]
pub struct Observable<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    /// Create an observable holding `initial`.
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Get a copy of the current value.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Mutate the value in place.
    ///
    /// Subscribers are only notified when `f` returns `true`.
    pub fn modify<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut T) -> bool,
    {
        self.tx.send_if_modified(f)
    }

    /// Subscribe to value changes.
    ///
    /// The receiver's current value is the latest one; `changed()` resolves
    /// on every later update. Updates made faster than the receiver reads
    /// them collapse into the most recent value.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Register a callback invoked with the current value immediately and
    /// again after every change.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn on_change<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let callback_id = CALLBACK_COUNTER.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                let value = rx.borrow_and_update().clone();
                callback(&value);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }
}
