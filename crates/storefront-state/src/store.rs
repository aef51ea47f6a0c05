//! # Keyed State Store
//!
//! A shared map from string keys to JSON values, with per-key
//! listeners for value changes and for fetch status changes.
//!
//! ## Store Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     StateManager (clone = same store)                   │
//! │                                                                         │
//! │  Arc<Mutex<Inner>>                                                      │
//! │  ├── entries          key → Entry { value, fetched_at, status }         │
//! │  ├── value_listeners  key → [(id, Fn(new, old))]                        │
//! │  ├── status_listeners key → [(id, Fn(&FetchStatus))]                    │
//! │  └── tickets          key → in-flight fetch (see fetch.rs)              │
//! │                                                                         │
//! │  set(key, v) ─► lock ─► write entry, copy listeners ─► unlock           │
//! │                                     │                                   │
//! │                                     ▼                                   │
//! │                       call each listener (panics caught)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - The mutex is never held while a listener runs, so listeners may read or
//!   write the store themselves.
//! - Listeners run synchronously on the thread that made the change, in
//!   registration order.
//! - A panicking listener is logged and skipped; later listeners still run.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::error::{StateError, StateResult};
use crate::fetch::Ticket;

/// Called with `(new, old)` after a key's value changes.
pub type ValueListener = Arc<dyn Fn(&Value, Option<&Value>) + Send + Sync>;

/// Called after a key's fetch status changes.
pub type StatusListener = Arc<dyn Fn(&FetchStatus) + Send + Sync>;

// =============================================================================
// Entry
// =============================================================================

/// Fetch status of one key.
#[derive(Debug, Clone, Default)]
pub struct FetchStatus {
    /// A fetch for this key is running.
    pub loading: bool,

    /// The last fetch failed with this error. Cleared when a new fetch starts.
    pub error: Option<StateError>,
}

#[derive(Debug, Default)]
pub(crate) struct Entry {
    pub(crate) value: Option<Value>,
    /// Set by a successful fetch, cleared by a direct `set`.
    pub(crate) fetched_at: Option<Instant>,
    pub(crate) status: FetchStatus,
}

pub(crate) struct Inner {
    pub(crate) entries: HashMap<String, Entry>,
    value_listeners: HashMap<String, Vec<(u64, ValueListener)>>,
    status_listeners: HashMap<String, Vec<(u64, StatusListener)>>,
    pub(crate) tickets: HashMap<String, Ticket>,
}

impl Inner {
    pub(crate) fn value_listeners(&self, key: &str) -> Vec<ValueListener> {
        self.value_listeners
            .get(key)
            .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn status_listeners(&self, key: &str) -> Vec<StatusListener> {
        self.status_listeners
            .get(key)
            .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }
}

// =============================================================================
// State Manager
// =============================================================================

/// Handle to a shared keyed store.
///
/// Cloning is cheap and every clone sees the same data. The composition root
/// creates one and hands clones to whatever needs it.
#[derive(Clone)]
pub struct StateManager {
    inner: Arc<Mutex<Inner>>,
    ids: Arc<AtomicU64>,
}

impl StateManager {
    pub fn new() -> Self {
        StateManager {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                value_listeners: HashMap::new(),
                status_listeners: HashMap::new(),
                tickets: HashMap::new(),
            })),
            ids: Arc::new(AtomicU64::new(1)),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Current value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().entries.get(key).and_then(|e| e.value.clone())
    }

    /// Current value for `key`, decoded as `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> StateResult<Option<T>> {
        self.get(key)
            .map(|value| decode(key, value))
            .transpose()
    }

    /// Checks if `key` holds a value.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.get(key).is_some_and(|e| e.value.is_some())
    }

    /// Stores `value` under `key`.
    ///
    /// The write is not a fetch: it clears the key's freshness, so the next
    /// cached fetch of `key` calls its producer. Fetch status is untouched.
    /// When `notify` is set, value listeners for `key` are called with
    /// `(new, old)` before this returns.
    pub fn set(&self, key: &str, value: Value, notify: bool) {
        let (old, listeners) = {
            let mut inner = self.lock();
            let entry = inner.entries.entry(key.to_string()).or_default();
            let old = entry.value.replace(value.clone());
            entry.fetched_at = None;
            let listeners = if notify { inner.value_listeners(key) } else { Vec::new() };
            (old, listeners)
        };

        notify_value(key, &listeners, &value, old.as_ref());
    }

    /// Encodes `value` as JSON and stores it.
    pub fn set_as<T: Serialize>(&self, key: &str, value: &T, notify: bool) -> StateResult<()> {
        let json = serde_json::to_value(value).map_err(|e| StateError::Encode {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.set(key, json, notify);
        Ok(())
    }

    /// Read-modify-write of `key` under the store lock.
    ///
    /// `f` receives the current value and returns the value to store (or
    /// `None` to leave the key as it is) together with a result for the
    /// caller. No other write to the store can interleave. An error from `f`
    /// leaves the store untouched. Value listeners are notified after the lock
    /// is released, exactly as for [`set`](Self::set).
    ///
    /// `f` runs with the store locked and must not call back into the store.
    pub fn update<F, R, E>(&self, key: &str, f: F) -> Result<R, E>
    where
        F: FnOnce(Option<&Value>) -> Result<(Option<Value>, R), E>,
    {
        let (change, result) = {
            let mut inner = self.lock();
            let current = inner.entries.get(key).and_then(|e| e.value.as_ref());
            let (new, result) = f(current)?;

            let change = new.map(|value| {
                let entry = inner.entries.entry(key.to_string()).or_default();
                let old = entry.value.replace(value.clone());
                entry.fetched_at = None;
                (value, old, inner.value_listeners(key))
            });
            (change, result)
        };

        if let Some((new, old, listeners)) = change {
            notify_value(key, &listeners, &new, old.as_ref());
        }
        Ok(result)
    }

    /// Removes entries whose key starts with `prefix`; an empty prefix removes
    /// everything.
    ///
    /// Listeners and in-flight fetches are kept. A fetch that finishes after
    /// the clear writes its result as usual.
    pub fn clear(&self, prefix: &str) {
        let mut inner = self.lock();
        let before = inner.entries.len();
        if prefix.is_empty() {
            inner.entries.clear();
        } else {
            inner.entries.retain(|key, _| !key.starts_with(prefix));
        }
        debug!(prefix = %prefix, removed = before - inner.entries.len(), "Cleared state entries");
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Fetch status for `key` (not loading, no error when never fetched).
    pub fn status(&self, key: &str) -> FetchStatus {
        self.lock()
            .entries
            .get(key)
            .map(|e| e.status.clone())
            .unwrap_or_default()
    }

    pub fn is_loading(&self, key: &str) -> bool {
        self.lock().entries.get(key).is_some_and(|e| e.status.loading)
    }

    /// Error of the last failed fetch for `key`.
    pub fn get_error(&self, key: &str) -> Option<StateError> {
        self.lock().entries.get(key).and_then(|e| e.status.error.clone())
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Registers a value listener for `key`.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// dropped, unsubscribed or detached.
    pub fn subscribe<F>(&self, key: &str, listener: F) -> Subscription
    where
        F: Fn(&Value, Option<&Value>) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.lock()
            .value_listeners
            .entry(key.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        self.subscription(key, id, ListenerKind::Value)
    }

    /// Registers a status listener for `key`.
    pub fn subscribe_status<F>(&self, key: &str, listener: F) -> Subscription
    where
        F: Fn(&FetchStatus) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.lock()
            .status_listeners
            .entry(key.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        self.subscription(key, id, ListenerKind::Status)
    }

    fn subscription(&self, key: &str, id: u64, kind: ListenerKind) -> Subscription {
        Subscription {
            inner: Arc::downgrade(&self.inner),
            key: key.to_string(),
            id,
            kind,
            detached: false,
        }
    }

    /// Number of listeners of both kinds registered for `key`.
    pub fn listener_count(&self, key: &str) -> usize {
        let inner = self.lock();
        inner.value_listeners.get(key).map_or(0, Vec::len) + inner.status_listeners.get(key).map_or(0, Vec::len)
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("StateManager")
            .field("entries", &inner.entries.len())
            .field("in_flight", &inner.tickets.len())
            .finish()
    }
}

// =============================================================================
// Subscription
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerKind {
    Value,
    Status,
}

/// A registered listener. Dropping it removes the listener.
///
/// The handle does not keep the store alive.
#[must_use = "dropping a Subscription removes its listener immediately"]
pub struct Subscription {
    inner: Weak<Mutex<Inner>>,
    key: String,
    id: u64,
    kind: ListenerKind,
    detached: bool,
}

impl Subscription {
    /// Removes the listener now.
    pub fn unsubscribe(self) {}

    /// Keeps the listener registered for the life of the store.
    pub fn detach(mut self) {
        self.detached = true;
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);

        let emptied = match self.kind {
            ListenerKind::Value => remove_listener(&mut inner.value_listeners, &self.key, self.id),
            ListenerKind::Status => remove_listener(&mut inner.status_listeners, &self.key, self.id),
        };
        if emptied {
            debug!(key = %self.key, "Last listener removed");
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Removes listener `id` under `key`; returns true if that emptied the key.
fn remove_listener<L>(map: &mut HashMap<String, Vec<(u64, L)>>, key: &str, id: u64) -> bool {
    let Some(list) = map.get_mut(key) else {
        return false;
    };
    list.retain(|(lid, _)| *lid != id);
    if list.is_empty() {
        map.remove(key);
        true
    } else {
        false
    }
}

// =============================================================================
// Notification
// =============================================================================

pub(crate) fn notify_value(key: &str, listeners: &[ValueListener], new: &Value, old: Option<&Value>) {
    for listener in listeners {
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| listener(new, old))) {
            error!(key = %key, panic = %panic_message(panic.as_ref()), "Value listener panicked");
        }
    }
}

pub(crate) fn notify_status(key: &str, listeners: &[StatusListener], status: &FetchStatus) {
    for listener in listeners {
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| listener(status))) {
            error!(key = %key, panic = %panic_message(panic.as_ref()), "Status listener panicked");
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, value: Value) -> StateResult<T> {
    serde_json::from_value(value).map_err(|e| StateError::Decode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
