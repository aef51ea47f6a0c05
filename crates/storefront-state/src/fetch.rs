//! # Fetch Coordinator
//!
//! `StateManager::fetch` loads a key through an async producer, with a
//! freshness window cache and in-flight de-duplication.
//!
//! ## Decision Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  fetch(key, producer, options)                                          │
//! │       │                                                                 │
//! │       ├── dedupe && ticket(key)? ─────────► await the same ticket       │
//! │       │                                                                 │
//! │       ├── cache && fresh value? ──────────► return cached value         │
//! │       │   (now − fetched_at < cache_time)                               │
//! │       │                                                                 │
//! │       └── start:                                                        │
//! │             loading = true, error = none  (status listeners)            │
//! │             register ticket (if dedupe)                                 │
//! │             spawn producer task ─────┐                                  │
//! │                                      ▼                                  │
//! │             settle:  remove ticket                                      │
//! │                      ok  → value, fetched_at (value + status listeners) │
//! │                      err → error, keep old value (status listeners)     │
//! │                      then wake every waiter with the one outcome        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The check-and-register step runs under the store lock, so two callers can
//! never start two producers for one key while de-duplication is on. The
//! producer runs on its own tokio task: it finishes even if every caller
//! stops waiting. A producer panic is caught and becomes that key's error.
//!
//! Freshness uses `tokio::time::Instant`, so tests can drive it with a
//! paused clock.

use std::error::Error as StdError;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::error::{StateError, StateResult};
use crate::store::{decode, notify_status, notify_value, panic_message, FetchStatus, StateManager};

/// Freshness window used when a caller doesn't pick one.
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(5 * 60);

type Outcome = Result<Value, StateError>;

/// The one result of an in-flight fetch, cloned to every waiter.
pub(crate) type SharedOutcome = Shared<BoxFuture<'static, Outcome>>;

/// An in-flight fetch for one key.
pub(crate) struct Ticket {
    id: u64,
    outcome: SharedOutcome,
}

// =============================================================================
// Options
// =============================================================================

/// Per-call fetch behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Serve a fresh stored value instead of calling the producer.
    pub cache: bool,

    /// How long a fetched value stays fresh.
    pub cache_time: Duration,

    /// Join an in-flight fetch for the same key instead of starting another.
    pub dedupe: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            cache: true,
            cache_time: DEFAULT_CACHE_TIME,
            dedupe: true,
        }
    }
}

impl FetchOptions {
    /// Always calls the producer (still de-duplicated).
    pub fn uncached() -> Self {
        FetchOptions {
            cache: false,
            ..Self::default()
        }
    }

    pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }

    pub fn without_dedupe(mut self) -> Self {
        self.dedupe = false;
        self
    }

    /// Turns the cache off when `force` is set.
    pub fn force_refresh(mut self, force: bool) -> Self {
        if force {
            self.cache = false;
        }
        self
    }
}

enum Begin {
    Cached(Value),
    Wait(SharedOutcome),
}

// =============================================================================
// Fetch
// =============================================================================

impl StateManager {
    /// Loads `key` through `producer`, honoring `options`.
    ///
    /// ## Outcome
    /// - Joined an in-flight fetch: that fetch's value or error, identical for
    ///   every waiter (the producer's error is the same `Arc`)
    /// - Fresh cached value: returned without calling `producer`
    /// - Otherwise `producer` runs once; its value is stored and returned, or
    ///   its error is recorded in the key's status and returned while the
    ///   previous value stays in place
    ///
    /// The stored JSON is decoded as `T`; a shape mismatch is
    /// [`StateError::Decode`].
    ///
    /// Must be called within a tokio runtime.
    pub async fn fetch<T, F, Fut, E>(&self, key: &str, producer: F, options: FetchOptions) -> StateResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        let value = match self.begin(key, producer, options) {
            Begin::Cached(value) => value,
            Begin::Wait(outcome) => outcome.await?,
        };
        decode(key, value)
    }

    /// The synchronous part of a fetch: decide, and start the producer if
    /// needed.
    fn begin<T, F, Fut, E>(&self, key: &str, producer: F, options: FetchOptions) -> Begin
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        let (outcome, tx, ticket_id, status_listeners) = {
            let mut inner = self.lock();

            if options.dedupe {
                if let Some(ticket) = inner.tickets.get(key) {
                    debug!(key = %key, "Joining in-flight fetch");
                    return Begin::Wait(ticket.outcome.clone());
                }
            }

            if options.cache {
                if let Some(entry) = inner.entries.get(key) {
                    if let (Some(value), Some(fetched_at)) = (&entry.value, entry.fetched_at) {
                        if fetched_at.elapsed() < options.cache_time {
                            debug!(key = %key, "Serving cached value");
                            return Begin::Cached(value.clone());
                        }
                    }
                }
            }

            let entry = inner.entries.entry(key.to_string()).or_default();
            entry.status = FetchStatus {
                loading: true,
                error: None,
            };

            let (tx, rx) = oneshot::channel::<Outcome>();
            let owned_key = key.to_string();
            let outcome: SharedOutcome = rx
                .map(move |received| {
                    received.unwrap_or_else(|_| Err(StateError::TaskAborted { key: owned_key }))
                })
                .boxed()
                .shared();

            let ticket_id = self.next_id();
            if options.dedupe {
                inner.tickets.insert(
                    key.to_string(),
                    Ticket {
                        id: ticket_id,
                        outcome: outcome.clone(),
                    },
                );
            }

            (outcome, tx, ticket_id, inner.status_listeners(key))
        };

        debug!(key = %key, dedupe = options.dedupe, "Starting fetch");
        notify_status(
            key,
            &status_listeners,
            &FetchStatus {
                loading: true,
                error: None,
            },
        );

        let store = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let result = run_producer(&key, producer).await;
            store.settle(&key, ticket_id, &result);
            // Nobody waiting is fine; the result is already stored.
            let _ = tx.send(result);
        });

        Begin::Wait(outcome)
    }

    /// Records a finished fetch and notifies listeners. Runs before any
    /// waiter sees the outcome.
    fn settle(&self, key: &str, ticket_id: u64, result: &Outcome) {
        let (old, value_listeners, status_listeners, status) = {
            let mut inner = self.lock();

            if inner.tickets.get(key).is_some_and(|t| t.id == ticket_id) {
                inner.tickets.remove(key);
            }

            let entry = inner.entries.entry(key.to_string()).or_default();
            let old = match result {
                Ok(value) => {
                    let old = entry.value.replace(value.clone());
                    entry.fetched_at = Some(Instant::now());
                    entry.status = FetchStatus::default();
                    Some(old)
                }
                Err(err) => {
                    entry.status = FetchStatus {
                        loading: false,
                        error: Some(err.clone()),
                    };
                    None
                }
            };
            let status = entry.status.clone();

            let value_listeners = if old.is_some() { inner.value_listeners(key) } else { Vec::new() };
            (old, value_listeners, inner.status_listeners(key), status)
        };

        match (result, old) {
            (Ok(value), Some(old)) => {
                debug!(key = %key, "Fetch succeeded");
                notify_value(key, &value_listeners, value, old.as_ref());
            }
            (Err(err), _) => warn!(key = %key, error = %err, "Fetch failed"),
            _ => {}
        }
        notify_status(key, &status_listeners, &status);
    }
}

/// Runs the producer to completion, turning a panic or an unencodable value
/// into an error for `key`.
async fn run_producer<T, F, Fut, E>(key: &str, producer: F) -> Outcome
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: StdError + Send + Sync + 'static,
{
    match AssertUnwindSafe(async move { producer().await }).catch_unwind().await {
        Ok(Ok(value)) => serde_json::to_value(value).map_err(|e| StateError::Encode {
            key: key.to_string(),
            reason: e.to_string(),
        }),
        Ok(Err(err)) => Err(StateError::Producer {
            key: key.to_string(),
            source: Arc::new(err),
        }),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(key = %key, panic = %message, "Fetch producer panicked");
            Err(StateError::ProducerPanicked {
                key: key.to_string(),
                message,
            })
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    /// A producer that counts its calls and answers `value`.
    fn counting(
        calls: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl FnOnce() -> futures_util::future::Ready<Result<u32, ApiError>> + Send + 'static {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            futures_util::future::ready(Ok(value))
        }
    }

    #[tokio::test]
    async fn test_fetch_stores_value() {
        let store = StateManager::new();
        let calls = counter();

        let value: u32 = store.fetch("n", counting(&calls, 7), FetchOptions::default()).await.unwrap();

        assert_eq!(value, 7);
        assert_eq!(store.get("n"), Some(json!(7)));
        assert!(!store.is_loading("n"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_window() {
        let store = StateManager::new();
        let calls = counter();
        let options = FetchOptions::default().with_cache_time(Duration::from_millis(1000));

        let first: u32 = store.fetch("n", counting(&calls, 1), options).await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        let second: u32 = store.fetch("n", counting(&calls, 2), options).await.unwrap();

        assert_eq!((first, second), (1, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(600)).await;
        let third: u32 = store.fetch("n", counting(&calls, 3), options).await.unwrap();

        assert_eq!(third, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_cache_time_is_five_minutes() {
        let store = StateManager::new();
        let calls = counter();

        let _: u32 = store.fetch("n", counting(&calls, 1), FetchOptions::default()).await.unwrap();
        tokio::time::advance(Duration::from_secs(299)).await;
        let _: u32 = store.fetch("n", counting(&calls, 1), FetchOptions::default()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        let _: u32 = store.fetch("n", counting(&calls, 1), FetchOptions::default()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_uncached_always_calls_producer() {
        let store = StateManager::new();
        let calls = counter();

        for expected in 1..=3 {
            let _: u32 = store.fetch("n", counting(&calls, 1), FetchOptions::uncached()).await.unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), expected);
        }
    }

    #[tokio::test]
    async fn test_direct_set_is_not_fresh() {
        let store = StateManager::new();
        let calls = counter();
        store.set("n", json!(99), false);

        let value: u32 = store.fetch("n", counting(&calls, 5), FetchOptions::default()).await.unwrap();

        assert_eq!(value, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_producer() {
        let store = StateManager::new();
        let calls = counter();
        let gate = Arc::new(Notify::new());

        let producer = |calls: Arc<AtomicUsize>, gate: Arc<Notify>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok::<_, ApiError>(vec!["drill".to_string()])
            }
        };

        let a = store.fetch("products", producer(calls.clone(), gate.clone()), FetchOptions::default());
        let b = store.fetch("products", producer(calls.clone(), gate.clone()), FetchOptions::default());
        let release = async {
            tokio::task::yield_now().await;
            gate.notify_one();
        };

        let (a, b, ()) = tokio::join!(a, b, release);

        assert_eq!(a.unwrap(), vec!["drill"]);
        assert_eq!(b.unwrap(), vec!["drill"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_the_same_error() {
        let store = StateManager::new();
        let gate = Arc::new(Notify::new());

        let producer = |gate: Arc<Notify>| {
            move || async move {
                gate.notified().await;
                Err::<u32, _>(ApiError::Transport("connection reset".into()))
            }
        };

        let a = store.fetch::<u32, _, _, _>("k", producer(gate.clone()), FetchOptions::default());
        let b = store.fetch::<u32, _, _, _>("k", producer(gate.clone()), FetchOptions::default());
        let release = async {
            tokio::task::yield_now().await;
            gate.notify_one();
        };

        let (a, b, ()) = tokio::join!(a, b, release);
        let (a, b) = (a.unwrap_err(), b.unwrap_err());

        assert!(Arc::ptr_eq(a.producer_error().unwrap(), b.producer_error().unwrap()));
        assert!(a.api_error().is_some_and(ApiError::is_retryable));
    }

    #[tokio::test]
    async fn test_without_dedupe_each_call_runs() {
        let store = StateManager::new();
        let calls = counter();
        let options = FetchOptions::uncached().without_dedupe();

        let a = store.fetch::<u32, _, _, _>("k", counting(&calls, 1), options);
        let b = store.fetch::<u32, _, _, _>("k", counting(&calls, 2), options);
        let (a, b) = tokio::join!(a, b);

        assert_eq!((a.unwrap(), b.unwrap()), (1, 2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_last_good_value() {
        let store = StateManager::new();
        let calls = counter();
        let _: u32 = store.fetch("k", counting(&calls, 10), FetchOptions::default()).await.unwrap();

        let err = store
            .fetch::<u32, _, _, _>(
                "k",
                || async { Err(ApiError::Http { status: 500, message: "boom".into() }) },
                FetchOptions::uncached(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.key(), Some("k"));
        assert_eq!(store.get("k"), Some(json!(10)));
        assert!(!store.is_loading("k"));
        assert!(store.get_error("k").is_some());

        // The next successful fetch clears the error
        let _: u32 = store.fetch("k", counting(&calls, 11), FetchOptions::uncached()).await.unwrap();
        assert!(store.get_error("k").is_none());
        assert_eq!(store.get("k"), Some(json!(11)));
    }

    #[tokio::test]
    async fn test_producer_panic_becomes_error() {
        let store = StateManager::new();

        async fn explode() -> Result<u32, ApiError> {
            panic!("producer bug")
        }

        let err = store.fetch("k", explode, FetchOptions::default()).await.unwrap_err();

        assert!(matches!(err, StateError::ProducerPanicked { ref message, .. } if message == "producer bug"));
        assert!(!store.is_loading("k"));

        // Other keys are unaffected
        let ok: u32 = store.fetch("other", counting(&counter(), 1), FetchOptions::default()).await.unwrap();
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn test_decode_mismatch_is_an_error() {
        let store = StateManager::new();
        let calls = counter();
        let _: u32 = store.fetch("k", counting(&calls, 3), FetchOptions::default()).await.unwrap();

        let err = store
            .fetch::<String, _, _, ApiError>("k", || async { Ok("unused".to_string()) }, FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_status_listener_sees_loading_then_result() {
        let store = StateManager::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = store.subscribe_status("k", move |status| {
            sink.lock().unwrap().push((status.loading, status.error.is_some()));
        });

        let _: u32 = store.fetch("k", counting(&counter(), 1), FetchOptions::default()).await.unwrap();
        let _ = store
            .fetch::<u32, _, _, _>(
                "k",
                || async { Err(ApiError::NotFound("k".into())) },
                FetchOptions::uncached(),
            )
            .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(true, false), (false, false), (true, false), (false, true)]
        );
    }

    #[tokio::test]
    async fn test_ticket_is_gone_before_waiters_resume() {
        let store = StateManager::new();
        let _: u32 = store.fetch("k", counting(&counter(), 1), FetchOptions::default()).await.unwrap();
        assert!(store.lock().tickets.is_empty());
    }

    #[tokio::test]
    async fn test_failed_ticket_is_gone_before_waiters_resume() {
        let store = StateManager::new();
        let calls = counter();
        let gate = Arc::new(Notify::new());

        let failing = {
            let (calls, gate) = (calls.clone(), gate.clone());
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Err::<u32, _>(ApiError::Transport("reset".into()))
            }
        };

        let first = store.fetch::<u32, _, _, ApiError>("k", failing, FetchOptions::default());
        // Joins the failing fetch, then retries as soon as it sees the error
        let second = async {
            let joined = store
                .fetch::<u32, _, _, ApiError>("k", counting(&calls, 9), FetchOptions::default())
                .await;
            assert!(matches!(joined, Err(StateError::Producer { .. })));
            store
                .fetch::<u32, _, _, ApiError>("k", counting(&calls, 5), FetchOptions::default())
                .await
        };
        let release = async { gate.notify_one() };

        let (first, retried, ()) = tokio::join!(first, second, release);

        assert!(matches!(first, Err(StateError::Producer { .. })));
        assert_eq!(retried.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.get("k"), Some(json!(5)));
        assert!(store.lock().tickets.is_empty());
    }

    #[tokio::test]
    async fn test_producer_finishes_after_caller_gives_up() {
        let store = StateManager::new();
        let gate = Arc::new(Notify::new());
        let release = gate.clone();

        let fetch = store.fetch::<u32, _, _, ApiError>(
            "k",
            move || async move {
                gate.notified().await;
                Ok(8)
            },
            FetchOptions::default(),
        );
        // Poll once so the producer starts, then abandon the caller
        let _ = tokio::time::timeout(Duration::from_millis(10), fetch).await;

        release.notify_one();
        for _ in 0..100 {
            if store.get("k").is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(store.get("k"), Some(json!(8)));
    }
}
