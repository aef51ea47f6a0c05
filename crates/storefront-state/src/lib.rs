//! # storefront-state: Client State & Fetch Coordination
//!
//! The stateful half of the storefront client: a keyed store with
//! subscriptions, a fetch coordinator that caches results for a time window
//! and collapses concurrent loads of the same key into one producer call,
//! and the data service that binds both to the storefront API and the cart.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    storefront-state Architecture                        │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    DataService (service.rs)                      │  │
//! │  │                                                                  │  │
//! │  │  cache keys • TTL per resource • retry • cart read-modify-write │  │
//! │  └───────────────┬──────────────────────────────┬───────────────────┘  │
//! │                  │ fetch(key, producer, opts)   │ api calls            │
//! │                  ▼                              ▼                      │
//! │  ┌────────────────────────────────┐  ┌──────────────────────────────┐  │
//! │  │   Fetch Coordinator (fetch.rs) │  │  StorefrontApi (api.rs)      │  │
//! │  │                                │  │                              │  │
//! │  │  1. join in-flight ticket      │  │  raw JSON payloads           │  │
//! │  │  2. serve fresh cached value   │  │  InMemoryApi for fixtures    │  │
//! │  │  3. spawn producer once        │  │                              │  │
//! │  └───────────────┬────────────────┘  └──────────────────────────────┘  │
//! │                  │                                                      │
//! │                  ▼                                                      │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  StateManager (store.rs)                         │  │
//! │  │                                                                  │  │
//! │  │  key → { value, fetched_at, status }   listeners per key         │  │
//! │  │  one mutex, never held across an await or a listener call        │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`store`] - `StateManager`, subscriptions, fetch status
//! - [`fetch`] - `StateManager::fetch` and `FetchOptions`
//! - [`service`] - `DataService`: catalog, account and cart operations
//! - [`api`] - The `StorefrontApi` boundary and the in-memory backend
//! - [`retry`] - Exponential backoff around API calls
//! - [`config`] - TOML + environment configuration
//! - [`error`] - State error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use storefront_state::{DataService, InMemoryApi, ServiceConfig, StateManager};
//!
//! let config = ServiceConfig::load_or_default(None);
//! let service = DataService::new(Arc::new(InMemoryApi::new()), StateManager::new(), config);
//!
//! let _sub = service.state().subscribe("cart", |cart, _| println!("cart: {cart}"));
//! let product = service.get_product("42", false).await?;
//! service.add_to_cart(product, 1, false, None)?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod retry;
pub mod service;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use api::{ApiError, ApiResult, InMemoryApi, QueryParams, StorefrontApi};
pub use config::{CacheSettings, RetrySettings, SearchSettings, ServiceConfig};
pub use error::{SharedError, StateError, StateResult};
pub use fetch::{FetchOptions, DEFAULT_CACHE_TIME};
pub use retry::{with_retry, RetryPolicy};
pub use service::{DataService, CART_KEY, CURRENT_USER_KEY};
pub use store::{FetchStatus, StateManager, StatusListener, Subscription, ValueListener};
