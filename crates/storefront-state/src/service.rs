//! # Data Service
//!
//! The storefront's data access layer: every read goes through the fetch
//! coordinator under a well-known cache key, every cart change goes through
//! one atomic store update.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  get_product("7") ──► key "product_7" ──► StateManager::fetch           │
//! │                                             │                           │
//! │                        fresh? ◄─────────────┤                           │
//! │                          │ yes: cached      │ no: producer              │
//! │                          ▼                  ▼                           │
//! │                        Product      with_retry(api.get_product)         │
//! │                                             │                           │
//! │                                             ▼                           │
//! │                                   unwrap "data", decode Product         │
//! │                                                                         │
//! │  add_to_cart(..) ──► StateManager::update("cart")                       │
//! │                        decode Cart → Cart::add_item → encode            │
//! │                        (stored and notified only when it changed)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cache Keys
//! | Operation                | Key                                  | TTL     |
//! |--------------------------|--------------------------------------|---------|
//! | `get_current_user`       | `currentUser`                        | catalog |
//! | `get_products`           | `products` / `products_<params>`     | catalog |
//! | `get_product`            | `product_<id>`                       | catalog |
//! | `get_search_suggestions` | `search_suggestions_<query>_<limit>` | none    |
//! | `get_orders`             | `orders` / `orders_<params>`         | account |
//! | `get_order`              | `order_<id>`                         | account |
//! | `get_rentals`            | `rentals` / `rentals_<params>`       | account |
//! | `get_rental`             | `rental_<id>`                        | account |
//! | cart operations          | `cart`                               | -       |

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use storefront_core::models::{Order, OrderRequest, Page, Rental, RentalRequest, User};
use storefront_core::validation::{validate_limit, validate_product_id, validate_search_query};
use storefront_core::{Cart, CoreResult, Product, RentalRange};
use tracing::{debug, info};

use crate::api::{ApiError, ApiResult, QueryParams, StorefrontApi};
use crate::config::ServiceConfig;
use crate::error::{StateError, StateResult};
use crate::fetch::FetchOptions;
use crate::retry::with_retry;
use crate::store::{decode, StateManager};

/// Store key of the shopping cart.
pub const CART_KEY: &str = "cart";

/// Store key of the signed-in user.
pub const CURRENT_USER_KEY: &str = "currentUser";

// =============================================================================
// Data Service
// =============================================================================

/// Typed, cached access to the storefront API plus the cart.
///
/// Cloning is cheap; clones share the API client, the store and the config.
#[derive(Clone)]
pub struct DataService {
    api: Arc<dyn StorefrontApi>,
    state: StateManager,
    config: Arc<ServiceConfig>,
}

impl DataService {
    pub fn new(api: Arc<dyn StorefrontApi>, state: StateManager, config: ServiceConfig) -> Self {
        DataService {
            api,
            state,
            config: Arc::new(config),
        }
    }

    /// The store this service reads and writes.
    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // =========================================================================
    // Account
    // =========================================================================

    pub async fn get_current_user(&self, force_refresh: bool) -> StateResult<User> {
        self.load(
            CURRENT_USER_KEY.to_string(),
            self.config.catalog_options(force_refresh),
            |api| async move { api.get_current_user().await },
            decode_record,
        )
        .await
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// One page of the catalog, filtered by `params`.
    pub async fn get_products(&self, params: QueryParams, force_refresh: bool) -> StateResult<Page<Product>> {
        let key = params.cache_key("products");
        let (page, per_page) = (params.page(), params.per_page());
        self.load(
            key,
            self.config.catalog_options(force_refresh),
            move |api| {
                let params = params.clone();
                async move { api.get_products(&params).await }
            },
            move |raw| decode_page(raw, "products", page, per_page),
        )
        .await
    }

    pub async fn get_product(&self, id: &str, force_refresh: bool) -> StateResult<Product> {
        validate_product_id(id)?;
        let owned = id.to_string();
        self.load(
            format!("product_{id}"),
            self.config.catalog_options(force_refresh),
            move |api| {
                let id = owned.clone();
                async move { api.get_product(&id).await }
            },
            decode_record,
        )
        .await
    }

    /// Type-ahead suggestions for `query`.
    ///
    /// Never served from cache, but concurrent identical requests share one
    /// call. `limit` defaults to the configured suggestion limit.
    pub async fn get_search_suggestions(&self, query: &str, limit: Option<u32>) -> StateResult<Value> {
        let query = validate_search_query(query)?;
        let limit = limit.unwrap_or(self.config.search.suggestion_limit);
        validate_limit(limit)?;

        let key = format!("search_suggestions_{query}_{limit}");
        let mut options = FetchOptions::uncached();
        if !self.config.cache.dedupe {
            options = options.without_dedupe();
        }

        self.load(
            key,
            options,
            move |api| {
                let query = query.clone();
                async move { api.get_search_suggestions(&query, limit).await }
            },
            Ok,
        )
        .await
    }

    // =========================================================================
    // Orders
    // =========================================================================

    pub async fn get_orders(&self, params: QueryParams, force_refresh: bool) -> StateResult<Page<Order>> {
        let key = params.cache_key("orders");
        let (page, per_page) = (params.page(), params.per_page());
        self.load(
            key,
            self.config.account_options(force_refresh),
            move |api| {
                let params = params.clone();
                async move { api.get_orders(&params).await }
            },
            move |raw| decode_page(raw, "orders", page, per_page),
        )
        .await
    }

    pub async fn get_order(&self, id: &str, force_refresh: bool) -> StateResult<Order> {
        let owned = id.to_string();
        self.load(
            format!("order_{id}"),
            self.config.account_options(force_refresh),
            move |api| {
                let id = owned.clone();
                async move { api.get_order(&id).await }
            },
            decode_record,
        )
        .await
    }

    /// Places an order and drops every cached order list.
    ///
    /// Submissions are never retried.
    pub async fn create_order(&self, request: &OrderRequest) -> StateResult<Order> {
        let raw = self.api.create_order(request).await?;
        self.state.clear("orders");
        let order: Order = decode_record(raw)?;
        info!(order = %order.order_number(), lines = order.items.len(), "Order created");
        Ok(order)
    }

    // =========================================================================
    // Rentals
    // =========================================================================

    pub async fn get_rentals(&self, params: QueryParams, force_refresh: bool) -> StateResult<Page<Rental>> {
        let key = params.cache_key("rentals");
        let (page, per_page) = (params.page(), params.per_page());
        self.load(
            key,
            self.config.account_options(force_refresh),
            move |api| {
                let params = params.clone();
                async move { api.get_rentals(&params).await }
            },
            move |raw| decode_page(raw, "rentals", page, per_page),
        )
        .await
    }

    pub async fn get_rental(&self, id: &str, force_refresh: bool) -> StateResult<Rental> {
        let owned = id.to_string();
        self.load(
            format!("rental_{id}"),
            self.config.account_options(force_refresh),
            move |api| {
                let id = owned.clone();
                async move { api.get_rental(&id).await }
            },
            decode_record,
        )
        .await
    }

    /// Books a rental and drops every cached rental list.
    pub async fn create_rental(&self, request: &RentalRequest) -> StateResult<Rental> {
        let raw = self.api.create_rental(request).await?;
        self.state.clear("rentals");
        let rental: Rental = decode_record(raw)?;
        info!(rental = %rental.rental_number(), lines = rental.items.len(), "Rental created");
        Ok(rental)
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// The current cart; an empty one is stored first if there is none.
    pub fn get_cart(&self) -> StateResult<Cart> {
        self.update_cart(|_| Ok(()))
    }

    pub fn add_to_cart(
        &self,
        product: Product,
        quantity: i64,
        is_rental: bool,
        rental_range: Option<RentalRange>,
    ) -> StateResult<Cart> {
        self.update_cart(|cart| cart.add_item(product, quantity, is_rental, rental_range).map(|_| ()))
    }

    /// Changes the line at `index`; an unknown index leaves the cart as is.
    pub fn update_cart_item(&self, index: usize, quantity: i64, rental_range: Option<RentalRange>) -> StateResult<Cart> {
        self.update_cart(|cart| cart.update_item(index, quantity, rental_range).map(|_| ()))
    }

    pub fn remove_cart_item(&self, index: usize) -> StateResult<Cart> {
        self.update_cart(|cart| {
            cart.remove_item(index);
            Ok(())
        })
    }

    pub fn clear_cart(&self) -> StateResult<Cart> {
        self.update_cart(|cart| {
            cart.clear();
            Ok(())
        })
    }

    /// Applies `op` to the stored cart in one store update.
    ///
    /// The cart is written back (and subscribers notified) only when `op`
    /// changed it or no cart was stored yet. A failing `op` leaves the store
    /// untouched.
    fn update_cart<F>(&self, op: F) -> StateResult<Cart>
    where
        F: FnOnce(&mut Cart) -> CoreResult<()>,
    {
        self.state.update(CART_KEY, |current| {
            let stored: Option<Cart> = current.map(|raw| decode(CART_KEY, raw.clone())).transpose()?;
            let mut cart = stored.clone().unwrap_or_default();
            op(&mut cart)?;

            if stored.as_ref() == Some(&cart) {
                return Ok((None, cart));
            }

            let value = serde_json::to_value(&cart).map_err(|e| StateError::Encode {
                key: CART_KEY.to_string(),
                reason: e.to_string(),
            })?;
            debug!(lines = cart.item_count(), total = %cart.total(), "Cart updated");
            Ok((Some(value), cart))
        })
    }

    // =========================================================================
    // Fetch Plumbing
    // =========================================================================

    /// Fetches `key` with a producer that calls the API (retrying per the
    /// configured policy) and normalizes the raw payload.
    async fn load<T, C, Fut, N>(&self, key: String, options: FetchOptions, call: C, normalize: N) -> StateResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        C: Fn(Arc<dyn StorefrontApi>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<Value>> + Send + 'static,
        N: FnOnce(Value) -> ApiResult<T> + Send + 'static,
    {
        let api = Arc::clone(&self.api);
        let policy = self.config.retry_policy();
        let producer = move || async move {
            let raw = with_retry(policy, || call(Arc::clone(&api))).await?;
            normalize(raw)
        };
        self.state.fetch(&key, producer, options).await
    }
}

impl std::fmt::Debug for DataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataService")
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Normalization
// =============================================================================

/// Single records may come bare or wrapped as `{ "data": { ... } }`.
fn unwrap_data(raw: Value) -> Value {
    match raw {
        Value::Object(mut obj) if obj.get("data").is_some_and(Value::is_object) => {
            obj.remove("data").unwrap_or_default()
        }
        other => other,
    }
}

fn decode_record<T: DeserializeOwned>(raw: Value) -> ApiResult<T> {
    serde_json::from_value(unwrap_data(raw)).map_err(|e| ApiError::Decode(e.to_string()))
}

fn decode_page<T: DeserializeOwned>(
    raw: Value,
    collection: &str,
    page: Option<u32>,
    per_page: Option<u32>,
) -> ApiResult<Page<T>> {
    Page::from_response(raw, collection, page, per_page).map_err(|e| ApiError::Decode(e.to_string()))
}

// =============================================================================
// Unit Tests
// =============================================================================
