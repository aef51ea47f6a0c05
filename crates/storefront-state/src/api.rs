//! # Storefront API Boundary
//!
//! The data service talks to the storefront backend only through the
//! [`StorefrontApi`] trait. Payloads cross the boundary as raw JSON; the
//! service normalizes them into `storefront-core` models.
//!
//! ## Implementations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   DataService ──► Arc<dyn StorefrontApi>                                │
//! │                        │                                                │
//! │                        ├── InMemoryApi  (fixtures, quote CLI, tests)    │
//! │                        └── HTTP client  (provided by the host app)      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use storefront_core::models::{OrderRequest, RentalRequest};
use storefront_core::money;
use storefront_core::Money;
use thiserror::Error;
use tracing::debug;

// =============================================================================
// Errors
// =============================================================================

/// Result type alias for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Failure reported by a [`StorefrontApi`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never got a response (DNS, connect, reset).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The response body was not the JSON we expected.
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Returns true if repeating the same call may succeed.
    ///
    /// ## Retryable
    /// - Transport failures
    /// - 5xx responses
    /// - 429 Too Many Requests
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Http { status, .. } => *status >= 500 || *status == 429,
            ApiError::NotFound(_) | ApiError::Decode(_) => false,
        }
    }

    /// Returns true for a missing record, however the server phrased it.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_) | ApiError::Http { status: 404, .. })
    }
}

// =============================================================================
// Query Parameters
// =============================================================================

/// List filters, kept in insertion order.
///
/// The order matters: it is part of the cache key, so the same filters added
/// in a different order are a different cache entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, replacing the value of an existing key in place.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds a parameter only when a value is present.
    pub fn with_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Requested page, if given as a positive number.
    pub fn page(&self) -> Option<u32> {
        self.positive("page")
    }

    /// Requested page size, if given as a positive number.
    pub fn per_page(&self) -> Option<u32> {
        self.positive("per_page")
    }

    fn positive(&self, key: &str) -> Option<u32> {
        self.get(key)?.parse::<u32>().ok().filter(|n| *n > 0)
    }

    /// Cache key for a list endpoint: `prefix` alone, or `prefix_k=v&k2=v2`.
    pub fn cache_key(&self, prefix: &str) -> String {
        if self.is_empty() {
            prefix.to_string()
        } else {
            format!("{prefix}_{self}")
        }
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

// =============================================================================
// API Trait
// =============================================================================

/// The storefront backend as seen by the data service.
///
/// Every method returns the response body as raw JSON. Implementations must
/// be usable from many tasks at once.
#[async_trait]
pub trait StorefrontApi: Send + Sync {
    async fn get_current_user(&self) -> ApiResult<Value>;

    async fn get_products(&self, params: &QueryParams) -> ApiResult<Value>;

    async fn get_product(&self, id: &str) -> ApiResult<Value>;

    async fn get_search_suggestions(&self, query: &str, limit: u32) -> ApiResult<Value>;

    async fn get_orders(&self, params: &QueryParams) -> ApiResult<Value>;

    async fn get_order(&self, id: &str) -> ApiResult<Value>;

    async fn create_order(&self, request: &OrderRequest) -> ApiResult<Value>;

    async fn get_rentals(&self, params: &QueryParams) -> ApiResult<Value>;

    async fn get_rental(&self, id: &str) -> ApiResult<Value>;

    async fn create_rental(&self, request: &RentalRequest) -> ApiResult<Value>;
}

// =============================================================================
// In-Memory Implementation
// =============================================================================

/// An in-process storefront backed by JSON fixtures.
///
/// ## Response Shapes
/// Each list endpoint answers in a different envelope, the way the real
/// backends have over time:
/// ```text
/// get_products  → { "products": [...], page, per_page, total, total_pages }
/// get_orders    → { "data": [...], total }
/// get_rentals   → [ ... ]
/// ```
///
/// Calls are counted per method, failures can be queued with
/// [`InMemoryApi::fail_next`], and an artificial latency makes concurrent
/// calls overlap.
pub struct InMemoryApi {
    state: Mutex<Fixtures>,
    latency: Duration,
}

#[derive(Default)]
struct Fixtures {
    user: Option<Value>,
    products: Vec<Value>,
    orders: Vec<Value>,
    rentals: Vec<Value>,
    failures: VecDeque<ApiError>,
    calls: HashMap<&'static str, usize>,
    next_id: u64,
}

impl InMemoryApi {
    pub fn new() -> Self {
        InMemoryApi {
            state: Mutex::new(Fixtures::default()),
            latency: Duration::ZERO,
        }
    }

    /// Creates an API serving the given product fixtures.
    pub fn with_products(products: Vec<Value>) -> Self {
        let api = Self::new();
        api.lock().products = products;
        api
    }

    pub fn with_user(self, user: Value) -> Self {
        self.lock().user = Some(user);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queues an error for the next call, whichever method it is.
    pub fn fail_next(&self, error: ApiError) {
        self.lock().failures.push_back(error);
    }

    /// How many times `method` has been called.
    pub fn calls(&self, method: &str) -> usize {
        self.lock().calls.get(method).copied().unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, Fixtures> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts the call, waits out the latency, then reports a queued failure.
    async fn begin(&self, method: &'static str) -> ApiResult<()> {
        let failure = {
            let mut state = self.lock();
            *state.calls.entry(method).or_insert(0) += 1;
            state.failures.pop_front()
        };
        debug!(method, "In-memory API call");

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn product(&self, id: &str) -> Option<Value> {
        self.lock()
            .products
            .iter()
            .find(|p| id_of(p) == id)
            .cloned()
    }

    fn unit_price(&self, product_id: &str, field: &str) -> Money {
        self.product(product_id)
            .and_then(|p| p.get(field).and_then(money::dollars::from_value))
            .unwrap_or_default()
    }
}

impl Default for InMemoryApi {
    fn default() -> Self {
        Self::new()
    }
}

fn id_of(record: &Value) -> String {
    match record.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn find_by_id(records: &[Value], id: &str, kind: &str) -> ApiResult<Value> {
    records
        .iter()
        .find(|r| id_of(r) == id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("{kind} {id}")))
}

fn too_large(product_id: &str) -> ApiError {
    ApiError::Http {
        status: 422,
        message: format!("amount for product {product_id} is too large"),
    }
}

#[async_trait]
impl StorefrontApi for InMemoryApi {
    async fn get_current_user(&self) -> ApiResult<Value> {
        self.begin("get_current_user").await?;
        self.lock()
            .user
            .clone()
            .ok_or_else(|| ApiError::Http {
                status: 401,
                message: "not signed in".to_string(),
            })
    }

    async fn get_products(&self, params: &QueryParams) -> ApiResult<Value> {
        self.begin("get_products").await?;

        let category = params.get("category").map(str::to_lowercase);
        let search = params.get("search").map(str::to_lowercase);
        let matching: Vec<Value> = self
            .lock()
            .products
            .iter()
            .filter(|p| {
                let field = |name: &str| {
                    p.get(name)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_lowercase()
                };
                category.as_ref().map_or(true, |c| field("category") == *c)
                    && search.as_ref().map_or(true, |s| field("name").contains(s.as_str()))
            })
            .cloned()
            .collect();

        let page = params.page().unwrap_or(1) as usize;
        let per_page = params.per_page().unwrap_or(10) as usize;
        let total = matching.len();
        let items: Vec<Value> = matching
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();

        Ok(json!({
            "products": items,
            "page": page,
            "per_page": per_page,
            "total": total,
            "total_pages": total.div_ceil(per_page),
        }))
    }

    async fn get_product(&self, id: &str) -> ApiResult<Value> {
        self.begin("get_product").await?;
        self.product(id)
            .map(|p| json!({ "data": p }))
            .ok_or_else(|| ApiError::NotFound(format!("product {id}")))
    }

    async fn get_search_suggestions(&self, query: &str, limit: u32) -> ApiResult<Value> {
        self.begin("get_search_suggestions").await?;
        let needle = query.to_lowercase();
        let suggestions: Vec<Value> = self
            .lock()
            .products
            .iter()
            .filter_map(|p| {
                let name = p.get("name")?.as_str()?;
                name.to_lowercase()
                    .contains(&needle)
                    .then(|| json!({ "id": p["id"].clone(), "name": name }))
            })
            .take(limit as usize)
            .collect();
        Ok(Value::Array(suggestions))
    }

    async fn get_orders(&self, _params: &QueryParams) -> ApiResult<Value> {
        self.begin("get_orders").await?;
        let orders = self.lock().orders.clone();
        let total = orders.len();
        Ok(json!({ "data": orders, "total": total }))
    }

    async fn get_order(&self, id: &str) -> ApiResult<Value> {
        self.begin("get_order").await?;
        find_by_id(&self.lock().orders, id, "order")
    }

    async fn create_order(&self, request: &OrderRequest) -> ApiResult<Value> {
        self.begin("create_order").await?;

        let mut total = Money::zero();
        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let price = self.unit_price(&line.product_id, "price");
            let subtotal = price.checked_mul(line.quantity).ok_or_else(|| too_large(&line.product_id))?;
            total = total.checked_add(subtotal).ok_or_else(|| too_large(&line.product_id))?;
            items.push(json!({
                "product_id": line.product_id,
                "price": price.to_decimal_string(),
                "quantity": line.quantity,
                "subtotal": subtotal.to_decimal_string(),
            }));
        }

        let mut state = self.lock();
        state.next_id += 1;
        let order = json!({
            "id": format!("ord-{}", state.next_id),
            "status": "PENDING",
            "total": total.to_decimal_string(),
            "items": items,
            "shipping_address": request.shipping_address,
            "payment_method": request.payment_method,
            "notes": request.notes,
        });
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn get_rentals(&self, _params: &QueryParams) -> ApiResult<Value> {
        self.begin("get_rentals").await?;
        Ok(Value::Array(self.lock().rentals.clone()))
    }

    async fn get_rental(&self, id: &str) -> ApiResult<Value> {
        self.begin("get_rental").await?;
        find_by_id(&self.lock().rentals, id, "rental")
    }

    async fn create_rental(&self, request: &RentalRequest) -> ApiResult<Value> {
        self.begin("create_rental").await?;

        let mut total = Money::zero();
        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let per_day = self.unit_price(&line.product_id, "rental_price");
            let days = match (line.start_date, line.end_date) {
                (Some(start), Some(end)) => storefront_core::RentalRange::new(start, end).days(),
                _ => 1,
            };
            let subtotal = per_day
                .checked_mul(line.quantity)
                .and_then(|m| m.checked_mul(days))
                .ok_or_else(|| too_large(&line.product_id))?;
            total = total.checked_add(subtotal).ok_or_else(|| too_large(&line.product_id))?;
            items.push(json!({
                "product_id": line.product_id,
                "rental_price": per_day.to_decimal_string(),
                "quantity": line.quantity,
                "days": days,
                "subtotal": subtotal.to_decimal_string(),
                "start_date": line.start_date,
                "end_date": line.end_date,
            }));
        }

        let mut state = self.lock();
        state.next_id += 1;
        let rental = json!({
            "id": format!("rnt-{}", state.next_id),
            "status": "PENDING",
            "total": total.to_decimal_string(),
            "items": items,
            "shipping_address": request.shipping_address,
            "payment_method": request.payment_method,
            "damage_waiver": request.damage_waiver.unwrap_or(false),
        });
        state.rentals.push(rental.clone());
        Ok(rental)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(ApiError::Transport("reset".into()).is_retryable());
        assert!(ApiError::Http { status: 503, message: "busy".into() }.is_retryable());
        assert!(ApiError::Http { status: 429, message: "slow down".into() }.is_retryable());

        assert!(!ApiError::Http { status: 400, message: "bad".into() }.is_retryable());
        assert!(!ApiError::NotFound("product 1".into()).is_retryable());
        assert!(!ApiError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn test_not_found() {
        assert!(ApiError::NotFound("x".into()).is_not_found());
        assert!(ApiError::Http { status: 404, message: String::new() }.is_not_found());
        assert!(!ApiError::Transport("x".into()).is_not_found());
    }

    #[test]
    fn test_query_params_cache_key() {
        assert_eq!(QueryParams::new().cache_key("products"), "products");

        let params = QueryParams::new()
            .with("category", "tools")
            .with("page", 2)
            .with_opt::<u32>("per_page", None);
        assert_eq!(params.cache_key("products"), "products_category=tools&page=2");
        assert_eq!(params.page(), Some(2));
        assert_eq!(params.per_page(), None);

        // Re-setting a key keeps its position
        let params = params.with("category", "garden");
        assert_eq!(params.to_string(), "category=garden&page=2");
    }

    #[tokio::test]
    async fn test_in_memory_products_and_failures() {
        let api = InMemoryApi::with_products(vec![
            json!({"id": 1, "name": "Hammer", "category": "tools", "price": "12.50"}),
            json!({"id": 2, "name": "Hose", "category": "garden", "price": "20"}),
        ]);

        let page = api
            .get_products(&QueryParams::new().with("category", "tools"))
            .await
            .unwrap();
        assert_eq!(page["products"].as_array().unwrap().len(), 1);
        assert_eq!(page["total"], 1);

        let product = api.get_product("2").await.unwrap();
        assert_eq!(product["data"]["name"], "Hose");

        api.fail_next(ApiError::Transport("down".into()));
        assert!(api.get_product("2").await.is_err());
        assert!(api.get_product("3").await.unwrap_err().is_not_found());
        assert_eq!(api.calls("get_product"), 3);
    }
}
