//! # API Models
//!
//! Typed records for everything the storefront API returns besides products,
//! the paginated list envelope, and the request payloads sent at checkout.
//!
//! ## Record Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  API JSON ──► serde (lenient fields) ──► Order / Rental / User          │
//! │                                                                         │
//! │  list JSON ─► Page::from_response() ───► Page<T>                        │
//! │               { orders: [...] }                                         │
//! │               [ ... ]                                                   │
//! │               { data: [...], page, per_page, total, total_pages }       │
//! │                                                                         │
//! │  Cart ──────► OrderRequest::from_cart()  ──► POST /orders               │
//! │        └────► RentalRequest::from_cart() ──► POST /rentals              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::cart::Cart;
use crate::error::ValidationError;
use crate::lenient;
use crate::money::{self, Money};

/// Payment method used when the checkout form doesn't pick one.
pub const DEFAULT_PAYMENT_METHOD: &str = "credit_card";

/// Page size assumed when neither the request nor the response carries one.
pub const DEFAULT_PER_PAGE: u32 = 10;

// =============================================================================
// Status
// =============================================================================

/// Lifecycle status shared by orders and rentals.
///
/// Unknown values from the API map to [`OrderStatus::Other`] rather than
/// failing the record; missing or null values are `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Active,
    Returned,
    Overdue,
    Completed,
    Cancelled,
    Refunded,
    Other,
}

impl OrderStatus {
    /// Parses an API status string, case-insensitively.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "" | "PENDING" => OrderStatus::Pending,
            "CONFIRMED" => OrderStatus::Confirmed,
            "PROCESSING" => OrderStatus::Processing,
            "SHIPPED" => OrderStatus::Shipped,
            "DELIVERED" => OrderStatus::Delivered,
            "ACTIVE" => OrderStatus::Active,
            "RETURNED" => OrderStatus::Returned,
            "OVERDUE" => OrderStatus::Overdue,
            "COMPLETED" => OrderStatus::Completed,
            "CANCELLED" | "CANCELED" => OrderStatus::Cancelled,
            "REFUNDED" => OrderStatus::Refunded,
            _ => OrderStatus::Other,
        }
    }

    /// Checks if no further transitions are expected.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered
                | OrderStatus::Returned
                | OrderStatus::Completed
                | OrderStatus::Cancelled
                | OrderStatus::Refunded
        )
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = lenient::string(deserializer)?;
        Ok(OrderStatus::parse(&raw))
    }
}

fn pending<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    string_or(deserializer, "PENDING")
}

fn customer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    string_or(deserializer, "CUSTOMER")
}

fn active<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    string_or(deserializer, "ACTIVE")
}

fn string_or<'de, D: Deserializer<'de>>(deserializer: D, fallback: &str) -> Result<String, D::Error> {
    Ok(lenient::opt_string(deserializer)?.unwrap_or_else(|| fallback.to_string()))
}

fn pending_default() -> String {
    "PENDING".to_string()
}

fn one() -> i64 {
    1
}

// =============================================================================
// Address
// =============================================================================

/// Postal address; every part defaults to "".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Address {
    #[serde(deserialize_with = "lenient::string", default)]
    pub street: String,
    #[serde(deserialize_with = "lenient::string", default)]
    pub city: String,
    #[serde(deserialize_with = "lenient::string", default)]
    pub state: String,
    #[serde(deserialize_with = "lenient::string", default)]
    pub zip: String,
    #[serde(deserialize_with = "lenient::string", default)]
    pub country: String,
}

/// `null` or a malformed address becomes the all-empty address.
fn address<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
    Ok(opt_address(deserializer)?.unwrap_or_default())
}

fn opt_address<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Address>, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    Ok(match raw {
        Value::Object(_) => serde_json::from_value(raw).ok(),
        _ => None,
    })
}

// =============================================================================
// Orders
// =============================================================================

/// A line of a placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(deserialize_with = "lenient::id", default)]
    pub id: String,
    #[serde(deserialize_with = "lenient::string", default)]
    pub name: String,
    #[serde(with = "money::dollars", default)]
    pub price: Money,
    #[serde(deserialize_with = "lenient::int_or_one", default = "one")]
    pub quantity: i64,
    #[serde(with = "money::dollars", default)]
    pub subtotal: Money,
    #[serde(deserialize_with = "lenient::opt_id", default)]
    pub product_id: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub image_url: Option<String>,
}

/// A placed purchase order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(deserialize_with = "lenient::id", default)]
    pub id: String,
    #[serde(deserialize_with = "lenient::opt_id", default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(with = "money::dollars", default)]
    pub total: Money,
    #[serde(deserialize_with = "lenient::list", default)]
    pub items: Vec<OrderItem>,
    #[serde(deserialize_with = "address", default)]
    pub shipping_address: Address,
    #[serde(deserialize_with = "opt_address", default)]
    pub billing_address: Option<Address>,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub order_number: Option<String>,
    #[serde(deserialize_with = "pending", default = "pending_default")]
    pub payment_status: String,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub payment_method: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub shipping_method: Option<String>,
    #[serde(with = "money::dollars", default)]
    pub shipping_cost: Money,
    #[serde(with = "money::dollars", default)]
    pub tax: Money,
    #[serde(with = "money::dollars", default)]
    pub discount: Money,
    #[serde(deserialize_with = "lenient::string", default)]
    pub notes: String,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub tracking_number: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub estimated_delivery: Option<String>,
    #[serde(deserialize_with = "lenient::string", default)]
    pub customer_name: String,
    #[serde(deserialize_with = "lenient::string", default)]
    pub customer_email: String,
    #[serde(deserialize_with = "lenient::string", default)]
    pub customer_phone: String,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub created_at: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub updated_at: Option<String>,
}

impl Order {
    /// Human-facing order number, falling back to the id.
    pub fn order_number(&self) -> &str {
        self.order_number.as_deref().unwrap_or(&self.id)
    }

    /// Billing address, falling back to the shipping address.
    pub fn billing_address(&self) -> &Address {
        self.billing_address.as_ref().unwrap_or(&self.shipping_address)
    }
}

// =============================================================================
// Rentals
// =============================================================================

/// A line of a placed rental.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalItem {
    #[serde(deserialize_with = "lenient::id", default)]
    pub id: String,
    #[serde(deserialize_with = "lenient::string", default)]
    pub name: String,
    #[serde(with = "money::dollars", default)]
    pub rental_price: Money,
    #[serde(deserialize_with = "lenient::int_or_one", default = "one")]
    pub quantity: i64,
    #[serde(deserialize_with = "lenient::int_or_one", default = "one")]
    pub days: i64,
    #[serde(with = "money::dollars", default)]
    pub subtotal: Money,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub start_date: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub end_date: Option<String>,
    #[serde(deserialize_with = "lenient::opt_id", default)]
    pub product_id: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub image_url: Option<String>,
}

/// A placed rental.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rental {
    #[serde(deserialize_with = "lenient::id", default)]
    pub id: String,
    #[serde(deserialize_with = "lenient::opt_id", default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(with = "money::dollars", default)]
    pub total: Money,
    #[serde(deserialize_with = "lenient::list", default)]
    pub items: Vec<RentalItem>,
    #[serde(deserialize_with = "address", default)]
    pub shipping_address: Address,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub rental_number: Option<String>,
    #[serde(deserialize_with = "pending", default = "pending_default")]
    pub payment_status: String,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub payment_method: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub shipping_method: Option<String>,
    #[serde(with = "money::dollars", default)]
    pub shipping_cost: Money,
    #[serde(with = "money::dollars", default)]
    pub tax: Money,
    #[serde(with = "money::dollars", default)]
    pub discount: Money,
    #[serde(deserialize_with = "lenient::string", default)]
    pub notes: String,
    #[serde(with = "money::dollars", default)]
    pub deposit_amount: Money,
    #[serde(deserialize_with = "pending", default = "pending_default")]
    pub deposit_status: String,
    /// Late fee as a fraction of the daily rate.
    #[serde(deserialize_with = "lenient::decimal", default)]
    pub late_fee_rate: f64,
    #[serde(deserialize_with = "lenient::truthy", default)]
    pub damage_waiver: bool,
    #[serde(deserialize_with = "lenient::string", default)]
    pub customer_name: String,
    #[serde(deserialize_with = "lenient::string", default)]
    pub customer_email: String,
    #[serde(deserialize_with = "lenient::string", default)]
    pub customer_phone: String,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub created_at: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub updated_at: Option<String>,
}

impl Rental {
    /// Human-facing rental number, falling back to the id.
    pub fn rental_number(&self) -> &str {
        self.rental_number.as_deref().unwrap_or(&self.id)
    }
}

// =============================================================================
// Users
// =============================================================================

/// The signed-in customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "lenient::id", default)]
    pub id: String,
    #[serde(deserialize_with = "lenient::string", default)]
    pub name: String,
    #[serde(deserialize_with = "lenient::string", default)]
    pub email: String,
    #[serde(deserialize_with = "customer", default = "customer_default")]
    pub role: String,
    #[serde(deserialize_with = "lenient::string", default)]
    pub first_name: String,
    #[serde(deserialize_with = "lenient::string", default)]
    pub last_name: String,
    #[serde(deserialize_with = "lenient::string", default)]
    pub phone: String,
    #[serde(deserialize_with = "lenient::string", default)]
    pub company: String,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub profile_image: Option<String>,
    #[serde(deserialize_with = "lenient::list", default)]
    pub addresses: Vec<Address>,
    #[serde(deserialize_with = "active", default = "active_default")]
    pub status: String,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub last_login: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub created_at: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub updated_at: Option<String>,
}

fn customer_default() -> String {
    "CUSTOMER".to_string()
}

fn active_default() -> String {
    "ACTIVE".to_string()
}

impl User {
    /// `name`, or first and last name joined when the API omits it.
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl<T: DeserializeOwned> Page<T> {
    /// Normalizes a list response into a page.
    ///
    /// ## Accepted Envelopes
    /// ```text
    /// { "<collection>": [...], page?, per_page?, total?, total_pages? }
    /// [ ... ]
    /// { "data": [...], page?, per_page?, total?, total_pages? }
    /// ```
    /// Missing metadata falls back to the request's `page` / `per_page`, then
    /// to page 1 of 10; `total` defaults to the item count and `total_pages`
    /// to `ceil(total / per_page)`. Elements that don't decode as `T` are
    /// skipped.
    pub fn from_response(
        response: Value,
        collection: &str,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<Self, ValidationError> {
        let (raw_items, meta) = match response {
            Value::Array(items) => (items, Map::new()),
            Value::Object(mut obj) => {
                let items = match obj.remove(collection) {
                    Some(Value::Array(items)) => items,
                    _ => match obj.remove("data") {
                        Some(Value::Array(items)) => items,
                        _ => return Err(unrecognized(collection)),
                    },
                };
                (items, obj)
            }
            _ => return Err(unrecognized(collection)),
        };

        let items: Vec<T> = raw_items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();

        let page = meta_positive(&meta, "page")
            .and_then(|n| u32::try_from(n).ok())
            .or(page)
            .unwrap_or(1);
        let per_page = meta_positive(&meta, "per_page")
            .and_then(|n| u32::try_from(n).ok())
            .or(per_page)
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PER_PAGE);
        let total = meta_positive(&meta, "total").unwrap_or(items.len() as u64);
        let total_pages = meta_positive(&meta, "total_pages")
            .unwrap_or_else(|| total.div_ceil(u64::from(per_page)));

        Ok(Page {
            items,
            page,
            per_page,
            total,
            total_pages,
        })
    }
}

impl<T> Page<T> {
    /// Checks if a later page exists.
    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages
    }
}

fn unrecognized(collection: &str) -> ValidationError {
    ValidationError::InvalidFormat {
        field: collection.to_string(),
        reason: "unrecognized list envelope".to_string(),
    }
}

fn meta_positive(meta: &Map<String, Value>, field: &str) -> Option<u64> {
    match meta.get(field)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .filter(|n| *n > 0)
}

// =============================================================================
// Checkout Requests
// =============================================================================

/// A purchase line in an order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: String,
    pub quantity: i64,
}

/// A rental line in a rental request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalLine {
    pub product_id: String,
    pub quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end_date: Option<DateTime<Utc>>,
}

/// Payload for `POST /orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub items: Vec<OrderLine>,
    pub shipping_address: Address,
    pub payment_method: String,
    #[serde(default)]
    pub payment_details: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub billing_address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub shipping_method: Option<String>,
}

impl OrderRequest {
    /// Builds an order from the cart's purchase lines.
    pub fn from_cart(cart: &Cart, shipping_address: Address) -> Self {
        OrderRequest {
            items: cart
                .purchase_items()
                .map(|item| OrderLine {
                    product_id: item.product.id.clone(),
                    quantity: item.quantity,
                })
                .collect(),
            shipping_address,
            payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
            payment_details: Map::new(),
            billing_address: None,
            notes: None,
            shipping_method: None,
        }
    }

    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = non_empty(method.into()).unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string());
        self
    }

    pub fn with_billing_address(mut self, address: Address) -> Self {
        self.billing_address = Some(address);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = non_empty(notes.into());
        self
    }

    pub fn with_shipping_method(mut self, method: impl Into<String>) -> Self {
        self.shipping_method = non_empty(method.into());
        self
    }
}

/// Payload for `POST /rentals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalRequest {
    pub items: Vec<RentalLine>,
    pub shipping_address: Address,
    pub payment_method: String,
    #[serde(default)]
    pub payment_details: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub damage_waiver: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub shipping_method: Option<String>,
}

impl RentalRequest {
    /// Builds a rental from the cart's rental lines.
    pub fn from_cart(cart: &Cart, shipping_address: Address) -> Self {
        RentalRequest {
            items: cart
                .rental_items()
                .map(|item| RentalLine {
                    product_id: item.product.id.clone(),
                    quantity: item.quantity,
                    start_date: item.rental_range.map(|r| r.start_date),
                    end_date: item.rental_range.map(|r| r.end_date),
                })
                .collect(),
            shipping_address,
            payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
            payment_details: Map::new(),
            damage_waiver: None,
            notes: None,
            shipping_method: None,
        }
    }

    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = non_empty(method.into()).unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string());
        self
    }

    pub fn with_damage_waiver(mut self, waiver: bool) -> Self {
        self.damage_waiver = Some(waiver);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = non_empty(notes.into());
        self
    }

    pub fn with_shipping_method(mut self, method: impl Into<String>) -> Self {
        self.shipping_method = non_empty(method.into());
        self
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Product, RentalRange};
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_order_defaults() {
        let order: Order = serde_json::from_value(json!({
            "id": 501,
            "total": "42.10",
            "status": null,
            "items": [{"name": "Saw", "price": 21.05, "quantity": "0"}],
            "shipping_address": null
        }))
        .unwrap();

        assert_eq!(order.id, "501");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total.cents(), 4210);
        assert_eq!(order.items[0].quantity, 1);
        assert_eq!(order.items[0].price.cents(), 2105);
        assert_eq!(order.shipping_address, Address::default());
        assert_eq!(order.payment_status, "PENDING");
        assert_eq!(order.order_number(), "501");
        assert_eq!(order.billing_address(), &order.shipping_address);
    }

    #[test]
    fn test_order_billing_and_number_when_present() {
        let order: Order = serde_json::from_value(json!({
            "id": "o-1",
            "order_number": "SF-0001",
            "shipping_address": {"street": "1 Main", "city": "Springfield"},
            "billing_address": {"street": "9 Elm"}
        }))
        .unwrap();

        assert_eq!(order.order_number(), "SF-0001");
        assert_eq!(order.shipping_address.city, "Springfield");
        assert_eq!(order.billing_address().street, "9 Elm");
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(OrderStatus::parse("shipped"), OrderStatus::Shipped);
        assert_eq!(OrderStatus::parse("CANCELED"), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::parse("LOST_IN_SPACE"), OrderStatus::Other);
        assert!(OrderStatus::Refunded.is_final());
        assert!(!OrderStatus::Active.is_final());

        let status: OrderStatus = serde_json::from_value(json!("OVERDUE")).unwrap();
        assert_eq!(status, OrderStatus::Overdue);
        assert_eq!(serde_json::to_value(OrderStatus::Overdue).unwrap(), json!("OVERDUE"));
    }

    #[test]
    fn test_rental_defaults() {
        let rental: Rental = serde_json::from_value(json!({
            "id": 9,
            "items": [{"rental_price": "15", "days": null}],
            "damage_waiver": 1,
            "deposit_amount": "100"
        }))
        .unwrap();

        assert_eq!(rental.items[0].days, 1);
        assert_eq!(rental.items[0].quantity, 1);
        assert_eq!(rental.items[0].rental_price.cents(), 1500);
        assert!(rental.damage_waiver);
        assert_eq!(rental.deposit_amount.cents(), 10000);
        assert_eq!(rental.deposit_status, "PENDING");
        assert_eq!(rental.rental_number(), "9");
    }

    #[test]
    fn test_user_defaults() {
        let user: User = serde_json::from_value(json!({
            "id": 3,
            "first_name": "Ada",
            "last_name": "Lovelace",
            "role": null
        }))
        .unwrap();

        assert_eq!(user.role, "CUSTOMER");
        assert_eq!(user.status, "ACTIVE");
        assert_eq!(user.display_name(), "Ada Lovelace");
        assert!(user.addresses.is_empty());
    }

    #[test]
    fn test_page_from_named_collection() {
        let page: Page<Product> = Page::from_response(
            json!({"products": [{"id": 1}, {"id": 2}], "total": 12, "page": 2}),
            "products",
            None,
            Some(5),
        )
        .unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.page, 2);
        assert_eq!(page.per_page, 5);
        assert_eq!(page.total, 12);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next());
    }

    #[test]
    fn test_page_from_bare_array() {
        let items: Vec<Value> = (1..=11).map(|i| json!({"id": i})).collect();
        let page: Page<Product> = Page::from_response(Value::Array(items), "products", None, None).unwrap();

        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, DEFAULT_PER_PAGE);
        assert_eq!(page.total, 11);
        assert_eq!(page.total_pages, 2);
    }

    #[test]
    fn test_page_from_data_envelope() {
        let page: Page<Order> = Page::from_response(
            json!({"data": [{"id": "a"}, "garbage", {"id": "b"}], "per_page": 2, "total_pages": 7}),
            "orders",
            Some(3),
            None,
        )
        .unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.page, 3);
        assert_eq!(page.per_page, 2);
        assert_eq!(page.total, 2);
        assert_eq!(page.total_pages, 7);
    }

    #[test]
    fn test_page_rejects_unknown_envelope() {
        let err = Page::<Product>::from_response(json!({"results": []}), "products", None, None).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));

        assert!(Page::<Product>::from_response(json!("nope"), "products", None, None).is_err());
    }

    fn mixed_cart() -> Cart {
        let range = RentalRange::from_dates(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
        );
        let mut cart = Cart::new();
        cart.add_item(Product::new("buy", "Saw", Money::from_cents(2000)), 2, false, None)
            .unwrap();
        cart.add_item(
            Product::new("rent", "Lift", Money::from_cents(900000)).with_rental_price(Money::from_cents(15000)),
            1,
            true,
            Some(range),
        )
        .unwrap();
        cart
    }

    #[test]
    fn test_order_request_from_cart() {
        let request = OrderRequest::from_cart(&mixed_cart(), Address::default())
            .with_notes("")
            .with_shipping_method("ground");

        assert_eq!(
            request.items,
            vec![OrderLine {
                product_id: "buy".to_string(),
                quantity: 2
            }]
        );
        assert_eq!(request.payment_method, "credit_card");

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("notes").is_none());
        assert!(json.get("billing_address").is_none());
        assert_eq!(json["shipping_method"], "ground");
        assert_eq!(json["payment_details"], json!({}));
    }

    #[test]
    fn test_rental_request_from_cart() {
        let request = RentalRequest::from_cart(&mixed_cart(), Address::default())
            .with_payment_method("")
            .with_damage_waiver(true);

        assert_eq!(request.items.len(), 1);
        assert_eq!(request.items[0].product_id, "rent");
        assert_eq!(request.payment_method, "credit_card");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["damage_waiver"], true);
        assert_eq!(json["items"][0]["start_date"], "2024-01-01T00:00:00Z");
        assert_eq!(json["items"][0]["end_date"], "2024-01-04T00:00:00Z");
    }
}
