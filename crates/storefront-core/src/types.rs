//! # Domain Types
//!
//! Types shared by the cart and the API models.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────────┐          ┌─────────────────────┐              │
//! │  │      Product        │          │    RentalRange      │              │
//! │  │  ─────────────────  │          │  ─────────────────  │              │
//! │  │  id (string)        │          │  start_date         │              │
//! │  │  name               │          │  end_date           │              │
//! │  │  price        $     │          │  days() ≥ 1         │              │
//! │  │  rental_price $/day │          └─────────────────────┘              │
//! │  └─────────────────────┘                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Products are identified by `id` only. The API has used both numeric and
//! string ids over time; both are normalized to `String` on the way in.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::lenient;
use crate::money::{self, Money};
use crate::RENTAL_DAY_MS;

// =============================================================================
// Product
// =============================================================================

/// A catalog product as the storefront sees it.
///
/// Deserialization is lenient: every field may be missing,
/// `null` or loosely typed and falls back to an empty/zero default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Product identifier (numeric ids are rendered as strings).
    #[serde(deserialize_with = "lenient::id", default)]
    pub id: String,

    #[serde(deserialize_with = "lenient::string", default)]
    pub name: String,

    #[serde(deserialize_with = "lenient::string", default)]
    pub description: String,

    /// Purchase price.
    #[serde(with = "money::dollars", default)]
    #[ts(type = "string")]
    pub price: Money,

    /// Price per rental day; absent for products that can't be rented.
    #[serde(with = "money::dollars_opt", default)]
    #[ts(type = "string | null")]
    pub rental_price: Option<Money>,

    #[serde(deserialize_with = "lenient::string", default)]
    pub category: String,

    #[serde(deserialize_with = "lenient::string", default)]
    pub image_url: String,

    #[serde(deserialize_with = "lenient::int_or_zero", default)]
    pub stock: i64,

    #[serde(deserialize_with = "lenient::string", default)]
    pub sku: String,

    #[serde(deserialize_with = "lenient::string", default)]
    pub brand: String,

    #[serde(deserialize_with = "lenient::list", default)]
    pub features: Vec<String>,

    #[serde(deserialize_with = "lenient::list", default)]
    pub tags: Vec<String>,

    #[serde(deserialize_with = "lenient::truthy", default)]
    pub is_featured: bool,

    #[serde(deserialize_with = "lenient::decimal", default)]
    pub discount_percentage: f64,

    #[serde(deserialize_with = "lenient::opt_decimal", default)]
    pub rating: Option<f64>,

    #[serde(deserialize_with = "lenient::int_or_zero", default)]
    pub review_count: i64,

    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub created_at: Option<String>,

    #[serde(deserialize_with = "lenient::opt_string", default)]
    pub updated_at: Option<String>,
}

impl Product {
    /// Creates a purchasable product with every optional field empty.
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: Money) -> Self {
        Product {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            price,
            rental_price: None,
            category: String::new(),
            image_url: String::new(),
            stock: 0,
            sku: String::new(),
            brand: String::new(),
            features: Vec::new(),
            tags: Vec::new(),
            is_featured: false,
            discount_percentage: 0.0,
            rating: None,
            review_count: 0,
            created_at: None,
            updated_at: None,
        }
    }

    /// Sets the per-day rental price.
    pub fn with_rental_price(mut self, rental_price: Money) -> Self {
        self.rental_price = Some(rental_price);
        self
    }

    /// Checks if the product can be rented.
    #[inline]
    pub fn is_rentable(&self) -> bool {
        self.rental_price.is_some()
    }
}

// =============================================================================
// Rental Range
// =============================================================================

/// The period a rental line covers.
///
/// `end_date` is exclusive in the day count: Jan 1 → Jan 4 is 3 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RentalRange {
    #[serde(alias = "startDate", deserialize_with = "lenient::instant")]
    #[ts(as = "String")]
    pub start_date: DateTime<Utc>,

    #[serde(alias = "endDate", deserialize_with = "lenient::instant")]
    #[ts(as = "String")]
    pub end_date: DateTime<Utc>,
}

impl RentalRange {
    /// Creates a range from two instants.
    pub fn new(start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        RentalRange {
            start_date,
            end_date,
        }
    }

    /// Creates a range from two calendar dates, each at midnight UTC.
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Self {
        RentalRange {
            start_date: start.and_time(chrono::NaiveTime::MIN).and_utc(),
            end_date: end.and_time(chrono::NaiveTime::MIN).and_utc(),
        }
    }

    /// Number of billable days.
    ///
    /// ## Rule
    /// ```text
    /// days = max(1, ceil((end − start) / 24h))
    ///
    /// 2024-01-01 → 2024-01-04        = 3
    /// 2024-01-01 → 2024-01-01        = 1   (same day still bills one day)
    /// 2024-01-01 09:00 → 01-02 10:00 = 2   (partial days round up)
    /// end before start               = 1
    /// ```
    pub fn days(&self) -> i64 {
        let elapsed_ms = (self.end_date - self.start_date).num_milliseconds();
        let whole = elapsed_ms.div_euclid(RENTAL_DAY_MS);
        let partial = i64::from(elapsed_ms.rem_euclid(RENTAL_DAY_MS) > 0);
        (whole + partial).max(1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
