//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  A rental priced at 0.10/day, 3 units, 7 days in floating point:        │
//! │    0.1 * 3 * 7 = 2.1000000000000005  ❌                                 │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    10 cents * 3 * 7 = 210 cents                                         │
//! │                                                                         │
//! │  The storefront API sends decimal amounts ("89.99" or 89.99). They are  │
//! │  parsed digit by digit into cents, never through f64.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use storefront_core::money::Money;
//!
//! let price = Money::from_cents(1099); // $10.99
//! let line = price.checked_mul(3);     // $32.97
//! assert_eq!(line, Some(Money::from_cents(3297)));
//!
//! let parsed = Money::parse_decimal("10.99").unwrap();
//! assert_eq!(parsed, price);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents for USD).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for refunds, discounts
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Serializes as cents**: totals and subtotals travel as integers; API
///   facing fields that carry decimal amounts use [`dollars`] instead
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units (dollars and cents).
    ///
    /// ## Example
    /// ```rust
    /// use storefront_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Parses a decimal amount such as `"89.99"`, `"-5.5"` or `"12"`.
    ///
    /// Digits past the second decimal place are rounded half away from zero
    /// (`"0.125"` → 13 cents). Surrounding whitespace is ignored.
    ///
    /// ## Example
    /// ```rust
    /// use storefront_core::money::Money;
    ///
    /// assert_eq!(Money::parse_decimal("89.99").unwrap().cents(), 8999);
    /// assert_eq!(Money::parse_decimal("-5.5").unwrap().cents(), -550);
    /// assert!(Money::parse_decimal("ten").is_err());
    /// ```
    pub fn parse_decimal(input: &str) -> Result<Money, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: format!("{reason}: '{input}'"),
        };

        let trimmed = input.trim();
        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (whole, frac) = match unsigned.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (unsigned, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("empty amount"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("not a decimal number"));
        }

        let mut cents: i64 = 0;
        for digit in whole.bytes() {
            cents = cents
                .checked_mul(10)
                .and_then(|c| c.checked_add(i64::from(digit - b'0')))
                .ok_or_else(|| invalid("amount too large"))?;
        }

        let mut frac_digits = frac.bytes().map(|d| i64::from(d - b'0'));
        let tenths = frac_digits.next().unwrap_or(0);
        let hundredths = frac_digits.next().unwrap_or(0);
        let round_up = frac_digits.next().is_some_and(|d| d >= 5);

        cents = cents
            .checked_mul(100)
            .and_then(|c| c.checked_add(tenths * 10 + hundredths + i64::from(round_up)))
            .ok_or_else(|| invalid("amount too large"))?;

        Ok(Money(if negative { -cents } else { cents }))
    }

    /// Returns the value in cents (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (dollars) portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit (cents) portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity.
    ///
    /// ## User Workflow
    /// ```text
    /// Product: Cordless Drill $89.99
    /// Quantity: 2
    ///      │
    ///      ▼
    /// checked_mul(2) ← THIS FUNCTION
    ///      │
    ///      ▼
    /// Line subtotal: Some($179.98)
    /// ```
    ///
    /// `None` when the cents overflow `i64`.
    #[inline]
    pub const fn checked_mul(self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// `self + other`, or `None` when the cents overflow `i64`.
    #[inline]
    pub const fn checked_add(self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Formats the amount as a plain decimal string (`"-5.50"`), the shape
    /// the storefront API uses for prices.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, self.dollars().abs(), self.cents_part())
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows money as `$12.34` (debugging and CLI output only).
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.dollars().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Decimal (de)serialization for API payloads
// =============================================================================

/// Serde adapter for amounts the storefront API expresses in major units.
///
/// Serializes as a decimal string (`"89.99"`). Deserializes leniently: JSON
/// numbers, numeric strings, `null` and unparseable strings are all accepted;
/// anything that is not a usable amount becomes zero, mirroring how the
/// storefront UI has always treated a malformed price.
///
/// ```rust
/// use serde::Deserialize;
/// use storefront_core::money::{self, Money};
///
/// #[derive(Deserialize)]
/// struct Line {
///     #[serde(with = "money::dollars", default)]
///     price: Money,
/// }
///
/// let line: Line = serde_json::from_str(r#"{"price": "19.5"}"#).unwrap();
/// assert_eq!(line.price.cents(), 1950);
/// let line: Line = serde_json::from_str(r#"{"price": null}"#).unwrap();
/// assert!(line.price.is_zero());
/// ```
pub mod dollars {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    use super::Money;

    pub fn serialize<S: Serializer>(money: &Money, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&money.to_decimal_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Money, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(from_value(&raw).unwrap_or_default())
    }

    /// Interprets a JSON value as a decimal amount, if it is one.
    pub fn from_value(raw: &Value) -> Option<Money> {
        match raw {
            Value::Number(n) => Money::parse_decimal(&n.to_string()).ok(),
            Value::String(s) => Money::parse_decimal(s).ok(),
            _ => None,
        }
    }
}

/// Like [`dollars`], but `null`, missing and unparseable amounts stay `None`.
pub mod dollars_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    use super::{dollars, Money};

    pub fn serialize<S: Serializer>(money: &Option<Money>, serializer: S) -> Result<S::Ok, S::Error> {
        match money {
            Some(m) => serializer.serialize_str(&m.to_decimal_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Money>, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(dollars::from_value(&raw))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.dollars(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "$0.00");
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);

        let total: Money = [a, b, b].iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_checked_arithmetic() {
        let price = Money::from_cents(8999);

        assert_eq!(price.checked_mul(2), Some(Money::from_cents(17998)));
        assert_eq!(price.checked_add(price), Some(Money::from_cents(17998)));
        assert_eq!(Money::from_cents(i64::MAX / 2).checked_mul(3), None);
        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(Money::parse_decimal("89.99").unwrap().cents(), 8999);
        assert_eq!(Money::parse_decimal("12").unwrap().cents(), 1200);
        assert_eq!(Money::parse_decimal("0.5").unwrap().cents(), 50);
        assert_eq!(Money::parse_decimal(".75").unwrap().cents(), 75);
        assert_eq!(Money::parse_decimal(" 3.10 ").unwrap().cents(), 310);
        assert_eq!(Money::parse_decimal("-5.5").unwrap().cents(), -550);
        assert_eq!(Money::parse_decimal("100.0").unwrap().cents(), 10000);
    }

    #[test]
    fn test_parse_decimal_rounds_third_place() {
        assert_eq!(Money::parse_decimal("0.125").unwrap().cents(), 13);
        assert_eq!(Money::parse_decimal("0.124").unwrap().cents(), 12);
        assert_eq!(Money::parse_decimal("-0.125").unwrap().cents(), -13);
    }

    #[test]
    fn test_parse_decimal_rejects_garbage() {
        assert!(Money::parse_decimal("").is_err());
        assert!(Money::parse_decimal(".").is_err());
        assert!(Money::parse_decimal("ten").is_err());
        assert!(Money::parse_decimal("1.2.3").is_err());
        assert!(Money::parse_decimal("1e3").is_err());
        assert!(Money::parse_decimal("99999999999999999999").is_err());
    }

    #[test]
    fn test_dollars_adapter() {
        #[derive(Serialize, Deserialize)]
        struct Priced {
            #[serde(with = "dollars", default)]
            price: Money,
            #[serde(with = "dollars_opt", default)]
            rental_price: Option<Money>,
        }

        let p: Priced = serde_json::from_str(r#"{"price": 89.99, "rental_price": "12.5"}"#).unwrap();
        assert_eq!(p.price.cents(), 8999);
        assert_eq!(p.rental_price, Some(Money::from_cents(1250)));

        let p: Priced = serde_json::from_str(r#"{"price": "abc", "rental_price": null}"#).unwrap();
        assert!(p.price.is_zero());
        assert_eq!(p.rental_price, None);

        let p: Priced = serde_json::from_str("{}").unwrap();
        assert!(p.price.is_zero());
        assert_eq!(p.rental_price, None);

        let json = serde_json::to_value(Priced {
            price: Money::from_cents(1050),
            rental_price: None,
        })
        .unwrap();
        assert_eq!(json["price"], "10.50");
        assert!(json["rental_price"].is_null());
    }
}
