//! # Cart
//!
//! The shopping cart aggregate: an ordered list of line items and a derived
//! total that is recomputed after every mutation.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Operations                                      │
//! │                                                                         │
//! │  UI Action               Operation              Cart Change             │
//! │  ─────────               ─────────              ───────────             │
//! │                                                                         │
//! │  Add to cart ──────────► add_item() ──────────► merge or push line     │
//! │                                                                         │
//! │  Change qty / dates ───► update_item(i) ──────► items[i] rewritten     │
//! │                                                                         │
//! │  Remove ───────────────► remove_item(i) ──────► items.remove(i)        │
//! │                                                                         │
//! │  Empty cart ───────────► clear() ─────────────► items.clear()          │
//! │                                                                         │
//! │  add/update end in recalculate(): subtotals, then a checked total.      │
//! │  remove/clear adjust the total directly.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Line Identity
//! A line is identified by `(product.id, is_rental)`. Renting and buying the
//! same product are two lines; adding the same product in the same mode
//! increases the quantity of the existing line.
//!
//! ## Out-of-range indexes
//! `update_item` and `remove_item` ignore an index past the end of the cart
//! and return the cart unchanged. UI call sites hold indexes from a
//! possibly older render, so this is not an error.

use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Product, RentalRange};
use crate::validation::{validate_cart_size, validate_price, validate_product_id, validate_quantity};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

// =============================================================================
// Cart Item
// =============================================================================

/// A line in the cart.
///
/// `subtotal` is derived; it is rewritten by the owning [`Cart`] on every
/// mutation and never trusted from input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartItem {
    /// Snapshot of the product taken when the line was created.
    pub product: Product,

    /// Quantity, always in `1..=MAX_ITEM_QUANTITY`.
    pub quantity: i64,

    /// Rental line (priced per day) vs purchase line.
    pub is_rental: bool,

    /// Rental period; only rental lines carry one.
    #[serde(alias = "rentalDates", default)]
    pub rental_range: Option<RentalRange>,

    /// Price of this line.
    #[serde(default)]
    pub subtotal: Money,
}

impl CartItem {
    /// Returns true if this line has the given identity.
    #[inline]
    pub fn matches(&self, product_id: &str, is_rental: bool) -> bool {
        self.product.id == product_id && self.is_rental == is_rental
    }

    /// Billable rental days, when this is a rental line with a range.
    pub fn rental_days(&self) -> Option<i64> {
        if !self.is_rental {
            return None;
        }
        self.rental_range.map(|range| range.days())
    }

    /// Computes the line price from the current quantity and range.
    ///
    /// ## Pricing Rule
    /// ```text
    /// rental + range:  rental_price × quantity × days
    /// otherwise:       price × quantity
    /// ```
    /// A rental line for a product without a rental price is priced at zero.
    ///
    /// Returns [`CoreError::Overflow`] when the product does not fit in
    /// `Money`.
    pub fn compute_subtotal(&self) -> CoreResult<Money> {
        let subtotal = match self.rental_days() {
            Some(days) => {
                let per_day = self.product.rental_price.unwrap_or_default();
                per_day.checked_mul(self.quantity).and_then(|m| m.checked_mul(days))
            }
            None => self.product.price.checked_mul(self.quantity),
        };
        subtotal.ok_or_else(|| CoreError::Overflow {
            product_id: self.product.id.clone(),
        })
    }
}

/// Line-level checks shared by `add_item` and stored carts.
fn validate_line(product: &Product, quantity: i64) -> CoreResult<()> {
    validate_product_id(&product.id)?;
    validate_quantity(quantity)?;
    validate_price("price", product.price)?;
    if let Some(per_day) = product.rental_price {
        validate_price("rental price", per_day)?;
    }
    Ok(())
}

// =============================================================================
// Cart
// =============================================================================

/// The shopping cart.
///
/// ## Invariants
/// - `total == Σ items[i].subtotal` after every public operation
/// - Lines are unique by `(product.id, is_rental)`
/// - Every quantity is in `1..=MAX_ITEM_QUANTITY` (999)
/// - At most `MAX_CART_ITEMS` (100) lines
/// - No negative unit prices, and the total fits in `Money`
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct Cart {
    items: Vec<CartItem>,
    total: Money,
}

impl Cart {
    /// Creates a new empty cart.
    pub fn new() -> Self {
        Cart {
            items: Vec::new(),
            total: Money::zero(),
        }
    }

    /// Builds a cart from existing lines, recomputing every derived field.
    ///
    /// The lines are held to the same rules as `add_item`: valid ids and
    /// quantities, non-negative prices, unique identities, at most
    /// `MAX_CART_ITEMS` lines and a total that fits. Purchase lines lose any
    /// rental range.
    pub fn from_items(items: Vec<CartItem>) -> CoreResult<Self> {
        if items.len() > MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge { max: MAX_CART_ITEMS });
        }

        let mut cart = Cart::new();
        for mut item in items {
            validate_line(&item.product, item.quantity)?;
            if cart.items.iter().any(|i| i.matches(&item.product.id, item.is_rental)) {
                return Err(CoreError::DuplicateLine {
                    product_id: item.product.id,
                    is_rental: item.is_rental,
                });
            }
            if !item.is_rental {
                item.rental_range = None;
            }
            cart.items.push(item);
        }

        cart.recalculate()?;
        Ok(cart)
    }

    /// Adds a product or increases the quantity of its matching line.
    ///
    /// ## Behavior
    /// - Line with the same `(product.id, is_rental)` exists: quantity grows,
    ///   and a supplied `rental_range` replaces the stored one
    /// - Otherwise: a new line is appended
    /// - `rental_range` is ignored for purchase lines
    ///
    /// ## Errors
    /// - Empty product id, non-positive quantity, negative price
    /// - Merged quantity above `MAX_ITEM_QUANTITY`
    /// - New line beyond `MAX_CART_ITEMS`
    /// - Line subtotal or total beyond what `Money` holds
    ///
    /// The cart is unchanged when an error is returned.
    pub fn add_item(
        &mut self,
        product: Product,
        quantity: i64,
        is_rental: bool,
        rental_range: Option<RentalRange>,
    ) -> CoreResult<&Cart> {
        validate_line(&product, quantity)?;

        let rental_range = if is_rental { rental_range } else { None };
        let mut next = self.clone();

        if let Some(item) = next
            .items
            .iter_mut()
            .find(|i| i.matches(&product.id, is_rental))
        {
            let merged = item.quantity + quantity;
            if merged > MAX_ITEM_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    product_id: product.id,
                    requested: merged,
                    max: MAX_ITEM_QUANTITY,
                });
            }
            item.quantity = merged;
            if rental_range.is_some() {
                item.rental_range = rental_range;
            }
        } else {
            validate_cart_size(next.items.len())
                .map_err(|_| CoreError::CartTooLarge { max: MAX_CART_ITEMS })?;

            next.items.push(CartItem {
                product,
                quantity,
                is_rental,
                rental_range,
                subtotal: Money::zero(),
            });
        }

        next.recalculate()?;
        *self = next;
        Ok(self)
    }

    /// Sets the quantity (and, for rental lines, optionally the range) of the
    /// line at `index`.
    ///
    /// An out-of-range index returns the cart unchanged. The quantity is
    /// validated only for an existing line.
    pub fn update_item(
        &mut self,
        index: usize,
        quantity: i64,
        rental_range: Option<RentalRange>,
    ) -> CoreResult<&Cart> {
        if index >= self.items.len() {
            return Ok(self);
        }
        validate_quantity(quantity)?;

        let mut next = self.clone();
        let item = &mut next.items[index];
        item.quantity = quantity;
        if item.is_rental && rental_range.is_some() {
            item.rental_range = rental_range;
        }

        next.recalculate()?;
        *self = next;
        Ok(self)
    }

    /// Removes the line at `index`; out-of-range indexes are ignored.
    pub fn remove_item(&mut self, index: usize) -> &Cart {
        if index < self.items.len() {
            let removed = self.items.remove(index);
            // Subtotals are never negative, so this cannot underflow.
            self.total -= removed.subtotal;
        }
        self
    }

    /// Removes every line.
    pub fn clear(&mut self) -> &Cart {
        self.items.clear();
        self.total = Money::zero();
        self
    }

    /// Rewrites every subtotal, then the total. Nothing is written unless
    /// every line and the sum fit in `Money`.
    fn recalculate(&mut self) -> CoreResult<()> {
        let subtotals = self
            .items
            .iter()
            .map(CartItem::compute_subtotal)
            .collect::<CoreResult<Vec<_>>>()?;

        let mut total = Money::zero();
        for (item, subtotal) in self.items.iter().zip(&subtotals) {
            total = total.checked_add(*subtotal).ok_or_else(|| CoreError::Overflow {
                product_id: item.product.id.clone(),
            })?;
        }

        for (item, subtotal) in self.items.iter_mut().zip(subtotals) {
            item.subtotal = subtotal;
        }
        self.total = total;
        Ok(())
    }

    // =========================================================================
    // Read Access
    // =========================================================================

    /// Lines in insertion order.
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// The line at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&CartItem> {
        self.items.get(index)
    }

    /// Sum of all line subtotals.
    pub fn total(&self) -> Money {
        self.total
    }

    /// Number of distinct lines.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Sum of all line quantities.
    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Checks if the cart is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Purchase lines only (what goes into an order).
    pub fn purchase_items(&self) -> impl Iterator<Item = &CartItem> {
        self.items.iter().filter(|i| !i.is_rental)
    }

    /// Rental lines only (what goes into a rental).
    pub fn rental_items(&self) -> impl Iterator<Item = &CartItem> {
        self.items.iter().filter(|i| i.is_rental)
    }
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialization trusts only the lines; subtotals and the total are
/// recomputed so a stored cart can never come back with a stale total.
/// Lines that break a cart rule fail the whole cart.
impl<'de> Deserialize<'de> for Cart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct CartRecord {
            #[serde(default)]
            items: Vec<CartItem>,
        }

        let record = CartRecord::deserialize(deserializer)?;
        Cart::from_items(record.items).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use chrono::NaiveDate;

    fn product(id: &str, price_cents: i64) -> Product {
        Product::new(id, format!("Product {id}"), Money::from_cents(price_cents))
    }

    fn rentable(id: &str, price_cents: i64, per_day_cents: i64) -> Product {
        product(id, price_cents).with_rental_price(Money::from_cents(per_day_cents))
    }

    fn range(start: (i32, u32, u32), end: (i32, u32, u32)) -> RentalRange {
        RentalRange::from_dates(
            NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
        )
    }

    #[test]
    fn test_add_item() {
        let mut cart = Cart::new();
        cart.add_item(product("1", 999), 2, false, None).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 2);
        assert_eq!(cart.total().cents(), 1998);
        assert_eq!(cart.items()[0].subtotal.cents(), 1998);
    }

    #[test]
    fn test_add_same_product_merges_quantity() {
        let mut cart = Cart::new();
        cart.add_item(product("P", 500), 2, false, None).unwrap();
        cart.add_item(product("P", 500), 3, false, None).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.items()[0].quantity, 5);
        assert_eq!(cart.total().cents(), 2500);
    }

    #[test]
    fn test_rent_and_buy_same_product_are_separate_lines() {
        let mut cart = Cart::new();
        let jan = range((2024, 1, 1), (2024, 1, 4));
        cart.add_item(rentable("P", 20000, 1000), 1, false, None).unwrap();
        cart.add_item(rentable("P", 20000, 1000), 1, true, Some(jan)).unwrap();

        assert_eq!(cart.item_count(), 2);
        assert_eq!(cart.purchase_items().count(), 1);
        assert_eq!(cart.rental_items().count(), 1);
        assert_eq!(cart.total().cents(), 20000 + 3000);
    }

    #[test]
    fn test_rental_subtotal_uses_days() {
        let mut cart = Cart::new();
        let jan = range((2024, 1, 1), (2024, 1, 4));
        cart.add_item(rentable("R", 50000, 1000), 2, true, Some(jan)).unwrap();

        // 10.00 × 2 × 3 days
        assert_eq!(cart.items()[0].rental_days(), Some(3));
        assert_eq!(cart.total().cents(), 6000);
    }

    #[test]
    fn test_same_day_rental_bills_one_day() {
        let mut cart = Cart::new();
        let same_day = range((2024, 1, 1), (2024, 1, 1));
        cart.add_item(rentable("R", 50000, 1000), 2, true, Some(same_day)).unwrap();

        assert_eq!(cart.total().cents(), 2000);
    }

    #[test]
    fn test_rental_without_range_uses_purchase_price() {
        let mut cart = Cart::new();
        cart.add_item(rentable("R", 50000, 1000), 1, true, None).unwrap();

        assert_eq!(cart.items()[0].rental_days(), None);
        assert_eq!(cart.total().cents(), 50000);
    }

    #[test]
    fn test_rental_without_rental_price_is_free() {
        let mut cart = Cart::new();
        let jan = range((2024, 1, 1), (2024, 1, 4));
        cart.add_item(product("R", 50000), 1, true, Some(jan)).unwrap();

        assert!(cart.total().is_zero());
    }

    #[test]
    fn test_merge_overwrites_rental_range_only_when_supplied() {
        let mut cart = Cart::new();
        let short = range((2024, 1, 1), (2024, 1, 2));
        let long = range((2024, 1, 1), (2024, 1, 8));
        cart.add_item(rentable("R", 0, 100), 1, true, Some(short)).unwrap();

        cart.add_item(rentable("R", 0, 100), 1, true, None).unwrap();
        assert_eq!(cart.items()[0].rental_range, Some(short));
        assert_eq!(cart.total().cents(), 100 * 2);

        cart.add_item(rentable("R", 0, 100), 1, true, Some(long)).unwrap();
        assert_eq!(cart.items()[0].rental_range, Some(long));
        assert_eq!(cart.total().cents(), 100 * 3 * 7);
    }

    #[test]
    fn test_purchase_lines_never_carry_a_range() {
        let mut cart = Cart::new();
        let jan = range((2024, 1, 1), (2024, 1, 4));
        cart.add_item(rentable("P", 700, 100), 1, false, Some(jan)).unwrap();
        assert_eq!(cart.items()[0].rental_range, None);

        cart.update_item(0, 2, Some(jan)).unwrap();
        assert_eq!(cart.items()[0].rental_range, None);
        assert_eq!(cart.total().cents(), 1400);
    }

    #[test]
    fn test_update_item_recomputes() {
        let mut cart = Cart::new();
        let jan = range((2024, 1, 1), (2024, 1, 4));
        let week = range((2024, 1, 1), (2024, 1, 8));
        cart.add_item(product("A", 1000), 1, false, None).unwrap();
        cart.add_item(rentable("B", 0, 500), 1, true, Some(jan)).unwrap();

        cart.update_item(0, 4, None).unwrap();
        cart.update_item(1, 2, Some(week)).unwrap();

        assert_eq!(cart.items()[0].subtotal.cents(), 4000);
        assert_eq!(cart.items()[1].subtotal.cents(), 500 * 2 * 7);
        assert_eq!(cart.total().cents(), 4000 + 7000);
    }

    #[test]
    fn test_out_of_range_index_is_a_no_op() {
        let mut cart = Cart::new();
        cart.add_item(product("A", 1000), 1, false, None).unwrap();
        cart.add_item(product("B", 250), 2, false, None).unwrap();
        let before = cart.clone();

        assert_eq!(cart.remove_item(99), &before);
        assert_eq!(cart.update_item(99, 5, None).unwrap(), &before);
        // Even an invalid quantity is ignored for a missing line
        assert_eq!(cart.update_item(2, 0, None).unwrap(), &before);
        assert_eq!(cart.total().cents(), 1500);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cart = Cart::new();
        cart.add_item(product("A", 1000), 1, false, None).unwrap();
        cart.add_item(product("B", 250), 2, false, None).unwrap();

        cart.remove_item(0);
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.items()[0].product.id, "B");
        assert_eq!(cart.total().cents(), 500);

        cart.clear();
        assert!(cart.is_empty());
        assert!(cart.total().is_zero());
    }

    #[test]
    fn test_quantity_limits_leave_cart_untouched() {
        let mut cart = Cart::new();
        cart.add_item(product("A", 100), 995, false, None).unwrap();
        let before = cart.clone();

        let err = cart.add_item(product("A", 100), 10, false, None).unwrap_err();
        assert!(matches!(err, CoreError::QuantityTooLarge { requested: 1005, .. }));
        assert_eq!(cart, before);

        assert!(cart.add_item(product("B", 100), 0, false, None).is_err());
        assert!(cart.update_item(0, -3, None).is_err());
        assert!(cart.add_item(product("", 100), 1, false, None).is_err());
        assert_eq!(cart, before);
    }

    #[test]
    fn test_overflowing_amounts_leave_cart_untouched() {
        let mut cart = Cart::new();
        cart.add_item(product("A", i64::MAX / 2), 1, false, None).unwrap();
        cart.add_item(rentable("R", 100, i64::MAX / 2000), 1, true, Some(range((2026, 3, 1), (2026, 3, 2))))
            .unwrap();
        let before = cart.clone();

        // Line subtotal
        let err = cart.add_item(product("B", i64::MAX / 100), 999, false, None).unwrap_err();
        assert_eq!(err, CoreError::Overflow { product_id: "B".to_string() });
        assert_eq!(cart, before);

        // Cart total
        let err = cart.add_item(product("C", i64::MAX / 2), 1, false, None).unwrap_err();
        assert_eq!(err, CoreError::Overflow { product_id: "C".to_string() });
        assert_eq!(cart, before);

        // Rental days multiply in after quantity
        let err = cart.update_item(1, 1, Some(range((2026, 3, 1), (2036, 3, 1)))).unwrap_err();
        assert_eq!(err, CoreError::Overflow { product_id: "R".to_string() });
        assert_eq!(cart, before);
    }

    #[test]
    fn test_negative_prices_are_rejected() {
        let mut cart = Cart::new();

        assert!(matches!(
            cart.add_item(product("A", -100), 1, false, None),
            Err(CoreError::Validation(ValidationError::Negative { .. }))
        ));
        assert!(cart.add_item(rentable("R", 100, -5), 1, true, None).is_err());
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_keeps_total_in_step() {
        let mut cart = Cart::new();
        cart.add_item(product("A", 1000), 2, false, None).unwrap();
        cart.add_item(product("B", 250), 1, false, None).unwrap();

        cart.remove_item(0);
        assert_eq!(cart.total().cents(), 250);
        cart.clear();
        assert_eq!(cart.total(), Money::zero());
    }

    #[test]
    fn test_cart_size_limit() {
        let mut cart = Cart::new();
        for i in 0..MAX_CART_ITEMS {
            cart.add_item(product(&i.to_string(), 100), 1, false, None).unwrap();
        }

        let err = cart.add_item(product("one-more", 100), 1, false, None).unwrap_err();
        assert_eq!(err, CoreError::CartTooLarge { max: MAX_CART_ITEMS });

        // Merging into an existing line is still allowed
        cart.add_item(product("0", 100), 1, false, None).unwrap();
        assert_eq!(cart.items()[0].quantity, 2);
    }

    #[test]
    fn test_deserialization_recomputes_totals() {
        let mut cart = Cart::new();
        cart.add_item(product("A", 1000), 2, false, None).unwrap();

        let mut json = serde_json::to_value(&cart).unwrap();
        json["total"] = serde_json::json!(1);
        json["items"][0]["subtotal"] = serde_json::json!(1);

        let back: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(back, cart);
        assert_eq!(back.total().cents(), 2000);
    }

    #[test]
    fn test_deserialization_rejects_broken_lines() {
        let mut cart = Cart::new();
        cart.add_item(product("A", 1000), 2, false, None).unwrap();
        let valid = serde_json::to_value(&cart).unwrap();

        let mut zero_quantity = valid.clone();
        zero_quantity["items"][0]["quantity"] = serde_json::json!(0);
        assert!(serde_json::from_value::<Cart>(zero_quantity).is_err());

        let mut negative_price = valid.clone();
        negative_price["items"][0]["product"]["price"] = serde_json::json!("-5.00");
        assert!(serde_json::from_value::<Cart>(negative_price).is_err());

        let mut duplicate = valid.clone();
        let line = duplicate["items"][0].clone();
        duplicate["items"].as_array_mut().unwrap().push(line);
        let err = serde_json::from_value::<Cart>(duplicate).unwrap_err();
        assert!(err.to_string().contains("more than one line for product A"));

        let mut huge = valid.clone();
        huge["items"][0]["product"]["price"] = serde_json::json!("90000000000000000");
        assert!(serde_json::from_value::<Cart>(huge).is_err());

        let mut crowded = valid;
        let line = crowded["items"][0].clone();
        let lines: Vec<_> = (0..=MAX_CART_ITEMS)
            .map(|i| {
                let mut line = line.clone();
                line["product"]["id"] = serde_json::json!(format!("P{i}"));
                line
            })
            .collect();
        crowded["items"] = serde_json::json!(lines);
        assert!(serde_json::from_value::<Cart>(crowded).is_err());
    }

    #[test]
    fn test_deserialization_drops_range_on_purchase_lines() {
        let mut cart = Cart::new();
        cart.add_item(product("A", 1000), 1, false, None).unwrap();

        let mut json = serde_json::to_value(&cart).unwrap();
        json["items"][0]["rental_range"] = serde_json::to_value(range((2026, 3, 1), (2026, 3, 4))).unwrap();

        let back: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(back.items()[0].rental_range, None);
    }
}
