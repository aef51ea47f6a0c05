//! # storefront-core: Pure Business Logic for the Storefront Client
//!
//! This crate holds everything about the storefront that can be computed
//! without touching the network: money, the shopping cart aggregate and the
//! normalization of raw API payloads into typed records.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Storefront Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Storefront UI                                │   │
//! │  │    Catalog ──► Product ──► Cart ──► Checkout ──► Orders        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             storefront-state (store, fetch, service)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ storefront-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  models   │  │   money   │  │   cart    │  │ validation│  │   │
//! │  │   │  Product  │  │   Money   │  │   Cart    │  │   rules   │  │   │
//! │  │   │  Order    │  │  dollars  │  │ CartItem  │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO ASYNC • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`types`] - Product and rental range types shared by cart and models
//! - [`cart`] - The cart aggregate and its recomputation rules
//! - [`models`] - Orders, rentals, users, paginated envelopes, requests
//! - [`error`] - Domain error types
//! - [`lenient`] - Field coercion for loosely typed API payloads
//! - [`validation`] - Business rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use storefront_core::{Cart, Money, Product};
//!
//! let drill = Product::new("42", "Cordless Drill", Money::from_cents(8999));
//!
//! let mut cart = Cart::new();
//! cart.add_item(drill.clone(), 2, false, None).unwrap();
//! cart.add_item(drill, 1, false, None).unwrap();
//!
//! // Same product, same purchase mode: one line with quantity 3
//! assert_eq!(cart.item_count(), 1);
//! assert_eq!(cart.total().cents(), 26997);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod lenient;
pub mod models;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartItem};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart.
///
/// ## Business Reason
/// Prevents runaway carts and keeps checkout payloads reasonable.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single cart line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10)
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Length of one rental day in milliseconds.
pub const RENTAL_DAY_MS: i64 = 24 * 60 * 60 * 1000;
