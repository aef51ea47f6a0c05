//! # Error Types
//!
//! Domain-specific error types for storefront-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  storefront-core errors (this file)                                    │
//! │  ├── CoreError        - Cart rule violations                           │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  storefront-state errors (separate crate)                              │
//! │  ├── ApiError         - What the storefront API reported               │
//! │  └── StateError       - Store / fetch / config failures                │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → StateError → UI                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An out-of-range cart index is deliberately NOT an error: index based
//! mutations silently ignore it and hand the cart back unchanged.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Cart and domain rule errors.
///
/// `Clone` so the error can travel inside shared fetch results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Cart has reached the maximum number of distinct lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Line quantity exceeds maximum allowed.
    ///
    /// ## User Workflow
    /// ```text
    /// Cart line: Drill × 995
    ///      │
    ///      ▼
    /// add_item(Drill, 10)
    ///      │
    ///      ▼
    /// QuantityTooLarge { product_id: "42", requested: 1005, max: 999 }
    /// ```
    #[error("Quantity {requested} for product {product_id} exceeds maximum allowed ({max})")]
    QuantityTooLarge {
        product_id: String,
        requested: i64,
        max: i64,
    },

    /// A line subtotal or the cart total does not fit in `Money`.
    #[error("Cart total overflows at product {product_id}")]
    Overflow { product_id: String },

    /// Two lines share the same `(product.id, is_rental)` identity.
    #[error("Cart has more than one line for product {product_id} (rental: {is_rental})")]
    DuplicateLine { product_id: String, is_rental: bool },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input or an API payload doesn't meet
/// requirements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be below zero.
    #[error("{field} cannot be negative")]
    Negative { field: String },

    /// Invalid format (e.g., unparseable amount, bad date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::QuantityTooLarge {
            product_id: "42".to_string(),
            requested: 1005,
            max: 999,
        };
        assert_eq!(
            err.to_string(),
            "Quantity 1005 for product 42 exceeds maximum allowed (999)"
        );

        let err = CoreError::CartTooLarge { max: 100 };
        assert_eq!(err.to_string(), "Cart cannot have more than 100 items");

        let err = CoreError::DuplicateLine {
            product_id: "7".to_string(),
            is_rental: true,
        };
        assert_eq!(err.to_string(), "Cart has more than one line for product 7 (rental: true)");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "product id".to_string(),
        };
        assert_eq!(err.to_string(), "product id is required");

        let err = ValidationError::InvalidFormat {
            field: "price".to_string(),
            reason: "not a number".to_string(),
        };
        assert_eq!(err.to_string(), "price has invalid format: not a number");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
