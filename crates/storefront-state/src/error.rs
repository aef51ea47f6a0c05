//! # State Error Types
//!
//! Errors produced by the store, the fetch coordinator and the data service.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       State Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Fetch       │  │     Shape       │  │     Configuration       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Producer       │  │  Encode         │  │  InvalidConfig          │ │
//! │  │  ProducerPanic  │  │  Decode         │  │  ConfigLoadFailed       │ │
//! │  │  TaskAborted    │  │                 │  │  ConfigSaveFailed       │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │      API        │  │      Cart       │  │      Validation         │ │
//! │  │  Api(ApiError)  │  │  Cart(CoreError)│  │  bad query / limit      │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `StateError` is `Clone`: one failed fetch is handed to every caller that
//! joined it, and the producer's own error is shared behind an `Arc` so all of
//! them see the same instance.

use std::error::Error as StdError;
use std::sync::Arc;

use storefront_core::{CoreError, ValidationError};
use thiserror::Error;

use crate::api::ApiError;

/// Result type alias for state operations.
pub type StateResult<T> = Result<T, StateError>;

/// A producer's failure, shared by every waiter of the same fetch.
pub type SharedError = Arc<dyn StdError + Send + Sync>;

#[derive(Debug, Clone, Error)]
pub enum StateError {
    // =========================================================================
    // Fetch Errors
    // =========================================================================
    /// The producer returned an error.
    #[error("Fetch '{key}' failed: {source}")]
    Producer {
        key: String,
        #[source]
        source: SharedError,
    },

    /// The producer panicked; the panic was contained to this key.
    #[error("Fetch '{key}' panicked: {message}")]
    ProducerPanicked { key: String, message: String },

    /// The producer task went away without reporting (runtime shut down).
    #[error("Fetch '{key}' was aborted before completing")]
    TaskAborted { key: String },

    // =========================================================================
    // Shape Errors
    // =========================================================================
    /// A value could not be encoded as JSON for storage.
    #[error("Cannot store value for '{key}': {reason}")]
    Encode { key: String, reason: String },

    /// A stored value does not have the requested shape.
    #[error("Value for '{key}' has an unexpected shape: {reason}")]
    Decode { key: String, reason: String },

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// A storefront API call failed outside a fetch.
    #[error("Storefront API error: {0}")]
    Api(#[from] ApiError),

    /// A cart rule was violated.
    #[error("Cart error: {0}")]
    Cart(#[from] CoreError),

    /// A service argument was rejected before any call was made.
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for StateError {
    fn from(err: std::io::Error) -> Self {
        StateError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for StateError {
    fn from(err: toml::de::Error) -> Self {
        StateError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for StateError {
    fn from(err: toml::ser::Error) -> Self {
        StateError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl StateError {
    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            StateError::InvalidConfig(_) | StateError::ConfigLoadFailed(_) | StateError::ConfigSaveFailed(_)
        )
    }

    /// The storefront API error behind this failure, whether it came from a
    /// direct call or from inside a fetch producer.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            StateError::Api(err) => Some(err),
            StateError::Producer { source, .. } => source.downcast_ref::<ApiError>(),
            _ => None,
        }
    }

    /// The producer's own error, if that is what failed.
    pub fn producer_error(&self) -> Option<&SharedError> {
        match self {
            StateError::Producer { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The key of the failed fetch, for fetch and shape errors.
    pub fn key(&self) -> Option<&str> {
        match self {
            StateError::Producer { key, .. }
            | StateError::ProducerPanicked { key, .. }
            | StateError::TaskAborted { key }
            | StateError::Encode { key, .. }
            | StateError::Decode { key, .. } => Some(key),
            _ => None,
        }
    }
}
