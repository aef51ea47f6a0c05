//! # Service Configuration
//!
//! Cache windows, de-duplication and retry settings for the data service.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOREFRONT_CATALOG_TTL_SECS=60                                     │
//! │     STOREFRONT_MAX_RETRIES=2                                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/storefront/storefront.toml (Linux)                       │
//! │     ~/Library/Application Support/com.storefront.client/... (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     5 min catalog cache, 2 min orders/rentals cache, no retries        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [cache]
//! catalog_ttl_secs = 300   # user, products, product details
//! account_ttl_secs = 120   # orders and rentals
//! dedupe = true
//!
//! [retry]
//! max_retries = 0
//! initial_backoff_ms = 200
//! max_backoff_secs = 5
//!
//! [search]
//! suggestion_limit = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use storefront_core::validation::validate_limit;
use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};
use crate::fetch::FetchOptions;
use crate::retry::RetryPolicy;

// =============================================================================
// Cache Settings
// =============================================================================

/// Freshness windows per data family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Current user, product lists and product details (seconds).
    #[serde(default = "default_catalog_ttl")]
    pub catalog_ttl_secs: u64,

    /// Orders and rentals (seconds). Shorter: these change after checkout.
    #[serde(default = "default_account_ttl")]
    pub account_ttl_secs: u64,

    /// Join in-flight fetches of the same key.
    #[serde(default = "default_true")]
    pub dedupe: bool,
}

fn default_catalog_ttl() -> u64 {
    300
}

fn default_account_ttl() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            catalog_ttl_secs: default_catalog_ttl(),
            account_ttl_secs: default_account_ttl(),
            dedupe: true,
        }
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Retry of failed API calls inside fetch producers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Additional attempts for retryable failures. 0 disables retries.
    #[serde(default)]
    pub max_retries: u32,

    /// First backoff delay (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Longest backoff delay (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_initial_backoff() -> u64 {
    200
}

fn default_max_backoff() -> u64 {
    5
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

// =============================================================================
// Search Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Suggestions requested when the caller doesn't say.
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: u32,
}

fn default_suggestion_limit() -> u32 {
    5
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            suggestion_limit: default_suggestion_limit(),
        }
    }
}

// =============================================================================
// Service Configuration
// =============================================================================

/// Complete data service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub search: SearchSettings,
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (storefront.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> StateResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading storefront config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load storefront config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> StateResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| StateError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StateError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| StateError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Storefront config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> StateResult<()> {
        validate_limit(self.search.suggestion_limit)
            .map_err(|e| StateError::InvalidConfig(format!("search.suggestion_limit: {e}")))?;

        if self.retry.max_retries > 0 && self.retry.initial_backoff_ms == 0 {
            return Err(StateError::InvalidConfig(
                "retry.initial_backoff_ms must be greater than 0 when retries are enabled".into(),
            ));
        }

        if Duration::from_millis(self.retry.initial_backoff_ms) > Duration::from_secs(self.retry.max_backoff_secs) {
            return Err(StateError::InvalidConfig(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_secs".into(),
            ));
        }

        Ok(())
    }

    /// Applies `STOREFRONT_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Applies overrides from `lookup`; unparseable values are logged and
    /// ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(name: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(value) => {
                    debug!(env_var = name, value = %raw, "Overriding config from environment");
                    Some(value)
                }
                Err(_) => {
                    warn!(env_var = name, value = %raw, "Ignoring unparseable environment override");
                    None
                }
            }
        }

        let var = "STOREFRONT_CATALOG_TTL_SECS";
        if let Some(secs) = parsed(var, lookup(var)) {
            self.cache.catalog_ttl_secs = secs;
        }

        let var = "STOREFRONT_ACCOUNT_TTL_SECS";
        if let Some(secs) = parsed(var, lookup(var)) {
            self.cache.account_ttl_secs = secs;
        }

        let var = "STOREFRONT_DEDUPE";
        if let Some(raw) = lookup(var) {
            match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.cache.dedupe = true,
                "0" | "false" | "no" | "off" => self.cache.dedupe = false,
                _ => warn!(env_var = var, value = %raw, "Ignoring unparseable environment override"),
            }
        }

        let var = "STOREFRONT_MAX_RETRIES";
        if let Some(retries) = parsed(var, lookup(var)) {
            self.retry.max_retries = retries;
        }

        let var = "STOREFRONT_SUGGESTION_LIMIT";
        if let Some(limit) = parsed(var, lookup(var)) {
            self.search.suggestion_limit = limit;
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "storefront", "client")
            .map(|dirs| dirs.config_dir().join("storefront.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Fetch options for the current user, products and product details.
    pub fn catalog_options(&self, force_refresh: bool) -> FetchOptions {
        self.options(self.cache.catalog_ttl_secs, force_refresh)
    }

    /// Fetch options for orders and rentals.
    pub fn account_options(&self, force_refresh: bool) -> FetchOptions {
        self.options(self.cache.account_ttl_secs, force_refresh)
    }

    fn options(&self, ttl_secs: u64, force_refresh: bool) -> FetchOptions {
        let options = FetchOptions::default()
            .with_cache_time(Duration::from_secs(ttl_secs))
            .force_refresh(force_refresh);
        if self.cache.dedupe {
            options
        } else {
            options.without_dedupe()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            Duration::from_millis(self.retry.initial_backoff_ms),
            Duration::from_secs(self.retry.max_backoff_secs),
        )
    }
}
