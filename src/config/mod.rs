//! # Configuration
//!
//! Process-wide settings injected into every service at construction. The
//! configuration is immutable once loaded and shared as `Arc<OrderCoreConfig>`.
//!
//! Every section has defaults, so an empty source set yields a usable
//! configuration for tests and local runs.

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderCoreConfig {
    pub database: DatabaseConfig,
    pub transactions: TransactionConfig,
    pub composer: ComposerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. Falls back to `DATABASE_URL` when unset.
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_ms: 5_000,
            run_migrations: false,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Configured URL, else `DATABASE_URL`
    pub fn resolved_url(&self) -> Option<String> {
        first_url(self.url.as_deref(), std::env::var("DATABASE_URL").ok())
    }

    /// Like [`resolved_url`](Self::resolved_url) for callers that cannot run
    /// without a database
    pub fn required_url(&self) -> ConfigResult<String> {
        self.resolved_url().ok_or_else(|| {
            ConfigurationError::MissingValue("database.url or DATABASE_URL".to_string())
        })
    }
}

fn first_url(configured: Option<&str>, fallback: Option<String>) -> Option<String> {
    configured
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .or_else(|| fallback.filter(|url| !url.trim().is_empty()))
}

/// Limits on how long one operation may hold or wait for order locks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// How long a writer waits for another writer's order lock before
    /// reporting a conflict
    pub lock_timeout_ms: u64,
    /// Overall deadline of a single service operation
    pub operation_timeout_ms: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2_000,
            operation_timeout_ms: 10_000,
        }
    }
}

impl TransactionConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Severity recorded for allergies added through a specialized order
    pub default_allergy_severity: String,
    /// Upper bound on allergies, conditions or preferences in one request
    pub max_items_per_category: usize,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            default_allergy_severity: "moderate".to_string(),
            max_items_per_category: 50,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive such as `info` or `pet_order_core=debug`
    pub level: Option<String>,
    pub json: bool,
}

impl OrderCoreConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "must be greater than zero",
            ));
        }
        if self.database.acquire_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.acquire_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.transactions.lock_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "transactions.lock_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.transactions.operation_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "transactions.operation_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.composer.default_allergy_severity.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "composer.default_allergy_severity",
                "must not be empty",
            ));
        }
        if self.composer.max_items_per_category == 0 {
            return Err(ConfigurationError::invalid_value(
                "composer.max_items_per_category",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}
