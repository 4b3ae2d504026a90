//! # Structured Logging Module
//!
//! Environment-aware `tracing` setup plus one structured event helper per
//! operation family. Identifiers are rendered as strings so log pipelines
//! that parse JSON numbers as doubles keep them intact.

use crate::config::LoggingConfig;
use crate::error::OrderError;
use crate::models::RecordId;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging. Safe to call more than once.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = crate::config::loader::detect_environment();
        let filter = filter_directive(config, &environment, std::env::var("RUST_LOG").ok());

        let layer = if config.json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(EnvFilter::new(&filter))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(EnvFilter::new(&filter))
                .boxed()
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            // Embedding process already installed a subscriber
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            environment = %environment,
            filter = %filter,
            json = config.json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// `RUST_LOG` wins over the configured level, which wins over the
/// environment default
fn filter_directive(config: &LoggingConfig, environment: &str, rust_log: Option<String>) -> String {
    rust_log
        .filter(|directive| !directive.trim().is_empty())
        .or_else(|| config.level.clone())
        .unwrap_or_else(|| default_level(environment).to_string())
}

fn default_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for order aggregate and status operations
pub fn log_order_operation(
    operation: &str,
    order_id: Option<RecordId>,
    customer_id: Option<RecordId>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        order_id = order_id.map(|id| id.to_string()),
        customer_id = customer_id.map(|id| id.to_string()),
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 ORDER_OPERATION"
    );
}

/// Log structured data for courier assignment and delivery events
pub fn log_delivery_operation(
    operation: &str,
    order_id: RecordId,
    courier_id: Option<RecordId>,
    order_status: &str,
    delivery_confirmed: bool,
) {
    tracing::info!(
        operation = %operation,
        order_id = %order_id,
        courier_id = courier_id.map(|id| id.to_string()),
        order_status = %order_status,
        delivery_confirmed = delivery_confirmed,
        timestamp = %Utc::now().to_rfc3339(),
        "🚚 DELIVERY_OPERATION"
    );
}

/// Log structured data for specialized order composition
pub fn log_composition_operation(
    operation: &str,
    order_id: Option<RecordId>,
    pet_id: RecordId,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        order_id = order_id.map(|id| id.to_string()),
        pet_id = %pet_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🥣 COMPOSITION_OPERATION"
    );
}

/// Log a failed operation with its stable error kind
pub fn log_error(operation: &str, error: &OrderError) {
    tracing::warn!(
        operation = %operation,
        error_kind = %error.kind(),
        error = %error,
        retryable = error.is_retryable(),
        timestamp = %Utc::now().to_rfc3339(),
        "❌ OPERATION_FAILED"
    );
}
