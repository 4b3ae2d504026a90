//! # Order Core Check
//!
//! Operator tool: loads configuration for the current environment, connects
//! to PostgreSQL when a URL is configured, optionally applies migrations and
//! reports store health.
//!
//! ```bash
//! ORDER_CORE_ENV=production order-core-check [--config-dir DIR] [--migrate]
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use pet_order_core::config::ConfigLoader;
use pet_order_core::database::{DatabaseConnection, OrderStore, PgOrderStore};
use pet_order_core::logging::init_structured_logging;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "order-core-check")]
#[command(about = "Validate order core configuration and store health")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Apply pending migrations even when `database.run_migrations` is off.
    /// Fails when no database URL is configured.
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(dir) = &cli.config_dir {
        loader = loader.with_directory(dir);
    }

    let config = loader
        .load()
        .with_context(|| format!("loading configuration for '{}'", loader.environment()))?;
    init_structured_logging(&config.logging);

    info!(
        environment = %loader.environment(),
        lock_timeout_ms = config.transactions.lock_timeout_ms,
        operation_timeout_ms = config.transactions.operation_timeout_ms,
        "✅ Configuration valid"
    );

    let url = if cli.migrate {
        config
            .database
            .required_url()
            .context("--migrate needs a database")?
    } else {
        let Some(url) = config.database.resolved_url() else {
            warn!("No database URL configured; skipping store checks");
            return Ok(());
        };
        url
    };

    let connection = DatabaseConnection::connect(&url, &config.database)
        .await
        .context("connecting to PostgreSQL")?;

    if cli.migrate || config.database.run_migrations {
        connection.migrate().await.context("applying migrations")?;
    }

    let store = PgOrderStore::new(connection.pool().clone(), config.transactions.lock_timeout());
    store.health_check().await.context("store health check")?;
    info!("✅ Order store healthy");

    connection.close().await;
    Ok(())
}
