//! Configuration Loader
//!
//! Layers configuration sources from least to most specific:
//!
//! 1. `config/order-core.toml`
//! 2. `config/order-core.<environment>.toml`
//! 3. `ORDER_CORE__<SECTION>__<KEY>` environment variables
//!
//! Missing files are skipped. The environment name comes from `ORDER_CORE_ENV`
//! and defaults to `development`.

use super::error::ConfigResult;
use super::OrderCoreConfig;
use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const CONFIG_BASENAME: &str = "order-core";
const ENV_PREFIX: &str = "ORDER_CORE";

pub struct ConfigLoader {
    config_directory: PathBuf,
    environment: String,
    /// Replaces the process environment as the variable source when set
    env_overrides: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_directory: PathBuf::from("config"),
            environment: detect_environment(),
            env_overrides: None,
        }
    }

    pub fn with_directory(mut self, directory: impl AsRef<Path>) -> Self {
        self.config_directory = directory.as_ref().to_path_buf();
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Read variables from this map instead of the process environment
    pub fn with_env_overrides(mut self, vars: HashMap<String, String>) -> Self {
        self.env_overrides = Some(vars);
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Load, merge and validate
    pub fn load(&self) -> ConfigResult<Arc<OrderCoreConfig>> {
        let base = self.config_directory.join(format!("{CONFIG_BASENAME}.toml"));
        let overlay = self
            .config_directory
            .join(format!("{CONFIG_BASENAME}.{}.toml", self.environment));

        debug!(
            environment = %self.environment,
            directory = %self.config_directory.display(),
            "Loading order core configuration"
        );

        let env_source = Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .source(self.env_overrides.clone());

        let config: OrderCoreConfig = Config::builder()
            .add_source(File::new(&base.to_string_lossy(), FileFormat::Toml).required(false))
            .add_source(File::new(&overlay.to_string_lossy(), FileFormat::Toml).required(false))
            .add_source(env_source)
            .build()?
            .try_deserialize()?;

        config.validate()?;

        tracing::info!(
            environment = %self.environment,
            max_connections = config.database.max_connections,
            lock_timeout_ms = config.transactions.lock_timeout_ms,
            operation_timeout_ms = config.transactions.operation_timeout_ms,
            "🔧 CONFIG: Order core configuration loaded"
        );

        Ok(Arc::new(config))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Current environment name
pub fn detect_environment() -> String {
    std::env::var("ORDER_CORE_ENV").unwrap_or_else(|_| "development".to_string())
}
