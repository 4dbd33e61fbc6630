//! Daemon settings
//!
//! Layered lowest first: built-in defaults, an optional TOML file named by
//! `RANKFLOW_CONFIG`, then `RANKFLOW_*` environment variables. Nested keys use
//! a double underscore, e.g. `RANKFLOW_DISPATCH__ENDPOINT`.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use rankflow_core::application::queue_processor::constants::DEFAULT_TICK_INTERVAL;
use rankflow_core::DispatchConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

pub const CONFIG_ENV: &str = "RANKFLOW_CONFIG";
const ENV_PREFIX: &str = "RANKFLOW";

const DEFAULT_DB_PATH: &str = "~/.rankflow/jobs.db";
const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9627;
const DEFAULT_CALLBACK_ADDR: &str = "0.0.0.0:9628";
const DEFAULT_RETENTION_DAYS: i64 = 7;
const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_MAX_DB_SIZE_MB: f64 = 1000.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub db_path: String,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub callback_addr: String,
    pub tick_interval_ms: u64,
    pub retention_days: i64,
    pub maintenance_interval_secs: u64,
    pub max_db_size_mb: f64,
    pub dispatch: DispatchConfig,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            rpc_host: DEFAULT_RPC_HOST.to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            callback_addr: DEFAULT_CALLBACK_ADDR.to_string(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL.as_millis() as u64,
            retention_days: DEFAULT_RETENTION_DAYS,
            maintenance_interval_secs: DEFAULT_MAINTENANCE_INTERVAL_SECS,
            max_db_size_mb: DEFAULT_MAX_DB_SIZE_MB,
            dispatch: DispatchConfig::default(),
        }
    }
}

impl DaemonSettings {
    /// Load from the process environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_ENV).ok();
        Self::load_from(file.as_deref(), Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    pub fn load_from(file: Option<&str>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            let path = shellexpand::tilde(path).into_owned();
            builder = builder.add_source(File::with_name(&path).required(true));
        }

        let settings: DaemonSettings = builder
            .add_source(env)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.dispatch
            .validate()
            .context("Invalid dispatch configuration")?;
        if self.tick_interval_ms == 0 {
            bail!("tick_interval_ms must be > 0");
        }
        if self.maintenance_interval_secs == 0 {
            bail!("maintenance_interval_secs must be > 0");
        }
        if self.retention_days < 0 {
            bail!("retention_days must be >= 0");
        }
        self.callback_socket_addr()?;
        Ok(())
    }

    pub fn callback_socket_addr(&self) -> Result<SocketAddr> {
        self.callback_addr
            .parse()
            .with_context(|| format!("callback_addr is not a socket address: {}", self.callback_addr))
    }

    /// SQLite URL for `db_path` (tilde expanded)
    pub fn database_url(&self) -> String {
        if self.db_path.starts_with("sqlite:") {
            return self.db_path.clone();
        }
        format!("sqlite://{}", shellexpand::tilde(&self.db_path))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }
}
