//! Configuration for csr-daemon

use crate::error::{DaemonError, DaemonResult};
use csr_checkpoints::{DeliveryMode, RetryPolicy, WorkerConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Notification delivery configuration
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

/// Notification delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// `inline` sends once right after persistence, `outbox` hands records to the worker
    #[serde(default)]
    pub mode: DeliveryMode,

    /// Attempts per record before it is settled as failed or partial
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, doubled for each later one
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// How often the worker sweeps pending records
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Records attempted per sweep
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// HTTP endpoint of the email relay; emails are only logged when unset
    #[serde(default)]
    pub email_relay_url: Option<String>,

    /// Buffered realtime events per subscriber
    #[serde(default = "default_realtime_capacity")]
    pub realtime_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Outbox,
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            sweep_interval_secs: default_sweep_interval(),
            batch_size: default_batch_size(),
            email_relay_url: None,
            realtime_capacity: default_realtime_capacity(),
        }
    }
}

impl DeliveryConfig {
    /// Worker settings derived from this section
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            retry: RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                base_backoff: Duration::from_millis(self.base_backoff_ms),
            },
            sweep_interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
            batch_size: self.batch_size.max(1),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_sweep_interval() -> u64 {
    10
}

fn default_batch_size() -> usize {
    50
}

fn default_realtime_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `CSR_`-prefixed environment variables (`__` separates sections,
    /// e.g. `CSR_DELIVERY__MAX_ATTEMPTS=3`).
    pub fn load(path: Option<&str>) -> DaemonResult<Self> {
        Self::build(path).map_err(|e| DaemonError::Config(e.to_string()))
    }

    fn build(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CSR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
