//! Application configuration
//!
//! Centralized configuration management using the `config` crate.
//! Values load from optional config files and environment variables
//! with the `RINGBID` prefix.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auction: AuctionConfig,
    #[serde(default)]
    pub compliance: ComplianceConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

/// Auction engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AuctionConfig {
    /// Maximum settlement attempts per call (re-ranking included)
    #[serde(default = "default_max_settle_attempts")]
    pub max_settle_attempts: u32,

    /// Maximum retries for a conflicted ledger mutation
    #[serde(default = "default_max_ledger_retries")]
    pub max_ledger_retries: u32,

    /// Initial retry backoff in milliseconds
    #[serde(default = "default_retry_initial_delay")]
    pub retry_initial_delay_ms: u64,

    /// Retry backoff ceiling in milliseconds
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,

    /// Default bid lifetime in seconds when the buyer sets none
    #[serde(default = "default_bid_ttl")]
    pub default_bid_ttl_secs: i64,
}

fn default_max_settle_attempts() -> u32 {
    3
}

fn default_max_ledger_retries() -> u32 {
    3
}

fn default_retry_initial_delay() -> u64 {
    25
}

fn default_retry_max_delay() -> u64 {
    500
}

fn default_bid_ttl() -> i64 {
    300
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            max_settle_attempts: default_max_settle_attempts(),
            max_ledger_retries: default_max_ledger_retries(),
            retry_initial_delay_ms: default_retry_initial_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            default_bid_ttl_secs: default_bid_ttl(),
        }
    }
}

/// Compliance gate configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ComplianceConfig {
    /// Start of the allowed calling window, local time "HH:MM"
    #[serde(default = "default_window_start")]
    pub window_start: String,

    /// End of the allowed calling window, local time "HH:MM"
    #[serde(default = "default_window_end")]
    pub window_end: String,

    /// Offset from UTC in minutes for the window
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Seed numbers for the in-process DNC set
    #[serde(default)]
    pub dnc_numbers: Vec<String>,
}

fn default_window_start() -> String {
    // TCPA-permitted calling hours
    "08:00".to_string()
}

fn default_window_end() -> String {
    "21:00".to_string()
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            window_start: default_window_start(),
            window_end: default_window_end(),
            utc_offset_minutes: 0,
            dnc_numbers: Vec::new(),
        }
    }
}

/// Expiration sweeper configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SweeperConfig {
    /// Seconds between expiration sweeps
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    15
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("database.max_connections", 10)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.idle_timeout_secs", 600)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("RINGBID")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("RINGBID").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
