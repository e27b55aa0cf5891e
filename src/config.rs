//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::RegenerationPolicy;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Seconds until a stored record turns stale
    pub default_ttl: u64,
    /// Current prompt/template version served and generated
    pub content_version: u32,
    /// Maximum seconds a record may stay claimed before the claim is considered dead
    pub watchdog_secs: u64,
    /// Backoff after the first failed regeneration, in seconds
    pub backoff_base_secs: u64,
    /// Backoff cap in seconds
    pub backoff_max_secs: u64,
    /// Per-call generation timeout in seconds
    pub generation_timeout_secs: u64,
    /// Seconds between stale sweeps
    pub sweep_interval: u64,
    /// Page size of one `list_stale` call during a sweep
    pub sweep_batch: usize,
    /// Capacity of the render-to-worker request channel
    pub queue_capacity: usize,
    /// Postgres connection string; the in-memory store is used when unset
    pub database_url: Option<String>,
    pub database_max_connections: u32,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `DEFAULT_TTL` - Record TTL in seconds (default: 604800, one week)
    /// - `CONTENT_VERSION` - Current content version (default: 1)
    /// - `WATCHDOG_SECS` - Claim watchdog in seconds (default: 600)
    /// - `BACKOFF_BASE_SECS` - First failure backoff (default: 60)
    /// - `BACKOFF_MAX_SECS` - Failure backoff cap (default: 21600)
    /// - `GENERATION_TIMEOUT_SECS` - Generation timeout (default: 30)
    /// - `SWEEP_INTERVAL` - Sweep frequency in seconds (default: 60)
    /// - `SWEEP_BATCH` - Sweep page size (default: 100)
    /// - `REGEN_QUEUE_CAPACITY` - Request channel capacity (default: 1024)
    /// - `DATABASE_URL` - Postgres URL (default: unset, in-memory store)
    /// - `DATABASE_MAX_CONNECTIONS` - Pool size (default: 5)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            content_version: env_or("CONTENT_VERSION", defaults.content_version),
            watchdog_secs: env_or("WATCHDOG_SECS", defaults.watchdog_secs),
            backoff_base_secs: env_or("BACKOFF_BASE_SECS", defaults.backoff_base_secs),
            backoff_max_secs: env_or("BACKOFF_MAX_SECS", defaults.backoff_max_secs),
            generation_timeout_secs: env_or(
                "GENERATION_TIMEOUT_SECS",
                defaults.generation_timeout_secs,
            ),
            sweep_interval: env_or("SWEEP_INTERVAL", defaults.sweep_interval),
            sweep_batch: env_or("SWEEP_BATCH", defaults.sweep_batch),
            queue_capacity: env_or("REGEN_QUEUE_CAPACITY", defaults.queue_capacity),
            database_url: env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            database_max_connections: env_or(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
        }
    }

    /// TTL applied to records written without an explicit one.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    pub fn regeneration_policy(&self) -> RegenerationPolicy {
        RegenerationPolicy::new(
            Duration::from_secs(self.watchdog_secs),
            Duration::from_secs(self.backoff_base_secs),
            Duration::from_secs(self.backoff_max_secs),
        )
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            default_ttl: 604_800,
            content_version: 1,
            watchdog_secs: 600,
            backoff_base_secs: 60,
            backoff_max_secs: 21_600,
            generation_timeout_secs: 30,
            sweep_interval: 60,
            sweep_batch: 100,
            queue_capacity: 1024,
            database_url: None,
            database_max_connections: 5,
        }
    }
}
