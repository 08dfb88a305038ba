//! Gateway configuration types.
//!
//! This module defines the gateway's process-wide configuration: HTTP
//! bind address and body/timeout limits live here; the control plane's
//! own timing knobs (job timeout, sweeper cadence) are read from the same
//! environment but surfaced as a [`fulcrum_control::ControlConfig`] via
//! [`GatewayConfig::control_config`].

use std::env;
use std::str::FromStr;
use std::time::Duration;

use fulcrum_control::ControlConfig;

/// Configuration for the gateway service, read once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    pub bind_addr: String,

    /// Filesystem path to the `RocksDB` data directory.
    pub db_path: String,

    /// Allowed CORS origins. `"*"` allows any origin.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// How long a job may stay `Processing` before the timeout sweeper
    /// fails it (§4.2).
    pub job_timeout_secs: u64,

    /// How long an agent may go without a heartbeat before the
    /// connectivity sweeper marks it `Disconnected` (§4.3).
    pub heartbeat_timeout_secs: u64,

    /// Interval between background sweeper ticks.
    pub sweep_interval_secs: u64,

    /// Maximum candidates a single sweeper iteration examines.
    pub sweep_batch_size: usize,

    /// Default lease duration granted by `acquireLease` when the caller
    /// does not specify one.
    pub default_lease_duration_secs: u64,

    /// Page size used when a listing endpoint's `limit` query parameter
    /// is omitted.
    pub default_page_size: usize,

    /// Upper bound on a listing endpoint's `limit` query parameter,
    /// regardless of what the caller requests.
    pub max_page_size: usize,

    /// Maximum events returned by a single `acknowledge`-driven journal
    /// read, used by subscriber-facing batching (not the public
    /// `GET /events` endpoint's own `limit`, which is caller-supplied).
    pub event_batch_size: usize,
}

impl GatewayConfig {
    /// Build configuration from `FULCRUM_*` environment variables,
    /// falling back to [`GatewayConfig::default`] for anything unset.
    ///
    /// # Panics
    ///
    /// Panics if an environment variable is set but cannot be parsed as
    /// the expected type.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("FULCRUM_BIND_ADDR", defaults.bind_addr),
            db_path: env_or("FULCRUM_DB_PATH", defaults.db_path),
            cors_origins: env::var("FULCRUM_CORS_ORIGINS").map_or(defaults.cors_origins, |v| {
                v.split(',').map(str::trim).map(str::to_string).collect()
            }),
            max_body_bytes: env_parsed_or("FULCRUM_MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_secs: env_parsed_or(
                "FULCRUM_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            ),
            job_timeout_secs: env_parsed_or("FULCRUM_JOB_TIMEOUT_SECS", defaults.job_timeout_secs),
            heartbeat_timeout_secs: env_parsed_or(
                "FULCRUM_HEARTBEAT_TIMEOUT_SECS",
                defaults.heartbeat_timeout_secs,
            ),
            sweep_interval_secs: env_parsed_or(
                "FULCRUM_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            ),
            sweep_batch_size: env_parsed_or("FULCRUM_SWEEP_BATCH_SIZE", defaults.sweep_batch_size),
            default_lease_duration_secs: env_parsed_or(
                "FULCRUM_DEFAULT_LEASE_DURATION_SECS",
                defaults.default_lease_duration_secs,
            ),
            default_page_size: env_parsed_or(
                "FULCRUM_DEFAULT_PAGE_SIZE",
                defaults.default_page_size,
            ),
            max_page_size: env_parsed_or("FULCRUM_MAX_PAGE_SIZE", defaults.max_page_size),
            event_batch_size: env_parsed_or(
                "FULCRUM_EVENT_BATCH_SIZE",
                defaults.event_batch_size,
            ),
        }
    }

    /// Derive the control plane's own runtime configuration from the
    /// fields shared with it.
    #[must_use]
    pub const fn control_config(&self) -> ControlConfig {
        ControlConfig {
            job_timeout_secs: self.job_timeout_secs,
            heartbeat_timeout_secs: self.heartbeat_timeout_secs,
            sweep_interval_secs: self.sweep_interval_secs,
            sweep_batch_size: self.sweep_batch_size,
            default_lease_duration_secs: self.default_lease_duration_secs,
        }
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Clamp a caller-requested page size to `[1, max_page_size]`,
    /// substituting `default_page_size` when none was requested.
    #[must_use]
    pub fn clamp_page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            db_path: "/data/fulcrum".to_string(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: 1024 * 1024,
            request_timeout_secs: 30,
            job_timeout_secs: 600,
            heartbeat_timeout_secs: 90,
            sweep_interval_secs: 30,
            sweep_batch_size: 100,
            default_lease_duration_secs: 30,
            default_page_size: 50,
            max_page_size: 500,
            event_batch_size: 200,
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn env_parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert_eq!(config.default_page_size, 50);
        assert_eq!(config.max_page_size, 500);
    }

    #[test]
    fn timeout_duration() {
        let config = GatewayConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn control_config_derived_from_shared_fields() {
        let config = GatewayConfig::default();
        let control = config.control_config();
        assert_eq!(control.job_timeout_secs, config.job_timeout_secs);
        assert_eq!(control.heartbeat_timeout_secs, config.heartbeat_timeout_secs);
    }

    #[test]
    fn clamp_page_size_defaults_and_caps() {
        let config = GatewayConfig::default();
        assert_eq!(config.clamp_page_size(None), 50);
        assert_eq!(config.clamp_page_size(Some(10_000)), 500);
        assert_eq!(config.clamp_page_size(Some(0)), 1);
    }
}
