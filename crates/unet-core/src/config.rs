//! Runtime configuration, loaded from environment variables with sane defaults.
//!
//! This is an always-on daemon, not a CLI tool people hand TOML files to on
//! every invocation — so unlike a config-file-first layout, [`Config::from_env`]
//! is the primary entry point. [`Config::from_file`] still exists for anyone
//! who wants a checked-in baseline, with environment variables always taking
//! precedence (`config::Environment` is added as the last, highest-priority
//! source in both paths).

use crate::error::{Error, Result};
use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for the monitoring engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub polling: PollingConfig,
    pub alerting: AlertingConfig,
    pub timeseries: TimeSeriesConfig,
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Grace period for in-flight requests and sweep tasks during shutdown.
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `text` or `json`.
    pub format: String,
    /// Passed straight to `tracing_subscriber::EnvFilter` (e.g. "info,unet_core=debug").
    pub filter: String,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub bind_path: String,
}

/// Cadence and behavior of the reachability / SNMP / alerting sweeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub ping_interval_secs: u64,
    pub snmp_interval_secs: u64,
    pub alert_eval_interval_secs: u64,
    pub interface_metrics_interval_secs: u64,
    pub batch_size: usize,
    pub worker_concurrency_ping: usize,
    pub worker_concurrency_snmp: usize,
    pub ping_count: u32,
    pub ping_timeout_ms: u64,
    pub snmp_timeout_secs: u64,
    pub snmp_retries: u32,
    /// Consecutive opposite-state transitions within the window that mark a device flapping.
    pub flap_k: u32,
    pub flap_window_secs: u64,
    /// Lower threshold applied to interfaces classified as ISP uplinks.
    pub isp_flap_k: u32,
    pub interface_stale_days: u32,
    /// Local hour (0-23) the daily interface-discovery walk runs at.
    pub interface_discovery_hour: u32,
    /// How often the time-series buffer is drained to the external store.
    pub timeseries_flush_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    pub retention_days_timeseries: u32,
    /// Local hour (0-23) the daily retention-cleanup sweep runs at.
    pub retention_cleanup_hour: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesConfig {
    pub url: Option<String>,
    pub broker_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Base64-encoded 32-byte master key. If unset, one is generated at
    /// startup and credentials do not survive a restart — fine for
    /// development, not for production.
    pub credential_key: Option<String>,
}

impl Config {
    /// Loads configuration purely from environment variables (the `ENV_PREFIX` below).
    pub fn from_env() -> Result<Self> {
        Self::build(ConfigBuilder::builder())
    }

    /// Loads a TOML baseline, then lets environment variables override it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_str().ok_or_else(|| {
            Error::config("configuration path is not valid UTF-8")
        })?;
        Self::build(ConfigBuilder::builder().add_source(File::with_name(path_str).required(false)))
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let builder = builder
            .set_default("database.url", "sqlite://monitoring.db?mode=rwc")?
            .set_default("database.connect_timeout_secs", 30)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.shutdown_grace_secs", 30)?
            .set_default("logging.format", "text")?
            .set_default("logging.filter", "info")?
            .set_default("metrics.enabled", true)?
            .set_default("metrics.bind_path", "/metrics")?
            .set_default("polling.ping_interval_secs", 30)?
            .set_default("polling.snmp_interval_secs", 60)?
            .set_default("polling.alert_eval_interval_secs", 10)?
            .set_default("polling.interface_metrics_interval_secs", 60)?
            .set_default("polling.batch_size", 100)?
            .set_default("polling.worker_concurrency_ping", 100)?
            .set_default("polling.worker_concurrency_snmp", 10)?
            .set_default("polling.ping_count", 2)?
            .set_default("polling.ping_timeout_ms", 1000)?
            .set_default("polling.snmp_timeout_secs", 5)?
            .set_default("polling.snmp_retries", 3)?
            .set_default("polling.flap_k", 3)?
            .set_default("polling.flap_window_secs", 300)?
            .set_default("polling.isp_flap_k", 2)?
            .set_default("polling.interface_stale_days", 7)?
            .set_default("polling.interface_discovery_hour", 2)?
            .set_default("polling.timeseries_flush_interval_secs", 5)?
            .set_default("alerting.retention_days_timeseries", 30)?
            .set_default("alerting.retention_cleanup_hour", 3)?
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .with_list_parse_key("none")
                    .list_separator(","),
            );

        let raw = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build configuration: {e}")))?;

        // The `config` crate's flat env parsing doesn't nest into our
        // `section.field` layout on its own; map the documented spec env
        // vars onto it explicitly so `PING_INTERVAL_SECS=45` just works.
        let mut overrides = ConfigBuilder::builder().add_source(raw.clone());
        overrides = Self::apply_documented_env_overrides(overrides);
        let config = overrides
            .build()
            .map_err(|e| Error::config(format!("failed to apply environment overrides: {e}")))?;

        let parsed: Self = config
            .try_deserialize()
            .map_err(|e| Error::config(format!("failed to deserialize configuration: {e}")))?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn apply_documented_env_overrides(
        mut builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> config::ConfigBuilder<config::builder::DefaultState> {
        let mapping: &[(&str, &str)] = &[
            ("DB_URL", "database.url"),
            ("PING_INTERVAL_SECS", "polling.ping_interval_secs"),
            ("SNMP_INTERVAL_SECS", "polling.snmp_interval_secs"),
            ("ALERT_EVAL_INTERVAL_SECS", "polling.alert_eval_interval_secs"),
            (
                "INTERFACE_METRICS_INTERVAL_SECS",
                "polling.interface_metrics_interval_secs",
            ),
            ("BATCH_SIZE", "polling.batch_size"),
            ("WORKER_CONCURRENCY_PING", "polling.worker_concurrency_ping"),
            ("WORKER_CONCURRENCY_SNMP", "polling.worker_concurrency_snmp"),
            ("PING_COUNT", "polling.ping_count"),
            ("PING_TIMEOUT_MS", "polling.ping_timeout_ms"),
            ("SNMP_TIMEOUT_SECS", "polling.snmp_timeout_secs"),
            ("SNMP_RETRIES", "polling.snmp_retries"),
            ("FLAP_K", "polling.flap_k"),
            ("FLAP_WINDOW_SECS", "polling.flap_window_secs"),
            ("ISP_FLAP_K", "polling.isp_flap_k"),
            ("INTERFACE_STALE_DAYS", "polling.interface_stale_days"),
            (
                "INTERFACE_DISCOVERY_HOUR",
                "polling.interface_discovery_hour",
            ),
            (
                "TIMESERIES_FLUSH_INTERVAL_SECS",
                "polling.timeseries_flush_interval_secs",
            ),
            ("TIME_SERIES_URL", "timeseries.url"),
            ("BROKER_URL", "timeseries.broker_url"),
            ("CREDENTIAL_KEY", "credentials.credential_key"),
            (
                "RETENTION_DAYS_TIMESERIES",
                "alerting.retention_days_timeseries",
            ),
            ("RETENTION_CLEANUP_HOUR", "alerting.retention_cleanup_hour"),
            ("SHUTDOWN_GRACE_SECS", "server.shutdown_grace_secs"),
        ];
        for (env_var, key) in mapping {
            if let Ok(value) = std::env::var(env_var) {
                builder = builder
                    .set_override(*key, value)
                    .unwrap_or_else(|_| panic!("static override key '{key}' is well-formed"));
            }
        }
        builder
    }

    /// The database URL a binary should actually connect to.
    #[must_use]
    pub fn database_url(&self) -> String {
        self.database.url.clone()
    }

    /// # Errors
    /// Returns [`Error::Validation`] if a field is out of range or the
    /// database URL scheme isn't one this engine knows how to connect to.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(Error::validation("database.url must not be empty"));
        }
        if !self.database.url.starts_with("sqlite:")
            && !self.database.url.starts_with("postgresql://")
            && !self.database.url.starts_with("postgres://")
        {
            return Err(Error::validation(
                "database.url must start with sqlite: or postgresql://",
            ));
        }
        if self.polling.ping_count == 0 {
            return Err(Error::validation("polling.ping_count must be at least 1"));
        }
        if self.polling.flap_k == 0 || self.polling.isp_flap_k == 0 {
            return Err(Error::validation("flap thresholds must be at least 1"));
        }
        if self.polling.interface_discovery_hour > 23 {
            return Err(Error::validation(
                "polling.interface_discovery_hour must be 0-23",
            ));
        }
        if self.alerting.retention_cleanup_hour > 23 {
            return Err(Error::validation(
                "alerting.retention_cleanup_hour must be 0-23",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.polling.ping_timeout_ms)
    }

    #[must_use]
    pub const fn snmp_timeout(&self) -> Duration {
        Duration::from_secs(self.polling.snmp_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env().unwrap_or_else(|_| {
            Self::build(ConfigBuilder::builder()).expect("defaults alone always validate")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = Config::build(ConfigBuilder::builder()).unwrap();
        assert_eq!(config.polling.ping_interval_secs, 30);
        assert_eq!(config.polling.flap_k, 3);
        assert_eq!(config.polling.isp_flap_k, 2);
        assert_eq!(config.polling.interface_stale_days, 7);
        assert_eq!(config.alerting.retention_days_timeseries, 30);
    }

    #[test]
    fn env_override_takes_precedence() {
        // SAFETY: test runs single-threaded w.r.t. this var via serial env mutation.
        unsafe {
            std::env::set_var("PING_INTERVAL_SECS", "45");
        }
        let config = Config::from_env().unwrap();
        assert_eq!(config.polling.ping_interval_secs, 45);
        unsafe {
            std::env::remove_var("PING_INTERVAL_SECS");
        }
    }

    #[test]
    fn rejects_unsupported_database_url() {
        unsafe {
            std::env::set_var("DB_URL", "mysql://localhost/x");
        }
        let result = Config::from_env();
        unsafe {
            std::env::remove_var("DB_URL");
        }
        assert!(result.is_err());
    }
}
