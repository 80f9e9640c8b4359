//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::Money;
use saga::LendingConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `LOG_FORMAT`: `json` for structured logs, anything else for text
/// - `DATABASE_URL`: PostgreSQL connection; in-memory stores when unset
/// - `MAX_BORROWING_LIMIT`, `LOAN_PERIOD_DAYS`, `MAX_LOAN_PERIOD_DAYS`,
///   `FINE_PER_DAY_CENTS`, `REMOTE_TIMEOUT_MS`, `CACHE_EXPIRY_SECONDS`,
///   `RECONCILE_INTERVAL_SECONDS`: lending policy
///
/// Missing, unparsable or out-of-range values fall back to the defaults.
/// `LOAN_PERIOD_DAYS` must lie in `1..=MAX_LOAN_PERIOD_DAYS`.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub lending: LendingConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let mut lending = defaults.lending;
        if let Some(limit) = parsed("MAX_BORROWING_LIMIT").and_then(|v| u32::try_from(v).ok()) {
            lending.borrow_limit = limit;
        }
        if let Some(days) = parsed("MAX_LOAN_PERIOD_DAYS").and_then(|v| u32::try_from(v).ok()) {
            lending.max_loan_period_days = days;
        }
        let max_days = i64::from(lending.max_loan_period_days);
        if let Some(days) = parsed("LOAN_PERIOD_DAYS")
            .and_then(|v| i64::try_from(v).ok())
            .filter(|d| (1..=max_days).contains(d))
        {
            lending.loan_period = chrono::Duration::days(days);
        }
        if let Some(cents) = parsed("FINE_PER_DAY_CENTS").and_then(|v| i64::try_from(v).ok()) {
            lending.fine_per_day = Money::from_cents(cents);
        }
        if let Some(ms) = parsed("REMOTE_TIMEOUT_MS") {
            lending.remote_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parsed("CACHE_EXPIRY_SECONDS") {
            lending.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed("RECONCILE_INTERVAL_SECONDS").filter(|s| *s > 0) {
            lending.reconcile_interval = Duration::from_secs(secs);
        }

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            lending,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            lending: LendingConfig::default(),
        }
    }
}
