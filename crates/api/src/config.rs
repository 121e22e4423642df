//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Log output format of the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset keeps everything in memory
/// - `ORCHESTRATOR_URL`: orchestration service base URL; unset drives sagas in-process
/// - `PUBLIC_URL`: base URL the orchestrator uses to reach this server
///   (default: `http://127.0.0.1:{PORT}`)
/// - `BARRIER_TIMEOUT_MS`: bound on one barrier-guarded branch call (default: `5000`)
/// - `SUBMIT_TIMEOUT_MS`: HTTP timeout towards the orchestrator (default: `3000`)
/// - `BARRIER_RETENTION_HOURS`: age after which barrier rows are purged (default: `168`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub orchestrator_url: Option<String>,
    pub public_url: String,
    pub barrier_timeout: Duration,
    pub submit_timeout: Duration,
    pub barrier_retention_hours: i64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port,
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            orchestrator_url: lookup("ORCHESTRATOR_URL").filter(|v| !v.is_empty()),
            public_url: lookup("PUBLIC_URL").unwrap_or_else(|| format!("http://127.0.0.1:{port}")),
            barrier_timeout: millis("BARRIER_TIMEOUT_MS", defaults.barrier_timeout),
            submit_timeout: millis("SUBMIT_TIMEOUT_MS", defaults.submit_timeout),
            barrier_retention_hours: lookup("BARRIER_RETENTION_HOURS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.barrier_retention_hours),
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
            orchestrator_url: None,
            public_url: "http://127.0.0.1:3000".to_string(),
            barrier_timeout: Duration::from_millis(5000),
            submit_timeout: Duration::from_millis(3000),
            barrier_retention_hours: 168,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = from_pairs(&[]);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert!(config.orchestrator_url.is_none());
        assert_eq!(config.barrier_timeout, Duration::from_secs(5));
        assert_eq!(config.barrier_retention_hours, 168);
    }

    #[test]
    fn test_public_url_follows_port() {
        let config = from_pairs(&[("PORT", "8081")]);
        assert_eq!(config.public_url, "http://127.0.0.1:8081");
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("LOG_FORMAT", "json"),
            ("DATABASE_URL", "postgres://localhost/mall"),
            ("ORCHESTRATOR_URL", ""),
            ("BARRIER_TIMEOUT_MS", "250"),
            ("PUBLIC_URL", "http://busi:3000/api"),
        ]);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/mall"));
        assert!(config.orchestrator_url.is_none());
        assert_eq!(config.barrier_timeout, Duration::from_millis(250));
        assert_eq!(config.public_url, "http://busi:3000/api");
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
