//! Service configuration loaded from the environment.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use billvault_core::{ArchivalConfig, ConfigError, RetryConfig};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::constants::*;

// ============================================================================
// SERVICE KEY
// ============================================================================

/// Shared secret for the internal archive API.
///
/// Held in a [`SecretString`] so it never reaches logs or `Debug` output. It
/// must be usable as an HTTP header value, since the remote archive client
/// sends it verbatim.
#[derive(Clone)]
pub struct ServiceKey(SecretString);

impl ServiceKey {
    pub fn new(value: impl Into<String>) -> Result<Self, ConfigError> {
        let value = value.into();
        let invalid = |reason: &str| ConfigError::InvalidValue {
            field: "BILLVAULT_SERVICE_KEY".to_string(),
            value: "<redacted>".to_string(),
            reason: reason.to_string(),
        };
        if value.trim().is_empty() {
            return Err(invalid("must not be empty"));
        }
        if HeaderValue::from_str(&value).is_err() {
            return Err(invalid("must be a valid HTTP header value"));
        }
        Ok(Self(SecretString::new(value.into())))
    }

    /// Expose the key (only for sending it to the remote archive).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Constant-time comparison against a presented key.
    pub fn matches(&self, presented: &[u8]) -> bool {
        self.0.expose_secret().as_bytes().ct_eq(presented).into()
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceKey").field(&self.0).finish()
    }
}

// ============================================================================
// SERVICE CONFIG
// ============================================================================

/// Everything the service needs to start, validated up front.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    /// Root for `hot/`, `index/` and `cold/`.
    pub data_dir: PathBuf,
    pub hot_map_size_mb: usize,
    pub index_map_size_mb: usize,
    pub archival: ArchivalConfig,
    pub retry: RetryConfig,
    /// `None` disables the in-process scheduler.
    pub migration_interval: Option<Duration>,
    pub reaper_interval: Duration,
    /// Remote archive-retrieval API used for the cold fallback.
    pub archive_url: Option<String>,
    pub service_key: Option<ServiceKey>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            hot_map_size_mb: DEFAULT_HOT_MAP_SIZE_MB,
            index_map_size_mb: DEFAULT_INDEX_MAP_SIZE_MB,
            archival: ArchivalConfig::default(),
            retry: RetryConfig::default(),
            migration_interval: Some(Duration::from_secs(DEFAULT_MIGRATION_INTERVAL_SECS)),
            reaper_interval: Duration::from_secs(DEFAULT_REAPER_INTERVAL_SECS),
            archive_url: None,
            service_key: None,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("BILLVAULT_BIND").unwrap_or_else(|| DEFAULT_BIND_HOST.to_string());
        let port: u16 = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let addr = format!("{}:{}", host, port);
        let bind_addr: SocketAddr = addr.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::InvalidValue {
                field: "BILLVAULT_BIND".to_string(),
                value: addr.clone(),
                reason: e.to_string(),
            }
        })?;

        let archival = ArchivalConfig {
            archive_threshold_days: parse_or(
                &lookup,
                "ARCHIVE_THRESHOLD_DAYS",
                billvault_core::config::DEFAULT_ARCHIVE_THRESHOLD_DAYS,
            )?,
            retire_ttl: Duration::from_secs(parse_or(
                &lookup,
                "BILLVAULT_RETIRE_TTL_SECS",
                DEFAULT_RETIRE_TTL_SECS,
            )?),
            concurrency: parse_or(
                &lookup,
                "BILLVAULT_MIGRATION_CONCURRENCY",
                DEFAULT_MIGRATION_CONCURRENCY,
            )?,
        };

        let retry = RetryConfig {
            max_attempts: parse_or(&lookup, "BILLVAULT_RETRY_MAX_ATTEMPTS", DEFAULT_RETRY_MAX_ATTEMPTS)?,
            initial_backoff: Duration::from_millis(parse_or(
                &lookup,
                "BILLVAULT_RETRY_INITIAL_BACKOFF_MS",
                DEFAULT_RETRY_INITIAL_BACKOFF_MS,
            )?),
            max_backoff: Duration::from_millis(parse_or(
                &lookup,
                "BILLVAULT_RETRY_MAX_BACKOFF_MS",
                DEFAULT_RETRY_MAX_BACKOFF_MS,
            )?),
            attempt_timeout: Duration::from_millis(parse_or(
                &lookup,
                "BILLVAULT_TIER_TIMEOUT_MS",
                DEFAULT_TIER_TIMEOUT_MS,
            )?),
            ..RetryConfig::default()
        };

        let migration_secs: u64 = parse_or(
            &lookup,
            "BILLVAULT_MIGRATION_INTERVAL_SECS",
            DEFAULT_MIGRATION_INTERVAL_SECS,
        )?;

        let config = Self {
            bind_addr,
            data_dir: lookup("BILLVAULT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            hot_map_size_mb: parse_or(&lookup, "BILLVAULT_HOT_MAP_SIZE_MB", DEFAULT_HOT_MAP_SIZE_MB)?,
            index_map_size_mb: parse_or(
                &lookup,
                "BILLVAULT_INDEX_MAP_SIZE_MB",
                DEFAULT_INDEX_MAP_SIZE_MB,
            )?,
            archival,
            retry,
            migration_interval: (migration_secs > 0).then(|| Duration::from_secs(migration_secs)),
            reaper_interval: Duration::from_secs(parse_or(
                &lookup,
                "BILLVAULT_REAPER_INTERVAL_SECS",
                DEFAULT_REAPER_INTERVAL_SECS,
            )?),
            archive_url: lookup("BILLVAULT_ARCHIVE_URL").filter(|url| !url.trim().is_empty()),
            service_key: lookup("BILLVAULT_SERVICE_KEY").map(ServiceKey::new).transpose()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.archival.validate()?;
        self.retry.validate()?;

        if self.hot_map_size_mb == 0 {
            return Err(invalid("BILLVAULT_HOT_MAP_SIZE_MB", "0", "must be greater than zero"));
        }
        if self.index_map_size_mb == 0 {
            return Err(invalid("BILLVAULT_INDEX_MAP_SIZE_MB", "0", "must be greater than zero"));
        }
        if self.reaper_interval.is_zero() {
            return Err(invalid("BILLVAULT_REAPER_INTERVAL_SECS", "0", "must be greater than zero"));
        }

        if let Some(url) = &self.archive_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid("BILLVAULT_ARCHIVE_URL", url, "must be an http(s) URL"));
            }
            if self.service_key.is_none() {
                return Err(ConfigError::MissingRequired {
                    field: "BILLVAULT_SERVICE_KEY".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, &raw, &e.to_string())),
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let previous = std::env::var(key).ok();
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.previous.as_deref() {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.archival.archive_threshold_days, 90);
        assert_eq!(config.archival.retire_ttl, Duration::from_secs(1));
        assert_eq!(config.migration_interval, Some(Duration::from_secs(86400)));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.attempt_timeout, Duration::from_millis(5000));
        assert!(config.archive_url.is_none());
        assert!(config.service_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_vars(&vars(&[
            ("BILLVAULT_BIND", "127.0.0.1"),
            ("PORT", "9090"),
            ("ARCHIVE_THRESHOLD_DAYS", "30"),
            ("BILLVAULT_MIGRATION_INTERVAL_SECS", "0"),
            ("BILLVAULT_MIGRATION_CONCURRENCY", "2"),
            ("BILLVAULT_ARCHIVE_URL", "http://archive.internal:8080"),
            ("BILLVAULT_SERVICE_KEY", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9090".parse().unwrap());
        assert_eq!(config.archival.archive_threshold_days, 30);
        assert_eq!(config.archival.concurrency, 2);
        assert_eq!(config.migration_interval, None);
        assert_eq!(
            config.archive_url.as_deref(),
            Some("http://archive.internal:8080")
        );
        assert!(config.service_key.unwrap().matches(b"s3cret"));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let err = ServiceConfig::from_vars(&vars(&[("ARCHIVE_THRESHOLD_DAYS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_unparseable_value_rejected() {
        let err = ServiceConfig::from_vars(&vars(&[("ARCHIVE_THRESHOLD_DAYS", "ninety")]))
            .unwrap_err();
        match err {
            ConfigError::InvalidValue { field, value, .. } => {
                assert_eq!(field, "ARCHIVE_THRESHOLD_DAYS");
                assert_eq!(value, "ninety");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_archive_url_requires_service_key() {
        let err = ServiceConfig::from_vars(&vars(&[(
            "BILLVAULT_ARCHIVE_URL",
            "http://archive.internal",
        )]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingRequired {
                field: "BILLVAULT_SERVICE_KEY".to_string()
            }
        );
    }

    #[test]
    fn test_from_env_reads_process_environment() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _threshold = EnvVarGuard::set("ARCHIVE_THRESHOLD_DAYS", Some("45"));
        let _url = EnvVarGuard::set("BILLVAULT_ARCHIVE_URL", None);

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.archival.archive_threshold_days, 45);
    }

    #[test]
    fn test_service_key_matching() {
        let key = ServiceKey::new("abc").unwrap();
        assert!(key.matches(b"abc"));
        assert!(!key.matches(b"abd"));
        assert!(!key.matches(b"ab"));
        assert!(!key.matches(b""));
        assert!(ServiceKey::new("  ").is_err());
    }

    #[test]
    fn test_service_key_never_debug_printed() {
        let key = ServiceKey::new("s3cret-value").unwrap();
        let printed = format!("{:?}", key);
        assert!(printed.starts_with("ServiceKey("));
        assert!(!printed.contains("s3cret-value"));

        let config = ServiceConfig {
            service_key: Some(key),
            ..ServiceConfig::default()
        };
        assert!(!format!("{:?}", config).contains("s3cret-value"));
    }

    #[test]
    fn test_service_key_must_be_header_safe() {
        for bad in ["line\nbreak", "del\u{7f}char", "nul\u{0}byte"] {
            match ServiceKey::new(bad) {
                Err(ConfigError::InvalidValue { field, value, .. }) => {
                    assert_eq!(field, "BILLVAULT_SERVICE_KEY");
                    assert!(!value.contains(bad));
                }
                other => panic!("expected InvalidValue for {:?}, got {:?}", bad, other.is_ok()),
            }
        }

        let vars: HashMap<String, String> =
            [("BILLVAULT_SERVICE_KEY".to_string(), "bad\r\nkey".to_string())]
                .into_iter()
                .collect();
        assert!(matches!(
            ServiceConfig::from_vars(&vars),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
