//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use domain::TransitionPolicy;
use secrecy::SecretString;
use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Where purchased assets live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Local { root: PathBuf },
    S3 { bucket: String },
}

/// Server configuration.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `APP_ENV`: environment name reported by `/health` (default: `"development"`)
/// - `DATABASE_URL`: PostgreSQL URL; in-memory stores when unset
/// - `AUTH_JWT_SECRET`: bearer token secret (required)
/// - `PAYMENT_API_KEY`, `PAYMENT_API_BASE_URL`: payment provider credentials
/// - `PAYMENT_WEBHOOK_SECRET`: webhook signing secret
/// - `CLIENT_URL`: base URL for checkout redirects
/// - `DOWNLOAD_TOKEN_SECRET`, `DOWNLOAD_TOKEN_TTL_SECS` (default: `900`)
/// - `STORAGE_BACKEND`: `local` or `s3` (default: `local`)
/// - `STORAGE_ROOT`: local asset root (default: `"./storage"`)
/// - `S3_BUCKET`, `SIGNED_URL_TTL_SECS` (default: `300`)
/// - `UPSTREAM_TIMEOUT_MS` (default: `10000`)
/// - `RECONCILE_INTERVAL_SECS` (default: `300`, `0` disables)
/// - `RECONCILE_LOOKBACK_HOURS` (default: `24`)
/// - `ORDER_TRANSITION_POLICY`: `forward_only` or `last_write_wins` (default: `forward_only`)
///
/// Optional secrets are left unset rather than failing startup; the
/// features that need them refuse requests until they are configured.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub environment: String,
    pub database_url: Option<SecretString>,
    pub auth_jwt_secret: SecretString,
    pub payment_api_key: Option<SecretString>,
    pub payment_api_base_url: String,
    pub payment_webhook_secret: Option<SecretString>,
    pub client_url: Option<String>,
    pub download_token_secret: Option<SecretString>,
    pub download_token_ttl: Duration,
    pub storage: StorageBackend,
    pub signed_url_ttl: Duration,
    pub upstream_timeout: Duration,
    pub reconcile_interval: Option<Duration>,
    pub reconcile_lookback: Duration,
    pub transition_policy: TransitionPolicy,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, treating blank values as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let secret = |key: &str| get(key).map(SecretString::new);

        let storage = match get("STORAGE_BACKEND").as_deref().unwrap_or("local") {
            "local" => StorageBackend::Local {
                root: PathBuf::from(get("STORAGE_ROOT").unwrap_or_else(|| "./storage".to_string())),
            },
            "s3" => StorageBackend::S3 {
                bucket: get("S3_BUCKET").ok_or(ConfigError::Missing("S3_BUCKET"))?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    var: "STORAGE_BACKEND",
                    reason: format!("expected local or s3, got {other:?}"),
                });
            }
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    reason: format!("expected text or json, got {other:?}"),
                });
            }
        };

        let transition_policy = match get("ORDER_TRANSITION_POLICY") {
            Some(value) => value.parse().map_err(|e: domain::OrderError| ConfigError::Invalid {
                var: "ORDER_TRANSITION_POLICY",
                reason: e.to_string(),
            })?,
            None => TransitionPolicy::default(),
        };

        let reconcile_secs = parse_or(&get, "RECONCILE_INTERVAL_SECS", 300u64)?;

        // Token expiry is a signed unix timestamp.
        let token_ttl_secs = parse_or(&get, "DOWNLOAD_TOKEN_TTL_SECS", 900u64)?;
        if i64::try_from(token_ttl_secs).is_err() {
            return Err(ConfigError::Invalid {
                var: "DOWNLOAD_TOKEN_TTL_SECS",
                reason: format!("{token_ttl_secs} does not fit a signed timestamp"),
            });
        }

        let lookback_hours = parse_or(&get, "RECONCILE_LOOKBACK_HOURS", 24u64)?;
        let reconcile_lookback = lookback_hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .filter(|lookback| chrono::Duration::from_std(*lookback).is_ok())
            .ok_or_else(|| ConfigError::Invalid {
                var: "RECONCILE_LOOKBACK_HOURS",
                reason: format!("{lookback_hours} hours is out of range"),
            })?;

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", 3000u16)?,
            log_level: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_format,
            environment: get("APP_ENV").unwrap_or_else(|| "development".to_string()),
            database_url: secret("DATABASE_URL"),
            auth_jwt_secret: secret("AUTH_JWT_SECRET").ok_or(ConfigError::Missing("AUTH_JWT_SECRET"))?,
            payment_api_key: secret("PAYMENT_API_KEY"),
            payment_api_base_url: get("PAYMENT_API_BASE_URL")
                .unwrap_or_else(|| payments::stripe::DEFAULT_API_BASE_URL.to_string()),
            payment_webhook_secret: secret("PAYMENT_WEBHOOK_SECRET"),
            client_url: get("CLIENT_URL"),
            download_token_secret: secret("DOWNLOAD_TOKEN_SECRET"),
            download_token_ttl: Duration::from_secs(token_ttl_secs),
            storage,
            signed_url_ttl: Duration::from_secs(parse_or(&get, "SIGNED_URL_TTL_SECS", 300u64)?),
            upstream_timeout: Duration::from_millis(parse_or(&get, "UPSTREAM_TIMEOUT_MS", 10_000u64)?),
            reconcile_interval: (reconcile_secs > 0).then(|| Duration::from_secs(reconcile_secs)),
            reconcile_lookback,
            transition_policy,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
