//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).
//!
//! | Variable                          | Default   |
//! |-----------------------------------|-----------|
//! | `STREAM_URL`                      | required  |
//! | `STREAM_COLLECTIONS`              | required  |
//! | `STREAM_SUBJECT_ID`               | unset     |
//! | `STREAM_ENABLED`                  | `true`    |
//! | `STREAM_MAX_ATTEMPTS`             | `5`       |
//! | `STREAM_BASE_DELAY_MS`            | `1000`    |
//! | `STREAM_FORCE_RECONNECT_DELAY_MS` | `100`     |
//! | `STREAM_LIVENESS_TIMEOUT_SECS`    | `0` (off) |
//! | `STREAM_MAX_MESSAGE_BYTES`        | `1048576` |
//! | `LOG_FORMAT`                      | `text`    |

use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::client::{ClientOptions, ReconnectPolicy};
use crate::domain::{DEFAULT_MAX_MESSAGE_BYTES, SubscriptionConfig};
use crate::error::ConfigError;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Invalid {
                key: "LOG_FORMAT",
                reason: format!("unknown format `{other}`"),
            }),
        }
    }
}

/// Top-level client configuration.
///
/// Loaded once at startup via [`StreamConfig::from_env`].
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Stream endpoint; subscription parameters are appended to it.
    pub endpoint: Url,
    /// What to subscribe to.
    pub subscription: SubscriptionConfig,
    /// Reconnect and parsing tunables.
    pub options: ClientOptions,
    /// Log output format.
    pub log_format: LogFormat,
}

impl StreamConfig {
    /// Loads configuration from the process environment.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// See [`StreamConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// Numeric settings fall back to their defaults when missing or
    /// unparsable.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Missing`] if `STREAM_URL` or `STREAM_COLLECTIONS`
    ///   is not set.
    /// - [`ConfigError::Invalid`] if the URL does not parse, the collection
    ///   list is blank, or `LOG_FORMAT` is unknown.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_url = lookup("STREAM_URL").ok_or(ConfigError::Missing("STREAM_URL"))?;
        let endpoint = Url::parse(&raw_url).map_err(|err| ConfigError::Invalid {
            key: "STREAM_URL",
            reason: err.to_string(),
        })?;

        let collections =
            lookup("STREAM_COLLECTIONS").ok_or(ConfigError::Missing("STREAM_COLLECTIONS"))?;
        let mut subscription = SubscriptionConfig::new(collections.split(','))
            .map_err(|_| ConfigError::Invalid {
                key: "STREAM_COLLECTIONS",
                reason: "no collection names given".to_string(),
            })?
            .with_enabled(parse_bool(&lookup, "STREAM_ENABLED", true));
        if let Some(subject) = lookup("STREAM_SUBJECT_ID") {
            subscription = subscription.with_subject(subject);
        }

        let policy = ReconnectPolicy::new(
            parse(&lookup, "STREAM_MAX_ATTEMPTS", 5),
            Duration::from_millis(parse(&lookup, "STREAM_BASE_DELAY_MS", 1000)),
        );
        let liveness_secs: u64 = parse(&lookup, "STREAM_LIVENESS_TIMEOUT_SECS", 0);
        let options = ClientOptions {
            policy,
            force_reconnect_delay: Duration::from_millis(parse(
                &lookup,
                "STREAM_FORCE_RECONNECT_DELAY_MS",
                100,
            )),
            liveness_timeout: (liveness_secs > 0).then(|| Duration::from_secs(liveness_secs)),
            max_message_bytes: parse(&lookup, "STREAM_MAX_MESSAGE_BYTES", DEFAULT_MAX_MESSAGE_BYTES),
        };

        let log_format: LogFormat = lookup("LOG_FORMAT")
            .map(|v| v.parse::<LogFormat>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            endpoint,
            subscription,
            options,
            log_format,
        })
    }
}

/// Parses a setting as `T`, returning `default` on missing or invalid
/// values.
fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses a setting as a boolean. Accepts `"true"`, `"1"`, `"false"`,
/// `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
