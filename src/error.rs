//! Error taxonomy for the stream client.
//!
//! [`StreamError`] is what consumers observe: it is stored in the reactive
//! snapshot and handed to [`crate::client::SubscriptionListener::on_error`].
//! None of these are ever returned from the public control operations
//! (`connect`, `disconnect`, `force_reconnect`), which are infallible from
//! the caller's point of view.

/// Failure to turn a raw stream frame into a [`crate::domain::Message`].
///
/// A parse error is logged and the frame discarded; the connection survives.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The frame carried no payload.
    #[error("empty message")]
    Empty,

    /// The frame exceeds the configured size limit.
    #[error("message of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Size of the rejected frame in bytes.
        size: usize,
        /// Configured maximum in bytes.
        limit: usize,
    },

    /// The payload is not a JSON object with a string `type` field.
    #[error("message has no string `type` field")]
    MissingType,

    /// The payload is not valid JSON or does not match its declared type.
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced to consumers through the snapshot and `on_error`.
///
/// # Error Codes
///
/// | Code | Variant               | Terminal |
/// |------|-----------------------|----------|
/// | 1001 | `Parse`               | no       |
/// | 2001 | `Transport`           | no       |
/// | 2002 | `Liveness`            | no       |
/// | 2003 | `NetworkOffline`      | no       |
/// | 3001 | `MaxAttemptsExceeded` | yes      |
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// A frame could not be parsed. Carries the rendered [`ParseError`].
    #[error("parse error: {0}")]
    Parse(String),

    /// The transport failed; the diagnostic is derived from its ready state.
    #[error("transport error: {diagnostic}")]
    Transport {
        /// Human-readable classification of the failure.
        diagnostic: String,
    },

    /// No message arrived within the liveness window.
    #[error("liveness timeout: no message for {timeout_ms} ms")]
    Liveness {
        /// Configured liveness window in milliseconds.
        timeout_ms: u64,
    },

    /// The environment reported that the network went offline.
    #[error("network offline")]
    NetworkOffline,

    /// Reconnection gave up; only `force_reconnect` leaves this state.
    #[error("max reconnect attempts exceeded ({attempts})")]
    MaxAttemptsExceeded {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

impl StreamError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Parse(_) => 1001,
            Self::Transport { .. } => 2001,
            Self::Liveness { .. } => 2002,
            Self::NetworkOffline => 2003,
            Self::MaxAttemptsExceeded { .. } => 3001,
        }
    }

    /// Returns `true` if the client stopped retrying because of this error.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::MaxAttemptsExceeded { .. })
    }
}

impl From<ParseError> for StreamError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Startup configuration failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing required setting {0}")]
    Missing(&'static str),

    /// A setting is present but unusable.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Environment variable name.
        key: &'static str,
        /// What is wrong with the value.
        reason: String,
    },
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn only_max_attempts_is_terminal() {
        assert!(StreamError::MaxAttemptsExceeded { attempts: 5 }.is_terminal());
        assert!(!StreamError::NetworkOffline.is_terminal());
        assert!(
            !StreamError::Transport {
                diagnostic: "closed".to_string()
            }
            .is_terminal()
        );
    }

    #[test]
    fn parse_error_converts_with_message() {
        let err: StreamError = ParseError::TooLarge { size: 10, limit: 4 }.into();
        assert_eq!(err.error_code(), 1001);
        assert!(err.to_string().contains("exceeds limit of 4 bytes"));
    }

    #[test]
    fn codes_are_distinct() {
        let codes = [
            StreamError::Parse(String::new()).error_code(),
            StreamError::Transport {
                diagnostic: String::new(),
            }
            .error_code(),
            StreamError::Liveness { timeout_ms: 1 }.error_code(),
            StreamError::NetworkOffline.error_code(),
            StreamError::MaxAttemptsExceeded { attempts: 1 }.error_code(),
        ];
        let unique: std::collections::HashSet<u32> = codes.iter().copied().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
