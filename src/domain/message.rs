//! Wire vocabulary of the change stream.
//!
//! Every stream frame is a JSON object whose `type` field selects one of
//! four variants. `type` is the sole dispatch key; values this client does
//! not know are parsed to [`Message::Unknown`] so newer producers can add
//! message kinds without breaking older clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Default upper bound for a single frame (1 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

const KNOWN_TYPES: [&str; 4] = ["connection", "change", "heartbeat", "error"];

/// Kind of mutation reported by a `change` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    /// A document was inserted.
    Insert,
    /// A document was partially updated.
    Update,
    /// A document was deleted.
    Delete,
    /// A document was replaced wholesale.
    Replace,
}

impl ChangeOperation {
    /// Returns the wire name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Replace => "replace",
        }
    }
}

/// A parsed stream message.
///
/// Timestamps default to the time of receipt when the producer omits them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// The producer accepted the subscription; the stream is usable.
    Connection {
        /// Producer timestamp.
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// A subscribed collection changed.
    Change {
        /// Collection the change belongs to.
        collection: String,
        /// What happened to the document.
        operation: ChangeOperation,
        /// Opaque payload, passed through untouched.
        #[serde(default)]
        data: serde_json::Value,
        /// Producer timestamp.
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// Liveness signal with no side effect.
    Heartbeat {
        /// Producer timestamp.
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// Producer-side diagnostic. Logged, never fatal.
    Error {
        /// Opaque diagnostic payload.
        #[serde(default)]
        data: serde_json::Value,
        /// Producer timestamp, if sent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    /// A `type` this client does not understand.
    #[serde(skip)]
    Unknown {
        /// The unrecognised `type` value.
        kind: String,
    },
}

impl Message {
    /// Returns the `type` discriminator of this message.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Change { .. } => "change",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Error { .. } => "error",
            Self::Unknown { kind } => kind,
        }
    }

    /// Returns the collection name for `change` messages.
    #[must_use]
    pub fn collection(&self) -> Option<&str> {
        match self {
            Self::Change { collection, .. } => Some(collection),
            _ => None,
        }
    }
}

/// Parses a frame with the default size limit.
///
/// # Errors
///
/// See [`parse_with_limit`].
pub fn parse(raw: &str) -> Result<Message, ParseError> {
    parse_with_limit(raw, DEFAULT_MAX_MESSAGE_BYTES)
}

/// Parses a frame, rejecting anything larger than `limit` bytes.
///
/// # Errors
///
/// - [`ParseError::Empty`] for blank frames.
/// - [`ParseError::TooLarge`] when `raw` exceeds `limit`.
/// - [`ParseError::MissingType`] when the payload is not an object with a
///   string `type`.
/// - [`ParseError::Json`] for invalid JSON or a known type with bad fields.
pub fn parse_with_limit(raw: &str, limit: usize) -> Result<Message, ParseError> {
    if raw.len() > limit {
        return Err(ParseError::TooLarge {
            size: raw.len(),
            limit,
        });
    }
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ParseError::Empty);
    }

    let value: serde_json::Value = serde_json::from_str(raw)?;
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(ParseError::MissingType)?;
    if !KNOWN_TYPES.contains(&kind) {
        return Ok(Message::Unknown {
            kind: kind.to_string(),
        });
    }
    Ok(serde_json::from_value(value)?)
}
