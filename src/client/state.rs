//! Connection state and the reactive snapshot published to consumers.

use std::fmt;
use std::time::Duration;

use crate::domain::Message;
use crate::error::StreamError;

/// Lifecycle state of one subscription's connection.
///
/// Only transport events and the manager's control operations move it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport and no pending attempt.
    #[default]
    Disconnected,
    /// First attempt in flight.
    Connecting,
    /// The producer confirmed the subscription.
    Connected,
    /// A retry is scheduled or in flight after a failure.
    Reconnecting,
    /// Retries exhausted; waiting for `force_reconnect`.
    Failed,
}

impl ConnectionState {
    /// Returns the state name in lower case.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a subscription, published on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionSnapshot {
    /// Current connection state.
    pub state: ConnectionState,
    /// Most recent error, cleared on connect and on `force_reconnect`.
    pub last_error: Option<StreamError>,
    /// Most recent successfully parsed message.
    pub last_message: Option<Message>,
    /// Reconnect attempts since the last successful connection.
    pub reconnect_attempts: u32,
    /// Delay of the armed reconnect, if one is pending.
    pub retry_delay: Option<Duration>,
}

impl ConnectionSnapshot {
    /// Returns `true` if consumers should show a transient indicator.
    #[must_use]
    pub fn is_reconnecting(&self) -> bool {
        self.state == ConnectionState::Reconnecting
    }

    /// Returns `true` if consumers should show a persistent "connection
    /// lost" indicator with a manual retry.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state == ConnectionState::Failed
    }
}
