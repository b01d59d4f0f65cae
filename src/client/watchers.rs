//! Page-visibility and network watchers.
//!
//! The decision logic is pure ([`react`]); [`EnvironmentWatchers`] is the
//! registration itself: one receiver on the [`EnvironmentBus`], created in
//! the same scope as the connection manager and dropped with it.

use tokio::sync::broadcast;

use super::state::ConnectionState;
use crate::domain::{EnvironmentBus, EnvironmentSignal, Network, Visibility};

/// What the manager should do in response to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherAction {
    /// Nothing to do.
    Ignore,
    /// Tear down and start a fresh attempt.
    ForceReconnect,
    /// Record a `network offline` error without reconnecting.
    ReportOffline,
}

/// Decides how to react to `signal`.
///
/// Both watchers are inert while the subscription is disabled. A reconnect
/// is only requested when the client is neither connected nor already
/// attempting to connect.
#[must_use]
pub fn react(
    signal: EnvironmentSignal,
    enabled: bool,
    state: ConnectionState,
    connecting: bool,
) -> WatcherAction {
    if !enabled {
        return WatcherAction::Ignore;
    }
    let needs_connection = state != ConnectionState::Connected && !connecting;
    match signal {
        EnvironmentSignal::Visibility(Visibility::Visible)
        | EnvironmentSignal::Network(Network::Online)
            if needs_connection =>
        {
            WatcherAction::ForceReconnect
        }
        EnvironmentSignal::Network(Network::Offline) => WatcherAction::ReportOffline,
        _ => WatcherAction::Ignore,
    }
}

/// The single watcher registration of one subscription.
#[derive(Debug)]
pub struct EnvironmentWatchers {
    receiver: Option<broadcast::Receiver<EnvironmentSignal>>,
}

impl EnvironmentWatchers {
    /// Registers on `bus`, or creates an inert registration.
    #[must_use]
    pub fn register(bus: Option<&EnvironmentBus>) -> Self {
        Self {
            receiver: bus.map(EnvironmentBus::subscribe),
        }
    }

    /// Waits for the next signal. Never resolves once the bus is gone or
    /// when no bus was given.
    pub async fn next(&mut self) -> EnvironmentSignal {
        loop {
            let Some(receiver) = self.receiver.as_mut() else {
                return std::future::pending().await;
            };
            match receiver.recv().await {
                Ok(signal) => return signal,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "environment watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => self.receiver = None,
            }
        }
    }
}
