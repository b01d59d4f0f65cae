//! Broadcast channel for host environment signals.
//!
//! A browser page tells the client about tab visibility and network
//! connectivity. Outside a browser the host application publishes the same
//! signals on an [`EnvironmentBus`]; every subscription facade holds exactly
//! one receiver for its lifetime.

use tokio::sync::broadcast;

/// Page visibility as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// The page (or host window) is in the foreground.
    Visible,
    /// The page is hidden.
    Hidden,
}

/// Network reachability as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// Connectivity was regained.
    Online,
    /// Connectivity was lost.
    Offline,
}

/// One lifecycle signal from the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentSignal {
    /// Visibility changed.
    Visibility(Visibility),
    /// Network status changed.
    Network(Network),
}

/// Broadcast bus for [`EnvironmentSignal`]s.
///
/// Backed by a `tokio::broadcast` channel. Signals published while no
/// facade is listening are dropped.
#[derive(Debug, Clone)]
pub struct EnvironmentBus {
    sender: broadcast::Sender<EnvironmentSignal>,
}

impl EnvironmentBus {
    /// Creates a new bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes a signal to every registered watcher.
    ///
    /// Returns the number of receivers that got the signal.
    pub fn publish(&self, signal: EnvironmentSignal) -> usize {
        self.sender.send(signal).unwrap_or(0)
    }

    /// Reports a visibility change.
    pub fn set_visibility(&self, visibility: Visibility) -> usize {
        self.publish(EnvironmentSignal::Visibility(visibility))
    }

    /// Reports a network change.
    pub fn set_network(&self, network: Network) -> usize {
        self.publish(EnvironmentSignal::Network(network))
    }

    /// Registers a new watcher.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EnvironmentSignal> {
        self.sender.subscribe()
    }

    /// Returns the number of currently registered watchers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EnvironmentBus {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_watchers_returns_zero() {
        let bus = EnvironmentBus::default();
        assert_eq!(bus.set_network(Network::Online), 0);
    }

    #[tokio::test]
    async fn watcher_receives_signal() {
        let bus = EnvironmentBus::default();
        let mut rx = bus.subscribe();

        bus.set_visibility(Visibility::Visible);

        let Ok(signal) = rx.recv().await else {
            panic!("expected a signal");
        };
        assert_eq!(signal, EnvironmentSignal::Visibility(Visibility::Visible));
    }

    #[test]
    fn receiver_count_tracks_registrations() {
        let bus = EnvironmentBus::default();
        let rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);
        drop(rx1);
        assert_eq!(bus.receiver_count(), 1);
    }
}
