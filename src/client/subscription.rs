//! Subscription facade: the public entry point.
//!
//! [`Subscription::builder`] wires a [`ConnectionManager`], its transport
//! and the environment watchers into one driver task. The task owns every
//! piece of mutable state; the [`Subscription`] handle only sends commands
//! and reads the published [`ConnectionSnapshot`].

use std::sync::Arc;

use reqwest::Url;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use super::listener::{CacheInvalidator, NoopListener, SubscriptionListener};
use super::manager::{Collaborators, ConnectionManager, TimerKind};
use super::options::ClientOptions;
use super::state::{ConnectionSnapshot, ConnectionState};
use super::watchers::EnvironmentWatchers;
use crate::domain::{ChangeOperation, EnvironmentBus, Message, SubscriptionConfig, SubscriptionId};
use crate::error::StreamError;
use crate::transport::{HttpTransport, Transport, TransportEnvelope};

#[derive(Debug)]
enum Command {
    ForceReconnect,
    SetEnabled {
        enabled: bool,
        done: oneshot::Sender<()>,
    },
    Shutdown,
}

fn ignore_change(_: &str, _: ChangeOperation, _: &serde_json::Value) {}

/// Configures and spawns a [`Subscription`].
pub struct SubscriptionBuilder {
    endpoint: Url,
    config: SubscriptionConfig,
    options: ClientOptions,
    transport: Option<Arc<dyn Transport>>,
    listener: Arc<dyn SubscriptionListener>,
    invalidator: Arc<dyn CacheInvalidator>,
    environment: Option<EnvironmentBus>,
}

impl std::fmt::Debug for SubscriptionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionBuilder")
            .field("endpoint", &self.endpoint.as_str())
            .field("config", &self.config)
            .field("options", &self.options)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl SubscriptionBuilder {
    /// Overrides the client options.
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Uses `transport` instead of the default [`HttpTransport`].
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Installs lifecycle callbacks.
    #[must_use]
    pub fn listener(mut self, listener: impl SubscriptionListener + 'static) -> Self {
        self.listener = Arc::new(listener);
        self
    }

    /// Installs the cache hook called for each relevant change.
    #[must_use]
    pub fn invalidator(mut self, invalidator: impl CacheInvalidator + 'static) -> Self {
        self.invalidator = Arc::new(invalidator);
        self
    }

    /// Registers the visibility and network watchers on `bus`.
    #[must_use]
    pub fn environment(mut self, bus: &EnvironmentBus) -> Self {
        self.environment = Some(bus.clone());
        self
    }

    /// Spawns the driver task. If the config is enabled the first
    /// connection attempt starts immediately.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn spawn(self) -> Subscription {
        let id = SubscriptionId::new();
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new().max_event_bytes(self.options.max_message_bytes)),
        };
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(ConnectionSnapshot::default());
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let manager = ConnectionManager::new(
            self.endpoint,
            self.config,
            self.options,
            Collaborators {
                transport,
                listener: self.listener,
                invalidator: self.invalidator,
            },
            event_tx,
            snapshot_tx,
        );
        let watchers = EnvironmentWatchers::register(self.environment.as_ref());

        let span = tracing::info_span!("subscription", id = %id);
        let driver = tokio::spawn(drive(manager, command_rx, event_rx, watchers).instrument(span));

        Subscription {
            id,
            commands: command_tx,
            snapshot: snapshot_rx,
            driver: Some(driver),
        }
    }
}

/// Live handle to one subscription.
///
/// Dropping the handle tears the connection down in the background; use
/// [`Subscription::close`] to wait for teardown.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<ConnectionSnapshot>,
    driver: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Starts configuring a subscription to `endpoint`.
    #[must_use]
    pub fn builder(endpoint: Url, config: SubscriptionConfig) -> SubscriptionBuilder {
        SubscriptionBuilder {
            endpoint,
            config,
            options: ClientOptions::default(),
            transport: None,
            listener: Arc::new(NoopListener),
            invalidator: Arc::new(ignore_change),
            environment: None,
        }
    }

    /// Identifier used in this subscription's log span.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.snapshot.borrow().state
    }

    /// Most recent error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<StreamError> {
        self.snapshot.borrow().last_error.clone()
    }

    /// Most recent message, if any.
    #[must_use]
    pub fn last_message(&self) -> Option<Message> {
        self.snapshot.borrow().last_message.clone()
    }

    /// Reconnect attempts since the last successful connection.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.snapshot.borrow().reconnect_attempts
    }

    /// Receiver notified on every snapshot change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.snapshot.clone()
    }

    /// Requests a fresh connection with a reset attempt counter. This is
    /// the manual retry affordance for the `Failed` state.
    pub fn force_reconnect(&self) {
        if self.commands.send(Command::ForceReconnect).is_err() {
            tracing::debug!(id = %self.id, "force_reconnect after shutdown");
        }
    }

    /// Enables or disables the subscription. Returns once the driver has
    /// applied the change; after `set_enabled(false)` no transport is open
    /// and no timer is pending.
    pub async fn set_enabled(&self, enabled: bool) {
        let (done, applied) = oneshot::channel();
        if self
            .commands
            .send(Command::SetEnabled { enabled, done })
            .is_err()
        {
            return;
        }
        if applied.await.is_err() {
            tracing::debug!(id = %self.id, "driver stopped before applying set_enabled");
        }
    }

    /// Tears the subscription down and waits for the driver to finish.
    pub async fn close(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(driver) = self.driver.take()
            && let Err(err) = driver.await
        {
            tracing::warn!(id = %self.id, error = %err, "subscription driver ended abnormally");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.driver.is_some() {
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

async fn drive(
    mut manager: ConnectionManager,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut transport_events: mpsc::UnboundedReceiver<TransportEnvelope>,
    mut watchers: EnvironmentWatchers,
) {
    manager.connect();

    loop {
        let deadline = manager.next_deadline();
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::ForceReconnect) => manager.force_reconnect(),
                Some(Command::SetEnabled { enabled, done }) => {
                    manager.set_enabled(enabled);
                    let _ = done.send(());
                }
                Some(Command::Shutdown) | None => break,
            },
            Some(envelope) = transport_events.recv() => manager.handle_transport_event(envelope),
            signal = watchers.next() => manager.handle_environment(signal),
            () = sleep_until(deadline) => {
                if let Some((kind, _)) = deadline {
                    manager.fire_timer(kind);
                }
            }
        }
    }

    manager.disconnect();
    drop(watchers);
    tracing::debug!("subscription closed");
}

async fn sleep_until(deadline: Option<(TimerKind, Instant)>) {
    match deadline {
        Some((_, at)) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
