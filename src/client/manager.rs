//! Connection manager: owner of the single transport handle.
//!
//! [`ConnectionManager`] is synchronous. It never sleeps and never spawns;
//! timers are plain deadlines stored in its fields, and whoever drives it
//! (the subscription task, or a test) sleeps until [`next_deadline`] and
//! then calls [`fire_timer`]. Arming a timer always replaces the previous
//! one, so there can never be two overlapping reconnect attempts.
//!
//! [`next_deadline`]: ConnectionManager::next_deadline
//! [`fire_timer`]: ConnectionManager::fire_timer

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::dispatch::{Effect, transition};
use super::listener::{CacheInvalidator, SubscriptionListener, guarded};
use super::options::ClientOptions;
use super::state::{ConnectionSnapshot, ConnectionState};
use super::watchers::{WatcherAction, react};
use crate::domain::{EnvironmentSignal, Message, SubscriptionConfig, parse_with_limit};
use crate::error::StreamError;
use crate::transport::{
    EventSink, ReadyState, Transport, TransportEnvelope, TransportEvent, TransportHandle,
};

/// Why a timer was armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Backoff retry after a transport failure.
    Reconnect,
    /// Deferred reopen after `force_reconnect`.
    ForcedConnect,
    /// Liveness watchdog.
    Liveness,
}

/// An armed connect timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    /// Reconnect or forced connect.
    pub kind: TimerKind,
    /// Delay it was armed with.
    pub delay: Duration,
    /// When it fires.
    pub deadline: Instant,
}

/// Collaborators the manager calls out to.
#[derive(Clone)]
pub struct Collaborators {
    /// Opens streams.
    pub transport: Arc<dyn Transport>,
    /// Lifecycle callbacks.
    pub listener: Arc<dyn SubscriptionListener>,
    /// Cache hook.
    pub invalidator: Arc<dyn CacheInvalidator>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

/// State machine plus the single live transport of one subscription.
pub struct ConnectionManager {
    endpoint: Url,
    config: SubscriptionConfig,
    options: ClientOptions,
    collaborators: Collaborators,
    events: mpsc::UnboundedSender<TransportEnvelope>,
    snapshot: watch::Sender<ConnectionSnapshot>,

    handle: Option<Box<dyn TransportHandle>>,
    generation: u64,
    connecting: bool,
    state: ConnectionState,
    attempts: u32,
    last_error: Option<StreamError>,
    last_message: Option<Message>,
    connect_timer: Option<PendingTimer>,
    watchdog: Option<Instant>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint.as_str())
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .field("connecting", &self.connecting)
            .field("generation", &self.generation)
            .field("connect_timer", &self.connect_timer)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates an idle manager. Nothing is opened until [`connect`].
    ///
    /// Transport events must be read from the receiver paired with
    /// `events` and fed to [`handle_transport_event`].
    ///
    /// [`connect`]: Self::connect
    /// [`handle_transport_event`]: Self::handle_transport_event
    #[must_use]
    pub fn new(
        endpoint: Url,
        config: SubscriptionConfig,
        options: ClientOptions,
        collaborators: Collaborators,
        events: mpsc::UnboundedSender<TransportEnvelope>,
        snapshot: watch::Sender<ConnectionSnapshot>,
    ) -> Self {
        Self {
            endpoint,
            config,
            options,
            collaborators,
            events,
            snapshot,
            handle: None,
            generation: 0,
            connecting: false,
            state: ConnectionState::Disconnected,
            attempts: 0,
            last_error: None,
            last_message: None,
            connect_timer: None,
            watchdog: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnect attempts since the last successful connection.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether an attempt is in flight.
    #[must_use]
    pub const fn is_connecting(&self) -> bool {
        self.connecting
    }

    /// Whether a transport handle is held.
    #[must_use]
    pub const fn has_transport(&self) -> bool {
        self.handle.is_some()
    }

    /// Ready state of the held transport, if any.
    #[must_use]
    pub fn transport_ready_state(&self) -> Option<ReadyState> {
        self.handle.as_ref().map(|h| h.ready_state())
    }

    /// The armed connect timer, if any.
    #[must_use]
    pub const fn pending_timer(&self) -> Option<PendingTimer> {
        self.connect_timer
    }

    /// Whether any timer (connect or watchdog) is armed.
    #[must_use]
    pub const fn has_pending_timer(&self) -> bool {
        self.connect_timer.is_some() || self.watchdog.is_some()
    }

    /// Subscription this manager serves.
    #[must_use]
    pub const fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// Most recent error.
    #[must_use]
    pub const fn last_error(&self) -> Option<&StreamError> {
        self.last_error.as_ref()
    }

    /// Builds the snapshot consumers see.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.state,
            last_error: self.last_error.clone(),
            last_message: self.last_message.clone(),
            reconnect_attempts: self.attempts,
            retry_delay: self.connect_timer.map(|t| t.delay),
        }
    }

    /// Earliest armed timer.
    #[must_use]
    pub fn next_deadline(&self) -> Option<(TimerKind, Instant)> {
        let connect = self.connect_timer.map(|t| (t.kind, t.deadline));
        let watchdog = self.watchdog.map(|d| (TimerKind::Liveness, d));
        match (connect, watchdog) {
            (Some(c), Some(w)) => Some(if w.1 < c.1 { w } else { c }),
            (c, w) => c.or(w),
        }
    }

    /// Opens a transport unless one is open, an attempt is in flight, the
    /// subscription is disabled, or retries are exhausted.
    pub fn connect(&mut self) {
        if !self.config.is_enabled() {
            tracing::debug!("connect skipped: subscription disabled");
            return;
        }
        if self.connecting || self.handle.is_some() {
            tracing::debug!(state = %self.state, "connect skipped: already connected or connecting");
            return;
        }
        if self.state == ConnectionState::Failed {
            tracing::debug!("connect skipped: retries exhausted, waiting for force_reconnect");
            return;
        }

        self.connect_timer = None;
        self.connecting = true;
        self.generation = self.generation.wrapping_add(1);
        if self.state != ConnectionState::Reconnecting {
            self.state = ConnectionState::Connecting;
        }

        let url = self.config.stream_url(&self.endpoint);
        tracing::info!(
            generation = self.generation,
            attempts = self.attempts,
            url = %url,
            "opening stream"
        );
        let sink = EventSink::new(self.generation, self.events.clone());
        self.handle = Some(self.collaborators.transport.open(&url, sink));
        // A stream that never greets us must still fail the attempt.
        self.arm_watchdog();
        self.publish();
    }

    /// Closes the transport and cancels every timer. Idempotent.
    pub fn disconnect(&mut self) {
        let was_connected = self.state == ConnectionState::Connected;
        self.connect_timer = None;
        self.watchdog = None;
        self.close_transport();
        self.connecting = false;
        self.state = ConnectionState::Disconnected;
        self.publish();

        if was_connected {
            tracing::info!("stream disconnected");
            let listener = &self.collaborators.listener;
            guarded("on_disconnect", || listener.on_disconnect());
        }
    }

    /// Drops the current connection and schedules a fresh attempt with a
    /// clean attempt counter after the configured short delay.
    pub fn force_reconnect(&mut self) {
        if !self.config.is_enabled() {
            tracing::debug!("force_reconnect skipped: subscription disabled");
            return;
        }
        tracing::info!(attempts = self.attempts, "forcing reconnect");
        self.attempts = 0;
        self.last_error = None;
        self.disconnect();
        self.arm_connect_timer(TimerKind::ForcedConnect, self.options.force_reconnect_delay);
        self.publish();
    }

    /// Enables or disables the subscription. Disabling tears everything
    /// down before returning; enabling starts exactly one attempt.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.config.is_enabled() == enabled {
            return;
        }
        self.config.set_enabled(enabled);
        self.attempts = 0;
        self.last_error = None;
        if enabled {
            tracing::info!("subscription enabled");
            self.state = ConnectionState::Disconnected;
            self.connect();
        } else {
            tracing::info!("subscription disabled");
            self.disconnect();
        }
    }

    /// Fires an armed timer. Timers that were cancelled or replaced in the
    /// meantime are ignored.
    pub fn fire_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::Reconnect | TimerKind::ForcedConnect => {
                if self.connect_timer.map(|t| t.kind) != Some(kind) {
                    return;
                }
                self.connect_timer = None;
                self.connect();
            }
            TimerKind::Liveness => {
                if self.watchdog.take().is_none() {
                    return;
                }
                let timeout_ms = self
                    .options
                    .liveness_timeout
                    .map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
                tracing::warn!(timeout_ms, "no message within liveness window");
                self.handle_failure(StreamError::Liveness { timeout_ms });
            }
        }
    }

    /// Applies one event from the transport. Events from a replaced or
    /// closed transport are dropped.
    pub fn handle_transport_event(&mut self, envelope: TransportEnvelope) {
        if envelope.generation != self.generation || self.handle.is_none() {
            tracing::trace!(
                generation = envelope.generation,
                current = self.generation,
                "dropping stale transport event"
            );
            return;
        }
        match envelope.event {
            TransportEvent::Opened => {
                tracing::debug!(generation = self.generation, "transport open");
            }
            TransportEvent::Message(raw) => self.handle_raw(&raw),
            TransportEvent::Error { ready_state } => {
                tracing::warn!(
                    ready_state = ?ready_state,
                    diagnostic = ready_state.diagnostic(),
                    "transport error"
                );
                self.handle_failure(StreamError::Transport {
                    diagnostic: ready_state.diagnostic().to_string(),
                });
            }
        }
    }

    /// Applies one environment signal.
    pub fn handle_environment(&mut self, signal: EnvironmentSignal) {
        match react(signal, self.config.is_enabled(), self.state, self.connecting) {
            WatcherAction::Ignore => {}
            WatcherAction::ForceReconnect => {
                tracing::info!(?signal, "environment recovered while disconnected");
                self.force_reconnect();
            }
            WatcherAction::ReportOffline => {
                tracing::warn!("network offline");
                self.report_error(StreamError::NetworkOffline);
                self.publish();
            }
        }
    }

    fn handle_raw(&mut self, raw: &str) {
        let message = match parse_with_limit(raw, self.options.max_message_bytes) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "discarding malformed stream message");
                self.report_error(err.into());
                self.publish();
                return;
            }
        };

        let next = transition(self.state, &message);
        if next.state == ConnectionState::Connected && self.state != ConnectionState::Connected {
            self.connecting = false;
            tracing::info!(generation = self.generation, "stream connected");
        }
        self.state = next.state;
        for effect in next.effects {
            self.apply(effect);
        }
        self.last_message = Some(message.clone());
        self.publish();

        let listener = &self.collaborators.listener;
        guarded("on_message", || listener.on_message(&message));
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::ResetAttempts => self.attempts = 0,
            Effect::ClearError => self.last_error = None,
            Effect::NotifyConnect => {
                let listener = &self.collaborators.listener;
                guarded("on_connect", || listener.on_connect());
            }
            Effect::Liveness => self.arm_watchdog(),
            Effect::Invalidate {
                collection,
                operation,
                data,
            } => {
                if !self.config.matches(&collection) {
                    tracing::debug!(%collection, "ignoring change for unsubscribed collection");
                    return;
                }
                tracing::debug!(%collection, operation = operation.as_str(), "invalidating");
                let invalidator = &self.collaborators.invalidator;
                guarded("invalidate", || {
                    invalidator.invalidate(&collection, operation, &data);
                });
            }
            Effect::LogDiagnostic(data) => {
                tracing::warn!(diagnostic = %data, "producer reported an error");
            }
        }
    }

    /// `max_attempts` bounds retries, not failures: the client gives up on
    /// the failure after the last permitted reconnect.
    fn handle_failure(&mut self, error: StreamError) {
        let was_connected = self.state == ConnectionState::Connected;
        self.close_transport();
        self.connecting = false;
        self.watchdog = None;

        let policy = self.options.policy;
        if policy.should_retry(self.attempts) {
            self.attempts += 1;
            let delay = policy.next_delay(self.attempts);
            tracing::warn!(
                attempts = self.attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "scheduling reconnect"
            );
            self.state = ConnectionState::Reconnecting;
            self.arm_connect_timer(TimerKind::Reconnect, delay);
            self.report_error(error);
        } else {
            tracing::error!(attempts = self.attempts, "max reconnect attempts exceeded");
            self.connect_timer = None;
            self.state = ConnectionState::Failed;
            self.report_error(StreamError::MaxAttemptsExceeded {
                attempts: self.attempts,
            });
        }
        self.publish();

        if was_connected {
            let listener = &self.collaborators.listener;
            guarded("on_disconnect", || listener.on_disconnect());
        }
    }

    fn report_error(&mut self, error: StreamError) {
        let listener = &self.collaborators.listener;
        guarded("on_error", || listener.on_error(&error));
        self.last_error = Some(error);
    }

    fn close_transport(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
    }

    fn arm_connect_timer(&mut self, kind: TimerKind, delay: Duration) {
        self.connect_timer = Some(PendingTimer {
            kind,
            delay,
            deadline: deadline_after(delay),
        });
    }

    fn arm_watchdog(&mut self) {
        self.watchdog = self.options.liveness_timeout.map(deadline_after);
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::{ChangeOperation, Network, Visibility};
    use crate::transport::MockTransport;

    #[derive(Debug, Default)]
    struct Recorder {
        invalidated: Mutex<Vec<(String, ChangeOperation)>>,
        connects: Mutex<u32>,
        disconnects: Mutex<u32>,
        errors: Mutex<Vec<StreamError>>,
        messages: Mutex<Vec<String>>,
    }

    impl SubscriptionListener for Recorder {
        fn on_message(&self, message: &Message) {
            if let Ok(mut m) = self.messages.lock() {
                m.push(message.kind().to_string());
            }
        }
        fn on_error(&self, error: &StreamError) {
            if let Ok(mut e) = self.errors.lock() {
                e.push(error.clone());
            }
        }
        fn on_connect(&self) {
            if let Ok(mut c) = self.connects.lock() {
                *c += 1;
            }
        }
        fn on_disconnect(&self) {
            if let Ok(mut d) = self.disconnects.lock() {
                *d += 1;
            }
        }
    }

    impl CacheInvalidator for Recorder {
        fn invalidate(&self, collection: &str, operation: ChangeOperation, _: &serde_json::Value) {
            if let Ok(mut i) = self.invalidated.lock() {
                i.push((collection.to_string(), operation));
            }
        }
    }

    impl Recorder {
        fn invalidated(&self) -> Vec<(String, ChangeOperation)> {
            self.invalidated.lock().map(|i| i.clone()).unwrap_or_default()
        }
        fn connects(&self) -> u32 {
            self.connects.lock().map(|c| *c).unwrap_or_default()
        }
        fn disconnects(&self) -> u32 {
            self.disconnects.lock().map(|d| *d).unwrap_or_default()
        }
        fn errors(&self) -> Vec<StreamError> {
            self.errors.lock().map(|e| e.clone()).unwrap_or_default()
        }
        fn messages(&self) -> Vec<String> {
            self.messages.lock().map(|m| m.clone()).unwrap_or_default()
        }
    }

    struct Harness {
        manager: ConnectionManager,
        transport: MockTransport,
        recorder: Arc<Recorder>,
        events: mpsc::UnboundedReceiver<TransportEnvelope>,
        snapshots: watch::Receiver<ConnectionSnapshot>,
    }

    impl Harness {
        fn new(options: ClientOptions) -> Self {
            Self::with_config(options, ["orders", "users"])
        }

        fn with_config<const N: usize>(options: ClientOptions, collections: [&str; N]) -> Self {
            let Ok(endpoint) = Url::parse("http://localhost:3000/api/stream") else {
                panic!("endpoint should parse");
            };
            let Ok(config) = SubscriptionConfig::new(collections) else {
                panic!("config should build");
            };
            let transport = MockTransport::new();
            let recorder = Arc::new(Recorder::default());
            let (tx, events) = mpsc::unbounded_channel();
            let (snapshot_tx, snapshots) = watch::channel(ConnectionSnapshot::default());
            let collaborators = Collaborators {
                transport: Arc::new(transport.clone()),
                listener: Arc::clone(&recorder) as Arc<dyn SubscriptionListener>,
                invalidator: Arc::clone(&recorder) as Arc<dyn CacheInvalidator>,
            };
            let manager =
                ConnectionManager::new(endpoint, config, options, collaborators, tx, snapshot_tx);
            Self {
                manager,
                transport,
                recorder,
                events,
                snapshots,
            }
        }

        fn pump(&mut self) {
            while let Ok(envelope) = self.events.try_recv() {
                self.manager.handle_transport_event(envelope);
            }
        }

        fn server_says(&mut self, raw: &str) {
            assert!(self.transport.send_message(raw));
            self.pump();
        }

        fn transport_fails(&mut self) {
            assert!(self.transport.send_error(ReadyState::Closed));
            self.pump();
        }

        fn connected(&mut self) {
            self.manager.connect();
            assert!(self.transport.send_open());
            self.pump();
            self.server_says(r#"{"type":"connection"}"#);
            assert_eq!(self.manager.state(), ConnectionState::Connected);
        }
    }

    const CHANGE_ORDERS: &str = r#"{"type":"change","collection":"orders","operation":"update"}"#;

    #[test]
    fn open_alone_does_not_connect() {
        let mut h = Harness::new(ClientOptions::default());
        h.manager.connect();
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
        assert!(h.transport.send_open());
        h.pump();
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
        assert!(h.manager.is_connecting());
        assert_eq!(h.manager.transport_ready_state(), Some(ReadyState::Open));
    }

    #[test]
    fn double_connect_opens_one_transport() {
        let mut h = Harness::new(ClientOptions::default());
        h.manager.connect();
        h.manager.connect();
        assert_eq!(h.transport.open_count(), 1);

        h.server_says(r#"{"type":"connection"}"#);
        h.manager.connect();
        assert_eq!(h.transport.open_count(), 1);
    }

    #[test]
    fn url_encodes_subscription() {
        let mut h = Harness::new(ClientOptions::default());
        h.manager.connect();
        let Some(url) = h.transport.last_url() else {
            panic!("a stream should be open");
        };
        assert!(url.as_str().starts_with("http://localhost:3000/api/stream?"));
        assert!(
            url.query_pairs()
                .any(|(k, v)| k == "collections" && v == "orders,users")
        );
    }

    #[test]
    fn connection_message_resets_and_notifies() {
        let mut h = Harness::new(ClientOptions::default());
        h.manager.connect();
        h.transport_fails();
        assert_eq!(h.manager.attempts(), 1);

        h.manager.fire_timer(TimerKind::Reconnect);
        h.server_says(r#"{"type":"connection"}"#);

        assert_eq!(h.manager.state(), ConnectionState::Connected);
        assert_eq!(h.manager.attempts(), 0);
        assert!(h.manager.last_error().is_none());
        assert!(!h.manager.is_connecting());
        assert_eq!(h.recorder.connects(), 1);
        assert_eq!(h.snapshots.borrow().state, ConnectionState::Connected);
    }

    #[test]
    fn change_invalidates_only_its_collection() {
        let mut h = Harness::new(ClientOptions::default());
        h.connected();
        h.server_says(CHANGE_ORDERS);
        assert_eq!(
            h.recorder.invalidated(),
            vec![("orders".to_string(), ChangeOperation::Update)]
        );
        assert_eq!(h.recorder.messages(), vec!["connection", "change"]);
    }

    #[test]
    fn change_before_connection_is_ignored() {
        let mut h = Harness::new(ClientOptions::default());
        h.manager.connect();
        h.server_says(CHANGE_ORDERS);
        assert!(h.recorder.invalidated().is_empty());
        assert_eq!(h.recorder.messages(), vec!["change"]);
    }

    #[test]
    fn change_for_unsubscribed_collection_is_ignored() {
        let mut h = Harness::with_config(ClientOptions::default(), ["users"]);
        h.connected();
        h.server_says(CHANGE_ORDERS);
        assert!(h.recorder.invalidated().is_empty());
    }

    #[test]
    fn malformed_message_keeps_connection() {
        let mut h = Harness::new(ClientOptions::default());
        h.connected();
        h.server_says("{oops");
        assert_eq!(h.manager.state(), ConnectionState::Connected);
        assert!(h.manager.has_transport());
        assert!(matches!(h.manager.last_error(), Some(StreamError::Parse(_))));

        h.server_says(CHANGE_ORDERS);
        assert_eq!(h.recorder.invalidated().len(), 1);
    }

    #[test]
    fn server_error_message_is_not_fatal() {
        let mut h = Harness::new(ClientOptions::default());
        h.connected();
        h.server_says(r#"{"type":"error","data":"cursor lost"}"#);
        assert_eq!(h.manager.state(), ConnectionState::Connected);
        assert!(h.manager.has_transport());
    }

    #[test]
    fn orders_scenario() {
        let mut h = Harness::with_config(ClientOptions::default(), ["orders"]);
        h.connected();
        assert_eq!(h.manager.attempts(), 0);

        h.server_says(CHANGE_ORDERS);
        assert_eq!(h.recorder.invalidated().len(), 1);

        h.transport_fails();
        assert_eq!(h.manager.state(), ConnectionState::Reconnecting);
        assert_eq!(h.manager.attempts(), 1);
        let Some(timer) = h.manager.pending_timer() else {
            panic!("reconnect timer should be armed");
        };
        assert_eq!(timer.kind, TimerKind::Reconnect);
        assert_eq!(timer.delay, Duration::from_millis(2000));
        assert!(!h.manager.has_transport());
        assert_eq!(h.recorder.disconnects(), 1);
        assert_eq!(h.snapshots.borrow().retry_delay, Some(Duration::from_millis(2000)));
    }

    #[test]
    fn retries_exhaust_into_failed() {
        let mut h = Harness::new(ClientOptions::default());
        h.manager.connect();
        let max = ClientOptions::default().policy.max_attempts();

        for attempt in 1..=max {
            h.transport_fails();
            assert_eq!(h.manager.state(), ConnectionState::Reconnecting);
            assert_eq!(h.manager.attempts(), attempt);
            let Some(timer) = h.manager.pending_timer() else {
                panic!("timer expected after failure {attempt}");
            };
            assert_eq!(timer.delay, Duration::from_millis(1000 * 2u64.pow(attempt)));
            h.manager.fire_timer(TimerKind::Reconnect);
            assert!(h.manager.has_transport());
        }

        h.transport_fails();
        assert_eq!(h.manager.state(), ConnectionState::Failed);
        assert!(h.manager.pending_timer().is_none());
        assert!(!h.manager.has_pending_timer());
        assert!(matches!(
            h.manager.last_error(),
            Some(StreamError::MaxAttemptsExceeded { attempts: 5 })
        ));
        assert_eq!(h.transport.open_count(), usize::try_from(max + 1).unwrap_or(0));

        h.manager.connect();
        assert_eq!(h.transport.open_count(), usize::try_from(max + 1).unwrap_or(0));
    }

    #[test]
    fn force_reconnect_recovers_from_failed() {
        let options = ClientOptions {
            policy: crate::client::ReconnectPolicy::new(0, Duration::from_millis(10)),
            ..ClientOptions::default()
        };
        let mut h = Harness::new(options);
        h.manager.connect();
        h.transport_fails();
        assert_eq!(h.manager.state(), ConnectionState::Failed);

        h.manager.force_reconnect();
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert_eq!(h.manager.attempts(), 0);
        assert!(h.manager.last_error().is_none());
        let Some(timer) = h.manager.pending_timer() else {
            panic!("forced connect should be scheduled");
        };
        assert_eq!(timer.kind, TimerKind::ForcedConnect);
        assert_eq!(timer.delay, Duration::from_millis(100));

        h.manager.fire_timer(TimerKind::ForcedConnect);
        assert_eq!(h.transport.open_count(), 2);
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn force_reconnect_replaces_pending_retry() {
        let mut h = Harness::new(ClientOptions::default());
        h.connected();
        h.transport_fails();
        h.transport_fails();
        assert_eq!(h.manager.pending_timer().map(|t| t.kind), Some(TimerKind::Reconnect));

        h.manager.force_reconnect();
        assert_eq!(h.manager.attempts(), 0);
        assert_eq!(
            h.manager.pending_timer().map(|t| t.kind),
            Some(TimerKind::ForcedConnect)
        );

        h.manager.fire_timer(TimerKind::Reconnect);
        assert_eq!(h.transport.open_count(), 1);

        h.manager.fire_timer(TimerKind::ForcedConnect);
        h.manager.fire_timer(TimerKind::ForcedConnect);
        assert_eq!(h.transport.open_count(), 2);
        assert_eq!(h.transport.live_count(), 1);
    }

    #[test]
    fn stale_events_are_ignored() {
        let mut h = Harness::new(ClientOptions::default());
        h.manager.connect();
        let Some(first) = h.transport.sink(0) else {
            panic!("first sink expected");
        };
        h.manager.force_reconnect();
        h.manager.fire_timer(TimerKind::ForcedConnect);

        assert!(first.message(r#"{"type":"connection"}"#));
        assert!(first.error(ReadyState::Closed));
        h.pump();
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
        assert_eq!(h.manager.attempts(), 0);
        assert!(h.manager.has_transport());
    }

    #[test]
    fn disconnect_is_idempotent_and_clears_everything() {
        let mut h = Harness::new(ClientOptions::default());
        h.connected();
        h.transport_fails();
        h.manager.disconnect();
        h.manager.disconnect();
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert!(!h.manager.has_pending_timer());
        assert!(!h.manager.has_transport());
        assert!(!h.manager.is_connecting());
        assert_eq!(h.transport.live_count(), 0);
        assert_eq!(h.recorder.disconnects(), 1);
    }

    #[test]
    fn disabling_tears_down_and_reenabling_connects_once() {
        let mut h = Harness::new(ClientOptions::default());
        h.connected();
        h.manager.set_enabled(false);
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert!(!h.manager.has_pending_timer());
        assert_eq!(h.transport.live_count(), 0);

        h.manager.connect();
        h.manager.force_reconnect();
        assert_eq!(h.transport.open_count(), 1);
        assert!(!h.manager.has_pending_timer());

        h.manager.set_enabled(true);
        h.manager.set_enabled(true);
        assert_eq!(h.transport.open_count(), 2);
        assert_eq!(h.transport.live_count(), 1);
    }

    #[test]
    fn liveness_timeout_counts_as_failure() {
        let options = ClientOptions {
            liveness_timeout: Some(Duration::from_secs(30)),
            ..ClientOptions::default()
        };
        let mut h = Harness::new(options);
        h.connected();
        assert!(matches!(
            h.manager.next_deadline(),
            Some((TimerKind::Liveness, _))
        ));

        h.manager.fire_timer(TimerKind::Liveness);
        assert_eq!(h.manager.state(), ConnectionState::Reconnecting);
        assert_eq!(h.manager.attempts(), 1);
        assert!(matches!(
            h.manager.last_error(),
            Some(StreamError::Liveness { timeout_ms: 30_000 })
        ));
    }

    #[test]
    fn silent_stream_fails_the_attempt() {
        let options = ClientOptions {
            liveness_timeout: Some(Duration::from_secs(30)),
            ..ClientOptions::default()
        };
        let mut h = Harness::new(options);
        h.manager.connect();
        assert!(h.transport.send_open());
        h.pump();
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
        assert!(matches!(
            h.manager.next_deadline(),
            Some((TimerKind::Liveness, _))
        ));

        h.manager.fire_timer(TimerKind::Liveness);
        assert_eq!(h.manager.state(), ConnectionState::Reconnecting);
        assert_eq!(h.manager.attempts(), 1);
        assert_eq!(h.transport.live_count(), 0);
        assert!(matches!(
            h.manager.next_deadline(),
            Some((TimerKind::Reconnect, _))
        ));

        h.manager.fire_timer(TimerKind::Reconnect);
        assert_eq!(h.transport.open_count(), 2);
    }

    #[test]
    fn watchdog_is_off_by_default() {
        let mut h = Harness::new(ClientOptions::default());
        h.connected();
        assert!(h.manager.next_deadline().is_none());
    }

    #[test]
    fn visibility_reconnects_only_when_down() {
        let mut h = Harness::new(ClientOptions::default());
        h.connected();
        h.manager
            .handle_environment(EnvironmentSignal::Visibility(Visibility::Visible));
        assert!(h.manager.pending_timer().is_none());

        h.transport_fails();
        h.transport_fails();
        h.manager
            .handle_environment(EnvironmentSignal::Visibility(Visibility::Visible));
        assert_eq!(h.manager.attempts(), 0);
        assert_eq!(
            h.manager.pending_timer().map(|t| t.kind),
            Some(TimerKind::ForcedConnect)
        );
    }

    #[test]
    fn offline_reports_error_without_reconnecting() {
        let mut h = Harness::new(ClientOptions::default());
        h.connected();
        h.manager
            .handle_environment(EnvironmentSignal::Network(Network::Offline));
        assert_eq!(h.manager.last_error(), Some(&StreamError::NetworkOffline));
        assert_eq!(h.manager.state(), ConnectionState::Connected);
        assert!(h.manager.pending_timer().is_none());
        assert_eq!(h.recorder.errors(), vec![StreamError::NetworkOffline]);
    }
}
