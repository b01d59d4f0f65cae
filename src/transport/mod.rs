//! Transport abstraction: one persistent, one-way event stream.
//!
//! A [`Transport`] opens a stream to a URL and reports what happens on it
//! through an [`EventSink`]. Every sink is stamped with the generation of
//! the connection attempt that created it, so events from a handle that
//! has since been replaced are recognised as stale and dropped.
//!
//! Two implementations ship with the crate:
//! - [`HttpTransport`]: server-sent events over a streaming `reqwest` GET.
//! - [`MockTransport`]: in-memory, driven by the caller; for tests.

pub mod http;
pub mod mock;
pub mod sse;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use reqwest::Url;
use tokio::sync::mpsc;

pub use http::{DEFAULT_CONNECT_TIMEOUT, HttpTransport};
pub use mock::MockTransport;

/// Transport-level connection state, used to classify failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// The stream is being established.
    Connecting,
    /// The stream is open and delivering events.
    Open,
    /// The stream is closed.
    Closed,
}

impl ReadyState {
    /// Human-readable diagnostic for a failure observed in this state.
    #[must_use]
    pub const fn diagnostic(self) -> &'static str {
        match self {
            Self::Closed => "connection closed",
            Self::Connecting => "failed to establish connection",
            Self::Open => "stream interrupted",
        }
    }

    const fn to_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Open => 1,
            Self::Closed => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }
}

/// Shared, lock-free cell holding a [`ReadyState`].
#[derive(Debug, Clone)]
pub struct ReadyCell(Arc<AtomicU8>);

impl ReadyCell {
    /// Creates a cell in [`ReadyState::Connecting`].
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ReadyState::Connecting.to_u8())))
    }

    /// Reads the current state.
    #[must_use]
    pub fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Stores a new state.
    pub fn set(&self, state: ReadyState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }
}

impl Default for ReadyCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that happened on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The stream is open. Informational only: the subscription is not
    /// usable until the producer sends a `connection` message.
    Opened,
    /// One raw frame.
    Message(String),
    /// The stream failed; `ready_state` is the state it was in.
    Error {
        /// Transport state at the time of failure.
        ready_state: ReadyState,
    },
}

/// A [`TransportEvent`] tagged with the connection attempt it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEnvelope {
    /// Connection attempt number.
    pub generation: u64,
    /// What happened.
    pub event: TransportEvent,
}

/// Write side handed to a transport when it is opened.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TransportEnvelope>,
}

impl EventSink {
    pub(crate) const fn new(generation: u64, tx: mpsc::UnboundedSender<TransportEnvelope>) -> Self {
        Self { generation, tx }
    }

    /// Connection attempt this sink belongs to.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Reports that the stream is open.
    ///
    /// Returns `false` once the owning subscription is gone.
    pub fn opened(&self) -> bool {
        self.send(TransportEvent::Opened)
    }

    /// Delivers one raw frame.
    pub fn message(&self, raw: impl Into<String>) -> bool {
        self.send(TransportEvent::Message(raw.into()))
    }

    /// Reports a failure.
    pub fn error(&self, ready_state: ReadyState) -> bool {
        self.send(TransportEvent::Error { ready_state })
    }

    /// Returns `true` if nobody is listening any more.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TransportEnvelope {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Factory for persistent stream connections.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Starts opening a stream to `url`. Never blocks; progress and
    /// failures are reported through `sink`.
    fn open(&self, url: &Url, sink: EventSink) -> Box<dyn TransportHandle>;
}

/// A live stream created by [`Transport::open`].
pub trait TransportHandle: Send + fmt::Debug {
    /// Current transport state.
    fn ready_state(&self) -> ReadyState;

    /// Closes the stream. Must be idempotent; no event is reported for a
    /// close requested by the client.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_cell_round_trips_states() {
        let cell = ReadyCell::new();
        assert_eq!(cell.get(), ReadyState::Connecting);
        for state in [ReadyState::Open, ReadyState::Closed, ReadyState::Connecting] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }

    #[test]
    fn sink_tags_events_with_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(7, tx);
        assert!(sink.message("{}"));
        assert_eq!(
            rx.try_recv().ok(),
            Some(TransportEnvelope {
                generation: 7,
                event: TransportEvent::Message("{}".to_string()),
            })
        );
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.error(ReadyState::Closed));
    }

    #[test]
    fn diagnostics_differ_per_state() {
        assert_ne!(
            ReadyState::Closed.diagnostic(),
            ReadyState::Connecting.diagnostic()
        );
    }
}
