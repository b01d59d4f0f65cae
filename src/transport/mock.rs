//! In-memory transport for tests.
//!
//! [`MockTransport`] records every stream the client opens and lets the
//! test play the producer's role by injecting events into the most recent
//! one (or any earlier one, to exercise stale-event handling).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::Url;

use super::{EventSink, ReadyCell, ReadyState, Transport, TransportHandle};

#[derive(Debug)]
struct MockStream {
    url: Url,
    sink: EventSink,
    ready: ReadyCell,
}

/// Transport double that never touches the network.
///
/// Clones share the same recorded streams.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    streams: Arc<Mutex<Vec<MockStream>>>,
}

impl MockTransport {
    /// Creates a transport with no recorded streams.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn streams(&self) -> MutexGuard<'_, Vec<MockStream>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of streams opened so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.streams().len()
    }

    /// Number of opened streams that have not been closed.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.streams()
            .iter()
            .filter(|s| s.ready.get() != ReadyState::Closed)
            .count()
    }

    /// URL of the most recently opened stream.
    #[must_use]
    pub fn last_url(&self) -> Option<Url> {
        self.streams().last().map(|s| s.url.clone())
    }

    /// Sink of the `index`-th opened stream.
    #[must_use]
    pub fn sink(&self, index: usize) -> Option<EventSink> {
        self.streams().get(index).map(|s| s.sink.clone())
    }

    fn with_last<R>(&self, f: impl FnOnce(&MockStream) -> R) -> Option<R> {
        self.streams().last().map(f)
    }

    /// Marks the latest stream open and reports it.
    pub fn send_open(&self) -> bool {
        self.with_last(|s| {
            s.ready.set(ReadyState::Open);
            s.sink.opened()
        })
        .unwrap_or(false)
    }

    /// Delivers a raw frame on the latest stream.
    pub fn send_message(&self, raw: impl Into<String>) -> bool {
        let raw = raw.into();
        self.with_last(|s| s.sink.message(raw)).unwrap_or(false)
    }

    /// Fails the latest stream while it is in `ready_state`.
    pub fn send_error(&self, ready_state: ReadyState) -> bool {
        self.with_last(|s| {
            s.ready.set(ReadyState::Closed);
            s.sink.error(ready_state)
        })
        .unwrap_or(false)
    }
}

impl Transport for MockTransport {
    fn open(&self, url: &Url, sink: EventSink) -> Box<dyn TransportHandle> {
        let ready = ReadyCell::new();
        self.streams().push(MockStream {
            url: url.clone(),
            sink,
            ready: ready.clone(),
        });
        Box::new(MockHandle { ready })
    }
}

/// Handle returned by [`MockTransport::open`].
#[derive(Debug)]
pub struct MockHandle {
    ready: ReadyCell,
}

impl TransportHandle for MockHandle {
    fn ready_state(&self) -> ReadyState {
        self.ready.get()
    }

    fn close(&mut self) {
        self.ready.set(ReadyState::Closed);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn records_opens_and_closes() {
        let transport = MockTransport::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let Ok(url) = Url::parse("http://localhost/stream") else {
            panic!("url should parse");
        };

        let mut handle = transport.open(&url, EventSink::new(1, tx));
        assert_eq!(transport.open_count(), 1);
        assert_eq!(transport.live_count(), 1);
        assert_eq!(handle.ready_state(), ReadyState::Connecting);

        assert!(transport.send_open());
        assert_eq!(handle.ready_state(), ReadyState::Open);

        handle.close();
        assert_eq!(transport.live_count(), 0);
        assert_eq!(transport.last_url(), Some(url));
    }

    #[test]
    fn send_without_stream_returns_false() {
        let transport = MockTransport::new();
        assert!(!transport.send_message("{}"));
        assert!(!transport.send_error(ReadyState::Closed));
    }
}
