//! Server-sent events over HTTP.
//!
//! [`HttpTransport`] issues one long-lived `GET` with
//! `Accept: text/event-stream` and decodes the body incrementally. Each
//! open spawns a reader task; closing the handle aborts it.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Url;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::task::JoinHandle;

use super::sse::SseDecoder;
use super::{EventSink, ReadyCell, ReadyState, Transport, TransportHandle};
use crate::domain::DEFAULT_MAX_MESSAGE_BYTES;

/// TCP connect timeout of the default client.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Streaming HTTP transport built on [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    max_event_bytes: usize,
}

impl HttpTransport {
    /// Creates a transport whose client gives up on TCP connects after
    /// [`DEFAULT_CONNECT_TIMEOUT`].
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "client builder failed, using defaults");
                reqwest::Client::new()
            });
        Self::with_client(client)
    }

    /// Creates a transport around an existing client (proxies, TLS
    /// settings, default headers).
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            max_event_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    /// Sets the largest event the decoder will buffer.
    #[must_use]
    pub fn max_event_bytes(mut self, limit: usize) -> Self {
        self.max_event_bytes = limit;
        self
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    /// Spawns the reader task on the current Tokio runtime.
    fn open(&self, url: &Url, sink: EventSink) -> Box<dyn TransportHandle> {
        let ready = ReadyCell::new();
        let task = tokio::spawn(read_stream(
            self.client.clone(),
            url.clone(),
            sink,
            ready.clone(),
            self.max_event_bytes,
        ));
        Box::new(HttpHandle { task, ready })
    }
}

/// Handle to one streaming request.
#[derive(Debug)]
pub struct HttpHandle {
    task: JoinHandle<()>,
    ready: ReadyCell,
}

impl TransportHandle for HttpHandle {
    fn ready_state(&self) -> ReadyState {
        self.ready.get()
    }

    fn close(&mut self) {
        self.task.abort();
        self.ready.set(ReadyState::Closed);
    }
}

impl Drop for HttpHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_stream(
    client: reqwest::Client,
    url: Url,
    sink: EventSink,
    ready: ReadyCell,
    max_event_bytes: usize,
) {
    let response = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await
        .and_then(reqwest::Response::error_for_status);

    let response = match response {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(error = %err, "stream request failed");
            ready.set(ReadyState::Closed);
            sink.error(ReadyState::Connecting);
            return;
        }
    };

    ready.set(ReadyState::Open);
    if !sink.opened() {
        return;
    }

    let mut decoder = SseDecoder::new(max_event_bytes);
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                for event in decoder.feed(&bytes) {
                    if !sink.message(event) {
                        return;
                    }
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "stream read failed");
                ready.set(ReadyState::Closed);
                sink.error(ReadyState::Open);
                return;
            }
        }
    }

    ready.set(ReadyState::Closed);
    sink.error(ReadyState::Closed);
}
