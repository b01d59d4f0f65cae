//! Incremental server-sent-events decoder.
//!
//! Bytes arrive in arbitrary chunks. [`SseDecoder`] buffers partial lines
//! and yields the `data` payload of each complete event. `event`, `id` and
//! `retry` fields and comment lines are ignored; multiple `data` lines are
//! joined with `\n`. A leading byte order mark is skipped. Both `\n` and
//! `\r\n` line endings are accepted.

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Stateful SSE decoder for one stream.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: String,
    has_data: bool,
    discarding: bool,
    at_start: bool,
    bom_seen: usize,
    max_event_bytes: usize,
}

impl SseDecoder {
    /// Creates a decoder that drops events larger than `max_event_bytes`.
    #[must_use]
    pub fn new(max_event_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            data: String::new(),
            has_data: false,
            discarding: false,
            at_start: true,
            bom_seen: 0,
            max_event_bytes,
        }
    }

    /// Feeds a chunk and returns the payloads of all events it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let chunk = if self.at_start {
            self.strip_bom(chunk)
        } else {
            chunk
        };
        let scan_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        let mut consumed = 0;
        let mut search = scan_from;
        while let Some(offset) = self
            .buffer
            .get(search..)
            .and_then(|rest| rest.iter().position(|b| *b == b'\n'))
        {
            let end = search + offset;
            let line = self.buffer.get(consumed..end).unwrap_or_default();
            let line = line.strip_suffix(b"\r").unwrap_or(line).to_vec();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
            consumed = end + 1;
            search = consumed;
        }
        self.buffer.drain(..consumed);

        if self.buffer.len() > self.max_event_bytes {
            tracing::warn!(
                buffered = self.buffer.len(),
                limit = self.max_event_bytes,
                "dropping oversized stream event"
            );
            self.buffer.clear();
            self.discard_event();
        }

        events
    }

    /// Drops a leading UTF-8 byte order mark, which may itself be split
    /// across chunks.
    fn strip_bom<'a>(&mut self, chunk: &'a [u8]) -> &'a [u8] {
        let seen = self.bom_seen;
        let mut taken = 0;
        while let (Some(expected), Some(byte)) = (BOM.get(seen + taken), chunk.get(taken)) {
            if expected != byte {
                // Not a BOM; replay any prefix bytes held back earlier.
                self.at_start = false;
                self.bom_seen = 0;
                if let Some(held) = BOM.get(..seen) {
                    self.buffer.extend_from_slice(held);
                }
                return chunk;
            }
            taken += 1;
        }
        self.bom_seen = seen + taken;
        if self.bom_seen == BOM.len() {
            self.at_start = false;
        }
        chunk.get(taken..).unwrap_or_default()
    }

    fn process_line(&mut self, line: &[u8]) -> Option<String> {
        if line.is_empty() {
            let dropped = std::mem::take(&mut self.discarding);
            let has_data = std::mem::take(&mut self.has_data);
            let data = std::mem::take(&mut self.data);
            return (has_data && !dropped).then_some(data);
        }
        if self.discarding || line.first() == Some(&b':') {
            return None;
        }

        let text = String::from_utf8_lossy(line);
        let (field, value) = match text.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (text.as_ref(), ""),
        };
        if field == "data" {
            if self.has_data {
                self.data.push('\n');
            }
            self.data.push_str(value);
            self.has_data = true;
            if self.data.len() > self.max_event_bytes {
                tracing::warn!(limit = self.max_event_bytes, "dropping oversized stream event");
                self.discard_event();
            }
        }
        None
    }

    fn discard_event(&mut self) {
        self.discarding = true;
        self.has_data = false;
        self.data.clear();
    }
}
