// ABOUTME: Incremental Server-Sent Events framing - turns arbitrary byte chunks
// ABOUTME: from an HTTP body into complete events, with a bounded line buffer.

use tracing::{error, trace};

/// Default ceiling for a single unterminated line.
pub const DEFAULT_SSE_BUFFER_CAP: usize = 10 * 1024 * 1024;

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, when the server sent one.
    pub event: Option<String>,
    /// All `data:` lines of the event joined with `\n`.
    pub data: String,
}

/// Line-oriented SSE parser fed with raw byte chunks.
///
/// Chunks may split lines (and UTF-8 sequences) anywhere; bytes are held
/// until their line is complete. `id:` and `retry:` fields are ignored.
#[derive(Debug)]
pub struct SseParser {
    pending: Vec<u8>,
    event: Option<String>,
    data: String,
    buffer_cap: usize,
    discarding: bool,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SseParser {
    pub fn new() -> Self {
        Self::with_buffer_cap(DEFAULT_SSE_BUFFER_CAP)
    }

    pub fn with_buffer_cap(buffer_cap: usize) -> Self {
        Self {
            pending: Vec::new(),
            event: None,
            data: String::new(),
            buffer_cap,
            discarding: false,
        }
    }

    /// Consume a chunk and return every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (line, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                continue;
            }

            if self.pending.is_empty() {
                self.process_line(line, &mut events);
            } else {
                let mut full = std::mem::take(&mut self.pending);
                full.extend_from_slice(line);
                self.process_line(&full, &mut events);
            }
        }

        if !rest.is_empty() && !self.discarding {
            if self.pending.len() + rest.len() > self.buffer_cap {
                error!(
                    buffered = self.pending.len(),
                    incoming = rest.len(),
                    limit = self.buffer_cap,
                    "SSE line exceeds buffer limit, discarding it"
                );
                self.pending.clear();
                self.discarding = true;
            } else {
                self.pending.extend_from_slice(rest);
            }
        }

        events
    }

    /// End of body: treat any unterminated line as complete and dispatch the
    /// pending event.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let mut events = Vec::new();
        if !self.pending.is_empty() && !self.discarding {
            let line = std::mem::take(&mut self.pending);
            self.process_line(&line, &mut events);
        }
        self.pending.clear();
        self.discarding = false;
        self.dispatch(&mut events);
        events.pop()
    }

    /// Bytes held for an incomplete line.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    fn process_line(&mut self, line: &[u8], events: &mut Vec<SseEvent>) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        if line.is_empty() {
            self.dispatch(events);
            return;
        }
        if line[0] == b':' {
            trace!("SSE comment");
            return;
        }

        let Some(colon) = line.iter().position(|&b| b == b':') else {
            return;
        };
        let field = &line[..colon];
        let mut value = &line[colon + 1..];
        if let Some(stripped) = value.strip_prefix(b" ") {
            value = stripped;
        }
        let value = String::from_utf8_lossy(value);

        match field {
            b"event" => self.event = Some(value.into_owned()),
            b"data" => {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(&value);
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, events: &mut Vec<SseEvent>) {
        let event = self.event.take().filter(|e| !e.is_empty());
        if self.data.is_empty() {
            return;
        }
        events.push(SseEvent {
            event,
            data: std::mem::take(&mut self.data),
        });
    }
}
