use bytes::Bytes;
use serde_json::Value;

/// Terminal marker ending a `data:`-framed stream.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// One decoded payload.
    Data(Value),
    /// The stream ended via the terminal sentinel.
    Done,
    /// A `data:` line whose payload failed to parse; non-fatal.
    Skipped(String),
}

/// Incremental decoder for `data: <json>` event streams.
///
/// Chunks may split lines at arbitrary byte boundaries; unterminated text is
/// carried in the buffer until the closing newline arrives. Once the
/// sentinel has been seen the decoder is terminal: remaining buffered bytes
/// are discarded and further pushes produce nothing.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    done: bool,
}

enum LineOutcome {
    Emit(Value),
    Skip(String),
    Done,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn push_bytes(&mut self, chunk: &Bytes) -> Vec<StreamEvent> {
        match std::str::from_utf8(chunk) {
            Ok(text) => self.push_str(text),
            Err(_) => Vec::new(),
        }
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer.drain(..=pos);
            if self.decode_line(&line, &mut events) {
                break;
            }
        }

        events
    }

    /// Flush a trailing unterminated line at transport end.
    ///
    /// Transport close without the sentinel is a clean end, not an error.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if !self.done && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.decode_line(line.trim(), &mut events);
        }
        self.done = true;
        events
    }

    fn decode_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) -> bool {
        match line_outcome(line) {
            Some(LineOutcome::Emit(value)) => events.push(StreamEvent::Data(value)),
            Some(LineOutcome::Skip(payload)) => events.push(StreamEvent::Skipped(payload)),
            Some(LineOutcome::Done) => {
                self.done = true;
                self.buffer.clear();
                events.push(StreamEvent::Done);
                return true;
            }
            None => {}
        }
        false
    }
}

fn line_outcome(line: &str) -> Option<LineOutcome> {
    // Empty lines are event separators; lines without the data prefix are
    // ignored as well.
    let payload = line.strip_prefix("data: ")?.trim();
    if payload == DONE_SENTINEL {
        return Some(LineOutcome::Done);
    }
    match serde_json::from_str(payload) {
        Ok(value) => Some(LineOutcome::Emit(value)),
        Err(_) => Some(LineOutcome::Skip(payload.to_string())),
    }
}
