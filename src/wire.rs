//! Wire framer: byte stream ⇄ discrete DAP messages.
//!
//! Messages are `Content-Length: N\r\n\r\n` headed JSON; incomplete trailing
//! bytes stay buffered across calls, and malformed headers or bodies are
//! dropped with a log line rather than resetting the stream.

use serde::Serialize;
use serde_json::Value;

const SEPARATOR: &[u8] = b"\r\n\r\n";

/// Incrementally reassembles `Content-Length`-framed JSON messages from an
/// arbitrarily chunked byte stream.
#[derive(Debug, Default)]
pub struct Framer {
    buffer: Vec<u8>,
}

impl Framer {
    /// Create an empty framer.
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append newly received bytes to the internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Extract every complete message currently in the buffer, in order.
    /// Bytes belonging to an incomplete trailing message remain buffered for
    /// the next call.
    pub fn poll_messages(&mut self) -> Vec<Value> {
        let mut out = Vec::new();
        loop {
            let Some(sep_at) = find(&self.buffer, SEPARATOR) else {
                break;
            };

            let header_text = match std::str::from_utf8(&self.buffer[..sep_at]) {
                Ok(text) => text,
                Err(_) => {
                    tracing::warn!("dropping frame with non-UTF-8 header");
                    self.buffer.drain(..sep_at + SEPARATOR.len());
                    continue;
                }
            };

            let Some(content_length) = parse_content_length(header_text) else {
                tracing::warn!("dropping frame with missing or zero Content-Length header");
                self.buffer.drain(..sep_at + SEPARATOR.len());
                continue;
            };

            let body_start = sep_at + SEPARATOR.len();
            let body_end = body_start + content_length;
            if self.buffer.len() < body_end {
                // Wait for the rest of the body to arrive.
                break;
            }

            let body = self.buffer[body_start..body_end].to_vec();
            self.buffer.drain(..body_end);

            match serde_json::from_slice::<Value>(&body) {
                Ok(value) => out.push(value),
                Err(error) => {
                    tracing::warn!(%error, "dropping frame with malformed JSON body");
                }
            }
        }
        out
    }
}

/// Encode a message as `Content-Length`-framed JSON for the wire.
///
/// # Panics
///
/// Panics if `value` cannot be serialized to JSON, which indicates a bug in
/// the caller (all engine-produced messages are always serializable).
#[must_use]
pub fn encode(value: &impl Serialize) -> Vec<u8> {
    let body = serde_json::to_vec(value).expect("DAP messages are always serializable");
    let mut out = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    out.extend(body);
    out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_content_length(header_text: &str) -> Option<usize> {
    for line in header_text.split("\r\n") {
        if let Some(rest) = line
            .to_ascii_lowercase()
            .strip_prefix("content-length:")
            .map(|_| line.splitn(2, ':').nth(1).unwrap_or("").trim().to_string())
        {
            if let Ok(n) = rest.parse::<usize>() {
                return if n == 0 { None } else { Some(n) };
            }
            return None;
        }
    }
    None
}
