//! Streaming parser for newline-delimited (or concatenated) JSON frames.
//!
//! Chunks may split a frame anywhere, including inside a string. The parser
//! keeps the unfinished tail and resumes scanning where it stopped, so each
//! byte is inspected once.

use super::InboundFrame;
use crate::error::ParseError;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Default ceiling on buffered bytes.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 1024 * 1024;

const FRAGMENT_PREVIEW: usize = 120;

/// Result of one `parse` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutput<T> {
    /// Complete frames, in the order their closing brace was found.
    pub messages: Vec<T>,

    /// Recoverable errors encountered along the way.
    pub errors: Vec<ParseError>,
}

impl<T> Default for ParseOutput<T> {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Scan {
    active: bool,
    pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Scan {
    fn start(pos: usize) -> Self {
        Self {
            active: true,
            pos,
            ..Self::default()
        }
    }

    /// Advance to the end of `buf`; returns the end offset of the object when
    /// its matching close brace is found.
    fn advance(&mut self, buf: &[u8]) -> Option<usize> {
        while self.pos < buf.len() {
            let byte = buf[self.pos];
            self.pos += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Some(self.pos);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Stateful JSON object extractor.
#[derive(Debug, Clone)]
pub struct StreamParser {
    buffer: Vec<u8>,
    scan: Scan,
    max_buffer_bytes: usize,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_BYTES)
    }
}

impl StreamParser {
    /// Create a parser that drops its buffer beyond `max_buffer_bytes`.
    pub fn new(max_buffer_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scan: Scan::default(),
            max_buffer_bytes,
        }
    }

    /// Feed a text chunk and decode complete protocol frames.
    pub fn parse(&mut self, chunk: &str) -> ParseOutput<InboundFrame> {
        self.parse_bytes(chunk.as_bytes())
    }

    /// Feed a byte chunk and decode complete protocol frames.
    ///
    /// Braces, quotes, and backslashes are ASCII, so a chunk boundary inside a
    /// multi-byte UTF-8 sequence cannot confuse the scanner.
    pub fn parse_bytes(&mut self, chunk: &[u8]) -> ParseOutput<InboundFrame> {
        let raw = self.parse_values(chunk);
        let mut out = ParseOutput {
            messages: Vec::with_capacity(raw.messages.len()),
            errors: raw.errors,
        };

        for value in raw.messages {
            match serde_json::from_value::<InboundFrame>(value.clone()) {
                Ok(frame) => out.messages.push(frame),
                Err(_) => out
                    .errors
                    .push(ParseError::UnknownFrame(preview(&value.to_string()))),
            }
        }
        out
    }

    /// Feed a chunk and return every complete JSON object as a raw value.
    pub fn parse_values(&mut self, chunk: &[u8]) -> ParseOutput<Value> {
        self.buffer.extend_from_slice(chunk);
        let mut out = ParseOutput::default();
        let mut start = 0;

        loop {
            if !self.scan.active {
                // Skip keep-alive newlines and any noise between frames.
                match self.buffer[start..].iter().position(|&b| b == b'{') {
                    Some(offset) => {
                        start += offset;
                        self.scan = Scan::start(start);
                    }
                    None => {
                        start = self.buffer.len();
                        break;
                    }
                }
            }

            match self.scan.advance(&self.buffer) {
                Some(end) => {
                    let span = &self.buffer[start..end];
                    match serde_json::from_slice::<Value>(span) {
                        Ok(value) => out.messages.push(value),
                        Err(e) => out.errors.push(ParseError::Malformed {
                            message: e.to_string(),
                            fragment: preview(&String::from_utf8_lossy(span)),
                        }),
                    }
                    start = end;
                    self.scan.active = false;
                }
                None => break,
            }
        }

        self.buffer.drain(..start);
        if self.scan.active {
            self.scan.pos -= start;
        }

        if self.buffer.len() > self.max_buffer_bytes {
            let size = self.buffer.len();
            warn!(
                "Dropping parse buffer: {} bytes exceeds ceiling of {}",
                size, self.max_buffer_bytes
            );
            self.reset();
            out.errors.push(ParseError::BufferOverflow {
                size,
                max: self.max_buffer_bytes,
            });
        }

        out
    }

    /// Discard any buffered partial frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scan = Scan::default();
    }

    /// Bytes held for the next call.
    pub fn remainder(&self) -> &[u8] {
        &self.buffer
    }
}

/// Encode a frame as one newline-terminated JSON line.
pub fn encode<T: Serialize>(frame: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    Ok(line)
}

fn preview(text: &str) -> String {
    if text.len() <= FRAGMENT_PREVIEW {
        return text.to_string();
    }
    let mut cut = FRAGMENT_PREVIEW;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}
