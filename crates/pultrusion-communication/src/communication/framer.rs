//! Line framing for the inbound byte stream
//!
//! The device writes newline-terminated text but the serial driver hands
//! it over in arbitrary chunks. `LineFramer` buffers bytes until a `\n`
//! shows up and hands back complete lines with the terminator (and an
//! optional preceding `\r`) stripped.
//!
//! Decoding is lossy: invalid UTF-8 becomes U+FFFD instead of an error.
//! The buffer is bounded; a line that grows past the limit is discarded
//! together with everything up to its terminator.

use pultrusion_core::ProtocolError;
use std::collections::VecDeque;

/// Default framing limit in bytes
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

/// One complete protocol message, terminator stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line(String);

impl Line {
    /// Create a line from text (used by tests and the simulator)
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The line text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the line, returning its text
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Line {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Accumulates raw bytes and extracts newline-terminated lines
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    ready: VecDeque<Line>,
    max_len: usize,
    discarding: bool,
}

impl LineFramer {
    /// Create a framer with the default 4 KiB limit
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Create a framer with a custom limit
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_len.min(1024)),
            ready: VecDeque::new(),
            max_len: max_len.max(1),
            discarding: false,
        }
    }

    /// Feed a chunk of bytes and collect every line it completes.
    ///
    /// On overflow returns `FrameTooLong`; lines completed earlier in the
    /// same chunk are kept and come back from the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Line>, ProtocolError> {
        let mut overflowed = false;

        for &byte in bytes {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                } else {
                    let line = self.take_line();
                    self.ready.push_back(line);
                }
                continue;
            }

            if self.discarding {
                continue;
            }

            if self.buffer.len() >= self.max_len {
                self.buffer.clear();
                self.discarding = true;
                overflowed = true;
                continue;
            }

            self.buffer.push(byte);
        }

        if overflowed {
            return Err(ProtocolError::FrameTooLong {
                limit: self.max_len,
            });
        }

        Ok(self.take_ready())
    }

    /// Lines completed before an overflow, not yet returned
    pub fn take_ready(&mut self) -> Vec<Line> {
        self.ready.drain(..).collect()
    }

    /// Number of bytes of the current partial line
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial line and pending output
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.ready.clear();
        self.discarding = false;
    }

    fn take_line(&mut self) -> Line {
        if self.buffer.last() == Some(&b'\r') {
            self.buffer.pop();
        }
        let text = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        Line(text)
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}
