//! Recovers discrete JSON values from a delimiter-free byte stream.
//!
//! The node writes responses back to back with no length prefix and no
//! separator, and a single read may hold several responses or a fraction of
//! one. The [`Dechunker`] scans bytes incrementally, tracking bracket depth,
//! string state and escapes, so a value ends exactly where its outermost
//! bracket closes. Bracket characters inside strings never split a value.
//!
//! Data left over after a chunk is held as the partial buffer together with
//! a decode deadline. If the deadline passes before the value completes, one
//! [`DecodeError`] is reported and the buffer is kept, since the rest may
//! still arrive.

use std::time::{Duration, Instant};

use bytes::BytesMut;
use serde_json::Value;
use tracing::trace;

use crate::error::{DecodeError, DecodeErrorKind};

/// Time partial data may wait for its remainder before it is reported.
pub const DEFAULT_DECODE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default cap on buffered partial data: 16 MiB.
pub const DEFAULT_MAX_PENDING: usize = 16 * 1024 * 1024;

/// One item produced from the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Message(Value),
    Error(DecodeError),
}

/// Configuration for the dechunker.
#[derive(Debug, Clone)]
pub struct DechunkerConfig {
    /// How long partial data may wait for its remainder. Default: 15 s.
    pub decode_timeout: Duration,
    /// Maximum bytes held as partial data. Default: 16 MiB.
    pub max_pending: usize,
}

impl Default for DechunkerConfig {
    fn default() -> Self {
        Self {
            decode_timeout: DEFAULT_DECODE_TIMEOUT,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Mode {
    /// Between values; whitespace is skipped.
    #[default]
    Idle,
    /// Inside an object or array.
    Value,
    /// Bytes that cannot start a value, up to the next `{` or `[`.
    Junk,
}

#[derive(Debug, Clone, Copy, Default)]
struct Scanner {
    mode: Mode,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Scanner {
    /// Advance over one byte of a value. Returns true when the value closed.
    fn step(&mut self, byte: u8) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return false;
        }

        match byte {
            b'"' => self.in_string = true,
            b'{' | b'[' => self.depth += 1,
            b'}' | b']' => {
                // A stray closer cannot be balanced; end here and let the
                // parser report it.
                self.depth = self.depth.saturating_sub(1);
                return self.depth == 0;
            }
            _ => {}
        }
        false
    }
}

fn opens_value(byte: u8) -> bool {
    byte == b'{' || byte == b'['
}

/// Incremental JSON value splitter with a partial buffer and decode deadline.
pub struct Dechunker {
    buf: BytesMut,
    scan: Scanner,
    deadline: Option<Instant>,
    config: DechunkerConfig,
}

impl Default for Dechunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Dechunker {
    /// Create a dechunker with default configuration.
    pub fn new() -> Self {
        Self::with_config(DechunkerConfig::default())
    }

    /// Create a dechunker with explicit configuration.
    pub fn with_config(config: DechunkerConfig) -> Self {
        Self {
            buf: BytesMut::new(),
            scan: Scanner::default(),
            deadline: None,
            config,
        }
    }

    /// Feed one chunk, passing every completed item to `sink` in stream order.
    ///
    /// `now` (re)arms the decode deadline when the chunk leaves partial data.
    pub fn feed<F>(&mut self, chunk: &[u8], now: Instant, mut sink: F)
    where
        F: FnMut(Decoded),
    {
        let mut start = 0usize;

        for (i, &byte) in chunk.iter().enumerate() {
            match self.scan.mode {
                Mode::Idle => {
                    if byte.is_ascii_whitespace() {
                        start = i + 1;
                        continue;
                    }
                    if opens_value(byte) {
                        self.scan.mode = Mode::Value;
                        self.scan.depth = 1;
                    } else {
                        self.scan.mode = Mode::Junk;
                    }
                }
                Mode::Junk => {
                    if opens_value(byte) {
                        self.buf.extend_from_slice(&chunk[start..i]);
                        self.flush_junk(&mut sink);
                        start = i;
                        self.scan.mode = Mode::Value;
                        self.scan.depth = 1;
                    }
                }
                Mode::Value => {
                    if self.scan.step(byte) {
                        self.buf.extend_from_slice(&chunk[start..=i]);
                        start = i + 1;
                        self.complete(&mut sink);
                    }
                }
            }
        }

        if start < chunk.len() {
            self.buf.extend_from_slice(&chunk[start..]);
        }

        if self.buf.is_empty() {
            self.deadline = None;
            return;
        }

        if self.buf.len() > self.config.max_pending {
            let err = DecodeError::new(DecodeErrorKind::Overflow, &self.buf);
            self.reset();
            sink(Decoded::Error(err));
            return;
        }

        trace!(pending_bytes = self.buf.len(), "holding partial data");
        self.deadline = Some(now + self.config.decode_timeout);
    }

    /// Report partial data once its deadline has passed.
    ///
    /// Returns the error at most once per arming. The buffer is kept so the
    /// value may still complete on a later chunk.
    pub fn poll_expired(&mut self, now: Instant) -> Option<DecodeError> {
        match self.deadline {
            Some(deadline) if now >= deadline && !self.buf.is_empty() => {
                self.deadline = None;
                Some(DecodeError::new(DecodeErrorKind::TimedOut, &self.buf))
            }
            _ => None,
        }
    }

    /// When pending partial data will be reported, if any is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Bytes currently held as partial data.
    pub fn pending(&self) -> Option<&[u8]> {
        if self.buf.is_empty() {
            None
        } else {
            Some(&self.buf)
        }
    }

    /// Drop partial data and scanner state.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.scan = Scanner::default();
        self.deadline = None;
    }

    fn complete<F: FnMut(Decoded)>(&mut self, sink: &mut F) {
        let candidate = self.buf.split();
        self.scan = Scanner::default();
        self.deadline = None;

        match serde_json::from_slice::<Value>(&candidate) {
            Ok(value) => sink(Decoded::Message(value)),
            Err(err) => {
                trace!(error = %err, "delimited value failed to parse");
                sink(Decoded::Error(DecodeError::new(
                    DecodeErrorKind::Malformed,
                    &candidate,
                )));
            }
        }
    }

    fn flush_junk<F: FnMut(Decoded)>(&mut self, sink: &mut F) {
        let junk = self.buf.split();
        self.scan = Scanner::default();
        let trimmed = junk.trim_ascii_end();
        if !trimmed.is_empty() {
            sink(Decoded::Error(DecodeError::new(
                DecodeErrorKind::Malformed,
                trimmed,
            )));
        }
    }
}
