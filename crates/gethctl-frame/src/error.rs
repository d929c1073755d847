use std::fmt;

/// Errors that can occur while reading or writing framed messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// The peer closed the stream.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

/// Why a chunk of stream data could not be turned into a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// A complete value was delimited but is not valid JSON.
    Malformed,
    /// Partial data sat in the buffer past the decode deadline.
    TimedOut,
    /// Partial data grew past the buffer cap and was discarded.
    Overflow,
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecodeErrorKind::Malformed => "malformed",
            DecodeErrorKind::TimedOut => "timed out",
            DecodeErrorKind::Overflow => "overflow",
        };
        f.write_str(s)
    }
}

/// Framing diagnostic carrying the offending raw text.
///
/// Not attributable to a request: the id is unknown until a message parses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("couldn't decode data ({kind}): {text}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub text: String,
}

impl DecodeError {
    pub(crate) fn new(kind: DecodeErrorKind, raw: &[u8]) -> Self {
        Self {
            kind,
            text: String::from_utf8_lossy(raw).into_owned(),
        }
    }
}
