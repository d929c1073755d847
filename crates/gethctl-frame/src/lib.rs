//! Delimiter-free JSON-RPC framing over a local byte stream.
//!
//! The node neither length-prefixes nor separates its messages. This crate
//! recovers message boundaries from JSON structure alone:
//! - [`Dechunker`] splits an arbitrary chunk sequence into JSON values
//! - [`MessageReader`] drives it from an async stream, including the
//!   decode deadline for stalled partial data
//! - [`MessageWriter`] writes requests back to back
//! - [`message`] holds the JSON-RPC request/response wire types

pub mod dechunker;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use dechunker::{
    Decoded, Dechunker, DechunkerConfig, DEFAULT_DECODE_TIMEOUT, DEFAULT_MAX_PENDING,
};
pub use error::{DecodeError, DecodeErrorKind, FrameError, Result};
pub use message::{responses_from_frame, Request, RequestId, Response, RpcError, JSONRPC_VERSION};
pub use reader::MessageReader;
pub use writer::MessageWriter;
