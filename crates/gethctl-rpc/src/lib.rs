//! JSON-RPC calls over a local geth IPC endpoint.
//!
//! [`Correlator`] issues request ids and routes responses back to their
//! callers; [`Connection`] owns the link and its reader task.

pub mod connection;
pub mod correlator;
pub mod error;

pub use connection::{Connection, ConnectionConfig, Diagnostic, DEFAULT_DIAGNOSTIC_CAPACITY};
pub use correlator::{Completion, Correlator, RequestIds, Resolution};
pub use error::{CallError, ConnectionError, Result};
