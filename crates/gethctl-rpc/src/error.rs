use std::time::Duration;

use gethctl_frame::{RequestId, RpcError};
use gethctl_transport::TransportError;

/// Errors raised while managing the link to the node.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Could not open the local endpoint.
    #[error("couldn't connect to node: {0}")]
    Connect(#[from] TransportError),

    /// No writable link exists, or writing to it failed.
    #[error("socket is not writable: {reason}")]
    NotWritable { reason: String },

    /// The connection was destroyed and opens no new links.
    #[error("connection was destroyed")]
    Destroyed,
}

pub type Result<T> = std::result::Result<T, ConnectionError>;

/// Why a single call did not produce a result.
///
/// Every variant is local to the call that receives it; other pending
/// calls are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The node process is not active.
    #[error("node is not started")]
    NotStarted,

    /// Could not open the local endpoint.
    #[error("couldn't connect to node: {0}")]
    Connect(#[source] TransportError),

    /// The request could not be written.
    #[error("socket is not writable: {reason}")]
    NotWritable { reason: String },

    /// The node answered with an error.
    #[error("node returned an error: {0}")]
    Rpc(#[from] RpcError),

    /// No response arrived within the request deadline.
    #[error("request {id} timed out after {after:?}")]
    Timeout { id: RequestId, after: Duration },

    /// The link closed, or the connector stopped, before a response arrived.
    #[error("connection closed before a response arrived")]
    ConnectionClosed,
}

impl From<ConnectionError> for CallError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Connect(source) => CallError::Connect(source),
            ConnectionError::NotWritable { reason } => CallError::NotWritable { reason },
            ConnectionError::Destroyed => CallError::ConnectionClosed,
        }
    }
}

impl CallError {
    /// True for failures of the local link rather than of the node's answer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CallError::Connect(_) | CallError::NotWritable { .. } | CallError::ConnectionClosed
        )
    }
}
