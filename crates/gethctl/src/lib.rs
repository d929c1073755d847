//! Run a local geth node and talk JSON-RPC to it over IPC.
//!
//! # Crate Structure
//!
//! - [`transport`]: Local IPC endpoints (Unix sockets, named pipes)
//! - [`frame`]: Delimiter-free JSON framing and the JSON-RPC wire types
//! - [`rpc`]: Request correlation and the lazily connected link
//! - [`node`]: Node options, process lifecycle and the connector singleton
//!
//! The common entry points are re-exported at the top level.

/// Re-export transport types.
pub mod transport {
    pub use gethctl_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use gethctl_frame::*;
}

/// Re-export rpc types.
pub mod rpc {
    pub use gethctl_rpc::*;
}

/// Re-export node lifecycle types.
pub mod node {
    pub use gethctl_node::*;
}

pub use gethctl_node::{
    Connector, ConnectorConfig, LifecycleError, NodeHandle, NodeOptions, Readiness,
};
pub use gethctl_rpc::CallError;
