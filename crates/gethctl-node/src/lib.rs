//! Lifecycle control for a local geth node.
//!
//! A [`Connector`] owns the node's options, its process and the JSON-RPC
//! [`Connection`](gethctl_rpc::Connection) to it. Process spawning and the
//! binary check sit behind the [`ProcessSupervisor`] and [`BinaryProvider`]
//! traits so they can be replaced.

pub mod binary;
pub mod connector;
pub mod error;
pub mod options;
pub mod slot;
pub mod supervisor;

pub use binary::{BinaryProvider, LocalBinary};
pub use connector::{
    Connector, ConnectorConfig, NodeHandle, Readiness, DEFAULT_GRACE_PERIOD,
    DEFAULT_PROBE_INTERVAL, DEFAULT_READY_TIMEOUT, DEFAULT_STOP_TIMEOUT,
};
pub use error::{BinaryError, LifecycleError, Result, SpawnError};
pub use options::{
    LaunchPlan, NodeOptions, DEFAULT_ASSETS_DIR, DEFAULT_EXTRA_OPTIONS, PRIVATE_NETWORK_ID,
};
pub use slot::ConnectorSlot;
pub use supervisor::{
    ChildOutput, ChildProcess, ProcessExit, ProcessSupervisor, TokioSupervisor, WaitFuture,
};
