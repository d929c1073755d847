//! Local IPC transport for talking to a geth node.
//!
//! Provides a unified async stream over the platform's local transport:
//! - Unix domain sockets (Linux/macOS), at `<datadir>/geth.ipc`
//! - Named pipes (Windows), at `\\.\pipe\geth.ipc`
//!
//! This is the lowest layer of gethctl. Everything else builds on top of
//! the [`IpcStream`] type provided here.

pub mod endpoint;
pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod listener;

pub use endpoint::{Endpoint, IPC_FILE_NAME};
pub use error::{Result, TransportError};
pub use traits::IpcStream;

#[cfg(unix)]
pub use listener::IpcListener;
