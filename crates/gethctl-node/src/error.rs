use std::path::PathBuf;
use std::time::Duration;

use gethctl_transport::TransportError;

/// Errors raised by the lifecycle controller.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// A connector is already live in this slot.
    #[error("a connector already exists; use the live instance")]
    SingletonViolation,

    /// Options cannot change while a node process is active.
    #[error("options cannot change while the node is running")]
    AlreadyStarted,

    /// An option value is malformed.
    #[error("invalid option `{field}`: {reason}")]
    InvalidOptions { field: &'static str, reason: String },

    /// The working directory needed to derive default paths is unavailable.
    #[error("couldn't determine working directory: {0}")]
    WorkingDir(#[source] std::io::Error),

    #[error(transparent)]
    Binary(#[from] BinaryError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// The endpoint did not accept connections within the readiness bound.
    #[error("node did not become ready within {timeout:?}")]
    NotReady { timeout: Duration },

    /// The process exited before it became ready.
    #[error("node exited during startup (exit code {code:?})")]
    ExitedDuringStartup { code: Option<i32> },

    /// The readiness probe hit an error other than "not listening yet".
    #[error("readiness probe failed: {0}")]
    Probe(#[source] TransportError),

    /// The caller cancelled the readiness wait.
    #[error("node startup was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Errors raised while spawning the node process.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("spawn failed: {0}")]
    Other(String),
}

/// Errors raised while making sure the node binary is usable.
#[derive(Debug, thiserror::Error)]
pub enum BinaryError {
    #[error("node binary not found at {}", .0.display())]
    Missing(PathBuf),

    #[error("node binary at {} is not executable", .0.display())]
    NotExecutable(PathBuf),

    #[error("node binary at {} is not ready", .0.display())]
    NotReady(PathBuf),

    #[error("couldn't inspect node binary at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
