use std::fmt;
use std::io;

use gethctl_node::{BinaryError, LifecycleError, SpawnError};
use gethctl_rpc::CallError;
use gethctl_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match &err {
        TransportError::Connect { source, .. } if source.kind() == io::ErrorKind::PermissionDenied => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        _ => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
    }
}

pub fn call_error(context: &str, err: CallError) -> CliError {
    match err {
        CallError::Connect(err) => transport_error(context, err),
        CallError::NotWritable { .. } | CallError::ConnectionClosed => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        CallError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        CallError::Rpc(_) | CallError::NotStarted => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

pub fn lifecycle_error(context: &str, err: LifecycleError) -> CliError {
    match err {
        LifecycleError::InvalidOptions { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        LifecycleError::WorkingDir(source) => io_error(context, source),
        LifecycleError::Binary(BinaryError::Io { source, .. }) => io_error(context, source),
        LifecycleError::Spawn(SpawnError::Spawn { source, .. }) => io_error(context, source),
        LifecycleError::Probe(err) => transport_error(context, err),
        LifecycleError::NotReady { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        LifecycleError::SingletonViolation | LifecycleError::AlreadyStarted => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}
