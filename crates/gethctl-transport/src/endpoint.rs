use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::IpcStream;

/// File name geth uses for its IPC endpoint.
pub const IPC_FILE_NAME: &str = "geth.ipc";

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
pub(crate) const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
pub(crate) const MAX_PATH_LEN: usize = 104;

/// Address of a node's local IPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    path: PathBuf,
}

impl Endpoint {
    /// Endpoint at an explicit path (socket file or pipe name).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Endpoint the node exposes for a given data directory.
    ///
    /// On Unix the socket lives inside the data directory. Windows named
    /// pipes live in a flat namespace, so the data directory is ignored.
    pub fn for_data_dir(data_dir: impl AsRef<Path>) -> Self {
        #[cfg(windows)]
        {
            let _ = data_dir;
            Self::new(format!(r"\\.\pipe\{IPC_FILE_NAME}"))
        }

        #[cfg(not(windows))]
        {
            Self::new(data_dir.as_ref().join(IPC_FILE_NAME))
        }
    }

    /// The endpoint path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate the endpoint path for the platform.
    pub fn validate(&self) -> Result<()> {
        #[cfg(unix)]
        {
            let len = self.path.as_os_str().len();
            if len >= MAX_PATH_LEN {
                return Err(TransportError::PathTooLong {
                    path: self.path.clone(),
                    len,
                    max: MAX_PATH_LEN,
                });
            }
        }
        Ok(())
    }

    /// Connect to the endpoint.
    pub async fn connect(&self) -> Result<IpcStream> {
        self.validate()?;

        #[cfg(unix)]
        {
            let stream = tokio::net::UnixStream::connect(&self.path)
                .await
                .map_err(|e| TransportError::Connect {
                    path: self.path.clone(),
                    source: e,
                })?;
            debug!(path = ?self.path, "connected to unix domain socket");
            Ok(IpcStream::from_unix(stream))
        }

        #[cfg(windows)]
        {
            let pipe = tokio::net::windows::named_pipe::ClientOptions::new()
                .open(&self.path)
                .map_err(|e| TransportError::Connect {
                    path: self.path.clone(),
                    source: e,
                })?;
            debug!(path = ?self.path, "connected to named pipe");
            Ok(IpcStream::from_pipe(pipe))
        }

        #[cfg(not(any(unix, windows)))]
        {
            Err(TransportError::Unsupported)
        }
    }

    /// Attempt a connection and drop it.
    ///
    /// Returns `Ok(true)` once something accepts on the endpoint, `Ok(false)`
    /// while nothing listens there yet, and an error for anything else.
    pub async fn probe(&self) -> Result<bool> {
        match self.connect().await {
            Ok(_stream) => Ok(true),
            Err(err) if err.is_not_listening() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::listener::IpcListener;

    fn unique_dir(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/gethctl-ep-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    #[test]
    fn endpoint_lives_in_data_dir() {
        let ep = Endpoint::for_data_dir("/var/lib/geth");
        assert_eq!(ep.path(), Path::new("/var/lib/geth/geth.ipc"));
        assert_eq!(ep.to_string(), "/var/lib/geth/geth.ipc");
    }

    #[test]
    fn validate_rejects_long_paths() {
        let ep = Endpoint::new("/tmp/".to_string() + &"a".repeat(200) + ".ipc");
        assert!(matches!(
            ep.validate(),
            Err(TransportError::PathTooLong { .. })
        ));
    }

    #[tokio::test]
    async fn connect_to_missing_endpoint_fails() {
        let dir = unique_dir("missing");
        let ep = Endpoint::for_data_dir(&dir);

        let err = ep.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(err.is_not_listening());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn probe_reports_listening_state() {
        let dir = unique_dir("probe");
        let ep = Endpoint::for_data_dir(&dir);
        assert!(!ep.probe().await.unwrap());

        let listener = IpcListener::bind(ep.path()).unwrap();
        assert!(ep.probe().await.unwrap());

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
