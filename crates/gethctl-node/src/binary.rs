use std::path::Path;

use tracing::debug;

use crate::error::BinaryError;

/// Makes sure the node binary is present before the first start.
///
/// Returns `Ok(false)` when the binary exists but is not usable yet.
pub trait BinaryProvider: Send + Sync {
    fn ensure_binary_present(&self, executable: &Path) -> Result<bool, BinaryError>;
}

/// Accepts an existing executable file and never fetches anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalBinary;

impl BinaryProvider for LocalBinary {
    fn ensure_binary_present(&self, executable: &Path) -> Result<bool, BinaryError> {
        let metadata = match std::fs::metadata(executable) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(BinaryError::Missing(executable.to_path_buf()));
            }
            Err(source) => {
                return Err(BinaryError::Io {
                    path: executable.to_path_buf(),
                    source,
                })
            }
        };

        if !metadata.is_file() {
            return Err(BinaryError::NotExecutable(executable.to_path_buf()));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o111 == 0 {
                return Err(BinaryError::NotExecutable(executable.to_path_buf()));
            }
        }

        debug!(path = %executable.display(), "node binary present");
        Ok(true)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    use super::*;

    fn unique_dir(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/gethctl-bin-{}-{}-{}",
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
    fn accepts_executable_file() {
        let dir = unique_dir("ok");
        let path = dir.join("geth");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(LocalBinary.ensure_binary_present(&path).unwrap());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_missing_file() {
        let dir = unique_dir("missing");
        let err = LocalBinary
            .ensure_binary_present(&dir.join("geth"))
            .unwrap_err();
        assert!(matches!(err, BinaryError::Missing(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_file_without_exec_bit() {
        let dir = unique_dir("noexec");
        let path = dir.join("geth");
        std::fs::write(&path, b"not a program").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let err = LocalBinary.ensure_binary_present(&path).unwrap_err();
        assert!(matches!(err, BinaryError::NotExecutable(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_directory() {
        let dir = unique_dir("dir");
        let err = LocalBinary.ensure_binary_present(&dir).unwrap_err();
        assert!(matches!(err, BinaryError::NotExecutable(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
