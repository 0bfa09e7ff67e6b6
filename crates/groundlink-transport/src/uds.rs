use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TransportError};

/// Default permission mode for created socket paths.
pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// Check the path length and remove a stale socket left by a previous run.
///
/// Never removes a path that is not a socket.
pub(crate) fn prepare_socket_path(path: &Path) -> Result<()> {
    let path_bytes = path.as_os_str().len();
    if path_bytes >= MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len: path_bytes,
            max: MAX_PATH_LEN,
        });
    }

    if path.exists() {
        let metadata = std::fs::symlink_metadata(path).map_err(|e| bind_error(path, e))?;
        if !metadata.file_type().is_socket() {
            return Err(bind_error(
                path,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                ),
            ));
        }
        debug!(?path, "removing stale socket");
        std::fs::remove_file(path).map_err(|e| bind_error(path, e))?;
    }

    Ok(())
}

/// Removes the socket file on drop, but only if it is still the one we created.
#[derive(Debug)]
pub(crate) struct SocketPathGuard {
    path: PathBuf,
    created_inode: (u64, u64),
}

impl SocketPathGuard {
    /// Restrict permissions on a freshly bound socket and remember its identity.
    pub(crate) fn adopt(path: &Path, mode: u32) -> Result<Self> {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| bind_error(path, e))?;
        let metadata = std::fs::symlink_metadata(path).map_err(|e| bind_error(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            created_inode: (metadata.dev(), metadata.ino()),
        })
    }
}

impl Drop for SocketPathGuard {
    fn drop(&mut self) {
        let Ok(metadata) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        let (dev, ino) = self.created_inode;
        if metadata.file_type().is_socket() && metadata.dev() == dev && metadata.ino() == ino {
            debug!(path = ?self.path, "cleaning up socket file");
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
        }
    }
}

fn bind_error(path: &Path, source: std::io::Error) -> TransportError {
    TransportError::Bind {
        addr: format!("unix:{}", path.display()),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gl-uds-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn path_too_long_is_rejected() {
        let long_path = PathBuf::from("/tmp/".to_string() + &"a".repeat(200) + ".sock");
        let result = prepare_socket_path(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn existing_regular_file_is_never_removed() {
        let dir = scratch_dir("regular");
        let path = dir.join("not-a-socket.sock");
        std::fs::write(&path, b"regular-file").unwrap();

        let result = prepare_socket_path(&path);
        assert!(matches!(result, Err(TransportError::Bind { .. })));
        assert!(path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn guard_removes_socket_and_applies_mode() {
        let dir = scratch_dir("guard");
        let path = dir.join("link.sock");

        prepare_socket_path(&path).unwrap();
        let listener = UnixListener::bind(&path).unwrap();
        let guard = SocketPathGuard::adopt(&path, DEFAULT_SOCKET_MODE).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        drop(listener);
        drop(guard);
        assert!(!path.exists(), "socket file should be cleaned up on drop");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn guard_skips_replaced_path() {
        let dir = scratch_dir("replaced");
        let path = dir.join("link.sock");

        prepare_socket_path(&path).unwrap();
        let _listener = UnixListener::bind(&path).unwrap();
        let guard = SocketPathGuard::adopt(&path, DEFAULT_SOCKET_MODE).unwrap();

        std::fs::remove_file(&path).unwrap();
        std::fs::write(&path, b"replacement-file").unwrap();

        drop(guard);
        assert!(path.exists(), "drop must not remove a path whose identity changed");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
