//! Unix socket startup: refuse to start against a live daemon, clean up a
//! stale socket file left by a crash, then bind with owner-only permissions
//! (§4.7).

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::{fs, io};

use tokio::net::{UnixListener, UnixStream};
use tokio::time::{timeout, Duration};

const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Errors raised while acquiring the listening socket.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// A responsive daemon is already listening on this path.
    #[error("a daemon is already listening on {0}")]
    AlreadyRunning(PathBuf),
    /// The socket path couldn't be bound or cleaned up.
    #[error("socket I/O error at {path}: {source}")]
    Io {
        /// The socket path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Probe `path`: connecting successfully means a live daemon owns it.
async fn is_responsive(path: &Path) -> bool {
    matches!(timeout(PROBE_TIMEOUT, UnixStream::connect(path)).await, Ok(Ok(_)))
}

/// Bind the daemon's listening socket at `path`.
///
/// If a socket file already exists there, first probe it: a successful
/// connection means another daemon instance is running and we refuse to
/// start; a failed connection means it's a stale file from a previous crash
/// and we remove it before binding.
pub async fn bind(path: &Path) -> Result<UnixListener, SocketError> {
    if path.exists() {
        if is_responsive(path).await {
            return Err(SocketError::AlreadyRunning(path.to_path_buf()));
        }
        fs::remove_file(path).map_err(|source| SocketError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let listener = UnixListener::bind(path).map_err(|source| SocketError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|source| {
        SocketError::Io {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(listener)
}

/// Remove the socket file, ignoring its absence.
pub fn remove(path: &Path) -> Result<(), SocketError> {
    if path.exists() {
        fs::remove_file(path).map_err(|source| SocketError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_a_fresh_socket_with_owner_only_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.sock");
        let listener = bind(&path).await.unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        drop(listener);
        remove(&path).unwrap();
    }

    #[tokio::test]
    async fn removes_a_stale_socket_file_and_binds_over_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.sock");
        {
            let stale = UnixListener::bind(&path).unwrap();
            drop(stale);
        }
        assert!(path.exists());
        let listener = bind(&path).await.unwrap();
        drop(listener);
    }

    #[tokio::test]
    async fn refuses_to_start_against_a_responsive_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.sock");
        let _live = UnixListener::bind(&path).unwrap();
        let err = bind(&path).await.unwrap_err();
        assert!(matches!(err, SocketError::AlreadyRunning(_)));
    }
}
