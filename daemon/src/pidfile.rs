//! PID file lifecycle: written on startup, removed on clean shutdown.

use std::path::{Path, PathBuf};
use std::{fs, process};

/// Errors raised while managing the PID file.
#[derive(Debug, thiserror::Error)]
pub enum PidFileError {
    /// Another process is already running against this PID file.
    #[error("daemon already running with pid {0}")]
    AlreadyRunning(u32),
    /// The PID file couldn't be written or removed.
    #[error("pid file I/O error at {path}: {source}")]
    Io {
        /// The PID file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A held PID file, removed when dropped via [`PidFile::remove`].
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id to `path`, refusing if a live process
    /// already holds it.
    pub fn acquire(path: &Path) -> Result<Self, PidFileError> {
        if let Some(pid) = read_live_pid(path) {
            return Err(PidFileError::AlreadyRunning(pid));
        }
        fs::write(path, process::id().to_string()).map_err(|source| PidFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Remove the PID file. Idempotent: a missing file is not an error.
    pub fn remove(&self) -> Result<(), PidFileError> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|source| PidFileError::Io {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Read `path` and return the PID only if it still names a live process.
fn read_live_pid(path: &Path) -> Option<u32> {
    let text = fs::read_to_string(path).ok()?;
    let pid: u32 = text.trim().parse().ok()?;
    process_is_alive(pid).then_some(pid)
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    use std::process::Command;
    Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_the_current_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.pid");
        let pid_file = PidFile::acquire(&path).unwrap();
        let written: u32 = fs::read_to_string(&path).unwrap().trim().parse().unwrap();
        assert_eq!(written, process::id());
        pid_file.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn acquire_rejects_a_stale_but_live_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.pid");
        fs::write(&path, process::id().to_string()).unwrap();
        let err = PidFile::acquire(&path).unwrap_err();
        assert!(matches!(err, PidFileError::AlreadyRunning(_)));
    }

    #[test]
    fn acquire_overwrites_a_pid_file_from_a_dead_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.pid");
        fs::write(&path, "999999999").unwrap();
        let pid_file = PidFile::acquire(&path).unwrap();
        pid_file.remove().unwrap();
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.pid");
        let pid_file = PidFile::acquire(&path).unwrap();
        pid_file.remove().unwrap();
        pid_file.remove().unwrap();
    }
}
