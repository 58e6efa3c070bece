use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock busy: {}", .0.display())]
    Busy(PathBuf),
    #[error(
        "stale lock {} left by exited process {pid}; remove it to continue",
        path.display()
    )]
    Stale { path: PathBuf, pid: u32 },
    #[error("lock I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mutual exclusion wrapped around a whole append, on top of the engine's
/// in-process mutex.
pub trait CriticalSection {
    type Guard;

    fn enter(&self) -> Result<Self::Guard, LockError>;
}

/// No exclusion beyond the engine's own mutex.
#[cfg(test)]
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcess;

#[cfg(test)]
impl CriticalSection for InProcess {
    type Guard = ();

    fn enter(&self) -> Result<(), LockError> {
        Ok(())
    }
}

/// Cross-process exclusion through an exclusively created lock file.
#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
    timeout: Duration,
}

impl LockFile {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }
}

impl CriticalSection for LockFile {
    type Guard = FileLock;

    fn enter(&self) -> Result<FileLock, LockError> {
        FileLock::acquire(&self.path, self.timeout)
    }
}

impl<L: CriticalSection> CriticalSection for Option<L> {
    type Guard = Option<L::Guard>;

    fn enter(&self) -> Result<Self::Guard, LockError> {
        self.as_ref().map(|section| section.enter()).transpose()
    }
}

/// Lock file holding the owner's pid. Removed on drop.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    _file: File,
}

impl FileLock {
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let start = Instant::now();
        loop {
            if let Some(guard) = try_acquire(path)? {
                return Ok(guard);
            }
            if let Some(pid) = stale_holder(path) {
                warn!(path = %path.display(), pid, "lock file holder has exited");
                return Err(LockError::Stale {
                    path: path.to_path_buf(),
                    pid,
                });
            }
            if start.elapsed() >= timeout {
                return Err(LockError::Busy(path.to_path_buf()));
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn try_acquire(path: &Path) -> Result<Option<FileLock>, LockError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            let written = writeln!(file, "{}", std::process::id());
            let guard = FileLock {
                path: path.to_path_buf(),
                _file: file,
            };
            written?;
            Ok(Some(guard))
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(None),
        Err(err) => Err(LockError::Io(err)),
    }
}

/// Pid recorded in an existing lock file, when that process is gone.
/// A file whose pid is not written yet is never stale.
fn stale_holder(path: &Path) -> Option<u32> {
    let raw = std::fs::read_to_string(path).ok()?;
    let pid = raw.trim().parse::<u32>().ok()?;
    (!process_alive(pid)).then_some(pid)
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

// No portable liveness check elsewhere; holders are assumed alive.
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}
