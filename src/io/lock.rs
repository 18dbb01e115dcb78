use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// How long a task-file call waits for another `wbs` process.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const FIRST_BACKOFF: Duration = Duration::from_millis(2);
const MAX_BACKOFF: Duration = Duration::from_millis(50);

/// Exclusive advisory lock on a project's `.wbs/.lock`.
///
/// Every read-modify-write of the task file runs under it, so two CLI
/// invocations against one project never interleave a batch. Released when
/// dropped. The lock file stays on disk; unlinking it would let a waiter
/// and a newcomer lock different inodes.
#[derive(Debug)]
pub struct TaskFileLock {
    _file: File,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("task file is busy: gave up on {path} after {waited_ms} ms")]
    Busy { path: PathBuf, waited_ms: u64 },
}

impl TaskFileLock {
    /// Take the lock, retrying with backoff for up to `timeout`.
    pub fn acquire(wbs_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = wbs_dir.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;

        let start = Instant::now();
        let mut backoff = FIRST_BACKOFF;
        let mut contended = false;
        while try_lock(&file).is_err() {
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(LockError::Busy {
                    path,
                    waited_ms: waited.as_millis() as u64,
                });
            }
            if !contended {
                tracing::debug!(path = %path.display(), "task file locked by another process, waiting");
                contended = true;
            }
            std::thread::sleep(backoff.min(timeout - waited));
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        if contended {
            tracing::debug!(waited_ms = start.elapsed().as_millis() as u64, "task file lock acquired");
        }
        Ok(TaskFileLock { _file: file })
    }
}

#[cfg(unix)]
fn try_lock(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

// No advisory locking off Unix; the in-process mutex in FileStore still
// serializes one process's calls.
#[cfg(not(unix))]
fn try_lock(_file: &File) -> std::io::Result<()> {
    Ok(())
}
