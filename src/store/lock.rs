//! Single-writer lock file next to the ledger.
//!
//! The lock is a file created with `create_new`, so acquisition is atomic on
//! every platform we run on. The guard removes it on drop. A lock left behind
//! by a crashed process is broken once it is older than `STALE_AFTER`.
//!
//! Breaking renames the lock aside first and re-checks the moved file, so a
//! waiter can never delete a lock another waiter has just taken.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::LedgerError;

pub const STALE_AFTER: Duration = Duration::from_secs(10 * 60);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct LedgerLock {
    path: PathBuf,
}

impl LedgerLock {
    /// Lock file path for a ledger file (`historical.csv` -> `historical.csv.lock`).
    pub fn path_for(ledger: &Path) -> PathBuf {
        let mut name = ledger.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Wait up to `timeout` for the lock at `path`.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LedgerError> {
        let io_err = |source: std::io::Error| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let started = Instant::now();
        loop {
            match OpenOptions::new().create_new(true).write(true).open(path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    debug!(path = %path.display(), "ledger lock acquired");
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(path) && break_stale(path) {
                        continue;
                    }
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(LedgerError::LockTimeout {
                            path: path.to_path_buf(),
                            waited_ms: waited.as_millis(),
                        });
                    }
                    thread::sleep(POLL_INTERVAL.min(timeout - waited));
                }
                Err(e) => return Err(io_err(e)),
            }
        }
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Remove a lock already judged stale; `true` means acquisition should be
/// retried at once. A file that turns out to be a fresh lock stays held.
fn break_stale(path: &Path) -> bool {
    let aside = aside_path(path);
    if let Err(e) = fs::rename(path, &aside) {
        return e.kind() == ErrorKind::NotFound;
    }
    if is_stale(&aside) {
        warn!(path = %path.display(), "breaking stale ledger lock");
        let _ = fs::remove_file(&aside);
        return true;
    }

    // Lost a race with a waiter that re-acquired; hand its lock back.
    if let Err(e) = fs::hard_link(&aside, path) {
        warn!(path = %path.display(), error = %e, "could not restore ledger lock");
    }
    let _ = fs::remove_file(&aside);
    false
}

fn aside_path(path: &Path) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let mut name = path.as_os_str().to_owned();
    name.push(format!(
        ".stale.{}.{}",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    PathBuf::from(name)
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > STALE_AFTER)
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::time::SystemTime;

    use super::*;

    #[test]
    fn second_writer_times_out_until_first_releases() {
        let dir = tempfile::tempdir().unwrap();
        let path = LedgerLock::path_for(&dir.path().join("historical.csv"));
        assert!(path.ends_with("historical.csv.lock"));

        let held = LedgerLock::acquire(&path, Duration::ZERO).unwrap();
        let err = LedgerLock::acquire(&path, Duration::from_millis(150)).unwrap_err();
        assert!(matches!(err, LedgerError::LockTimeout { .. }));

        drop(held);
        assert!(!path.exists());
        assert!(LedgerLock::acquire(&path, Duration::ZERO).is_ok());
    }

    #[test]
    fn stale_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("historical.csv.lock");
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(3600)).unwrap();
        drop(file);

        let lock = LedgerLock::acquire(&path, Duration::ZERO).unwrap();
        assert!(path.exists());
        drop(lock);
    }

    #[test]
    fn fresh_lock_survives_a_late_break_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("historical.csv.lock");
        let held = LedgerLock::acquire(&path, Duration::ZERO).unwrap();
        let owner = fs::read_to_string(&path).unwrap();

        // A waiter that judged the lock stale just before it was re-taken.
        assert!(!break_stale(&path));
        assert_eq!(fs::read_to_string(&path).unwrap(), owner);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        let err = LedgerLock::acquire(&path, Duration::ZERO).unwrap_err();
        assert!(matches!(err, LedgerError::LockTimeout { .. }));
        drop(held);
        assert!(!path.exists());
    }
}
