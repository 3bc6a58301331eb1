//! Cross-process advisory file lock plus an atomic-rename writer and an
//! mtime-keyed read cache (spec §4.A). Every mutation the dashboard store
//! (§4.B), the agent registry (§4.C) and the IPC bus (§4.D) make to disk
//! goes through this module so that several short-lived server processes
//! sharing one workspace never observe a half-written file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{AgentmuxError, Result};

/// An acquired advisory lock. Dropping it releases the underlying flock.
pub struct LockGuard {
    _file: File,
}

/// Returns true when called from inside a running tokio reactor.
///
/// The lock primitive uses this to decide whether it is safe to retry with
/// a blocking sleep: inside an event loop that would tie up a worker thread
/// (or, on a single-threaded runtime, the only thread) and risks a
/// deadlock with whatever task is expected to release the lock. Outside an
/// event loop (a plain CLI invocation) a short blocking retry loop is fine.
pub fn in_async_context() -> bool {
    tokio::runtime::Handle::try_current().is_ok()
}

/// Acquire an exclusive advisory lock on `path` (created alongside it as
/// `path.lock` so the protected file itself is never opened for writing
/// just to be locked).
///
/// * Inside an async context: a single non-blocking attempt. On contention
///   this returns `AgentmuxError::LockTimeout` immediately rather than
///   spinning on the reactor thread — callers that want to retry should do
///   so with an async `sleep` between attempts.
/// * Outside an async context: retries with linear back-off until
///   `timeout` elapses.
pub fn acquire(path: &Path, timeout: Duration) -> Result<LockGuard> {
    let lock_path = lock_file_path(path);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(&lock_path)?;

    if in_async_context() {
        match file.try_lock_exclusive() {
            Ok(()) => Ok(LockGuard { _file: file }),
            Err(_) => Err(AgentmuxError::LockWouldBlockInAsyncContext),
        }
    } else {
        let deadline = Instant::now() + timeout;
        let mut backoff = Duration::from_millis(5);
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(LockGuard { _file: file }),
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(backoff.min(Duration::from_millis(100)));
                    backoff *= 2;
                }
                Err(_) => return Err(AgentmuxError::LockTimeout(timeout)),
            }
        }
    }
}

fn lock_file_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".lock");
    path.with_file_name(name)
}

/// Write `bytes` to `path` atomically: write a sibling temp file, flush +
/// sync, then rename over the target. The temp file is unlinked if any
/// step before the rename fails.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let tmp_name = format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        uuid::Uuid::new_v4().simple()
    );
    let tmp_path = dir.join(tmp_name);

    let write_result = (|| -> Result<()> {
        let mut f = File::create(&tmp_path)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// A single-slot cache keyed by the on-disk mtime (in nanoseconds).
///
/// `get_or_read` re-parses only when `path`'s mtime has changed since the
/// last successful read, so a reader with a stale copy automatically picks
/// up any change made by another process (spec §5 ordering guarantees).
pub struct MtimeCache<T: Clone> {
    slot: Mutex<Option<(i128, T)>>,
}

impl<T: Clone> Default for MtimeCache<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T: Clone> MtimeCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate the cache, e.g. right after a successful write.
    pub fn invalidate(&self) {
        *self.slot.lock().expect("mtime cache mutex poisoned") = None;
    }

    pub fn get_or_read<F>(&self, path: &Path, parse: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> Result<T>,
    {
        let mtime_ns = file_mtime_ns(path)?;
        let mut guard = self.slot.lock().expect("mtime cache mutex poisoned");
        if let Some((cached_mtime, value)) = guard.as_ref() {
            if *cached_mtime == mtime_ns {
                return Ok(value.clone());
            }
        }
        let bytes = std::fs::read(path)?;
        let value = parse(&bytes)?;
        *guard = Some((mtime_ns, value.clone()));
        Ok(value)
    }
}

fn file_mtime_ns(path: &Path) -> Result<i128> {
    let meta = std::fs::metadata(path)?;
    let modified = meta.modified()?;
    let since_epoch = modified
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    Ok(since_epoch.as_nanos() as i128)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_then_read_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dashboard.md");
        atomic_write(&path, b"hello").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        // no leftover temp files
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn lock_acquire_outside_async_context_succeeds_and_releases() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dashboard.md");
        std::fs::write(&path, b"x").unwrap();
        {
            let _g = acquire(&path, Duration::from_millis(200)).unwrap();
        }
        // second acquire succeeds because the first guard was dropped
        let _g2 = acquire(&path, Duration::from_millis(200)).unwrap();
    }

    #[test]
    fn mtime_cache_returns_cached_value_until_file_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("d.md");
        std::fs::write(&path, b"v1").unwrap();
        let cache: MtimeCache<String> = MtimeCache::new();
        let v1 = cache
            .get_or_read(&path, |b| Ok(String::from_utf8_lossy(b).to_string()))
            .unwrap();
        assert_eq!(v1, "v1");

        // Write the same content again; mtime may or may not tick on some
        // filesystems within test resolution, so force a distinguishable
        // mtime by sleeping briefly before the second write.
        std::thread::sleep(Duration::from_millis(10));
        std::fs::write(&path, b"v2").unwrap();
        let v2 = cache
            .get_or_read(&path, |b| Ok(String::from_utf8_lossy(b).to_string()))
            .unwrap();
        assert_eq!(v2, "v2");
    }
}
