//! Process-wide registry of per-log-file locks.
//!
//! Grounded on `Compiler::log_access_mtx_map`/`mtx_map_mtx` (`include/versioningCompiler/Compiler.hpp`,
//! `lib/Compiler.cpp`): a map-wide lock protects insertion/removal of per-path entries only;
//! the per-path lock itself is held for the whole duration of a single log write, and is
//! released on every exit path (including a panicking writer) because it is returned as a
//! `MutexGuard` rather than explicitly unlocked.

use std::{
    collections::HashMap,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock},
};

struct LogEntry {
    refcount: usize,
    lock: Arc<Mutex<()>>,
}

type Table = Mutex<HashMap<PathBuf, LogEntry>>;

fn table() -> &'static Table {
    static TABLE: OnceLock<Table> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A handle on a log file's slot in the registry. Dropping it releases the reference;
/// when the last handle for a path is dropped the path's entry is removed from the table.
#[derive(Debug)]
pub struct LogHandle {
    path: PathBuf,
}

impl LogHandle {
    /// Registers interest in `path`, incrementing its refcount (or creating the entry
    /// with refcount 1 if this is the first interest). An empty path means "no log":
    /// the returned handle's `append`/`with_lock` calls become no-ops.
    pub fn acquire(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !path.as_os_str().is_empty() {
            let mut guard = table().lock().unwrap_or_else(|e| e.into_inner());
            guard
                .entry(path.clone())
                .and_modify(|e| e.refcount += 1)
                .or_insert_with(|| LogEntry {
                    refcount: 1,
                    lock: Arc::new(Mutex::new(())),
                });
        }
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn per_path_lock(&self) -> Option<Arc<Mutex<()>>> {
        if self.path.as_os_str().is_empty() {
            return None;
        }
        let guard = table().lock().unwrap_or_else(|e| e.into_inner());
        guard.get(&self.path).map(|e| Arc::clone(&e.lock))
    }

    /// Runs `work` with the per-path lock held; released on every exit path, including
    /// if `work` panics, because the lock is scoped to this call via RAII.
    pub fn with_lock<R>(&self, work: impl FnOnce() -> R) -> R {
        match self.per_path_lock() {
            Some(lock) => {
                let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
                work()
            }
            None => work(),
        }
    }

    /// Appends `line` (plus a trailing newline) to the log file, serialised against
    /// concurrent writers of the same path. If the file cannot be opened, the content is
    /// silently dropped (logging failure must never affect the caller's stage result) but
    /// a `tracing::warn!` is still emitted so the ambient log sink observes it.
    pub fn append(&self, line: &str) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        self.with_lock(|| match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{line}") {
                    tracing::warn!(path = %self.path.display(), error = %e, "failed to write to log file");
                }
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to open log file");
            }
        });
    }
}

impl Clone for LogHandle {
    fn clone(&self) -> Self {
        Self::acquire(self.path.clone())
    }
}

impl Drop for LogHandle {
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        let mut guard = table().lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = guard.get_mut(&self.path) {
            entry.refcount -= 1;
            if entry.refcount == 0 {
                guard.remove(&self.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    #[test]
    fn empty_path_is_a_no_op() {
        let handle = LogHandle::acquire("");
        handle.append("should not panic or write anywhere");
        handle.with_lock(|| {});
    }

    #[test]
    fn refcount_drops_entry_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.log");
        let a = LogHandle::acquire(&path);
        let b = LogHandle::acquire(&path);
        assert_eq!(table().lock().unwrap().get(&path).unwrap().refcount, 2);
        drop(a);
        assert_eq!(table().lock().unwrap().get(&path).unwrap().refcount, 1);
        drop(b);
        assert!(table().lock().unwrap().get(&path).is_none());
    }

    #[test]
    fn concurrent_writers_serialise_without_interleaving_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concurrent.log");
        let barrier = Arc::new(Barrier::new(4));
        let mut handles = Vec::new();
        for i in 0..4 {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                let log = LogHandle::acquire(&path);
                barrier.wait();
                for _ in 0..50 {
                    log.append(&format!("writer-{i}"));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 200);
        for line in contents.lines() {
            assert!(line.starts_with("writer-"));
        }
    }
}
