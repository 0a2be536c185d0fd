//! Per-path mutual exclusion.
//!
//! Rewrites and deletes of the same file must not overlap (they would race on
//! the same temporary file), but work on different files must never wait on
//! each other. [`PathLocks`] hands out one async mutex per path, created on
//! first use and dropped from the table once the last guard for it is gone.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Table = Mutex<HashMap<PathBuf, Weak<AsyncMutex<()>>>>;

/// Keyed lock table. Cheap to clone; clones share the table.
#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    table: Arc<Table>,
}

/// Holds the lock for one path until dropped.
#[derive(Debug)]
pub struct PathGuard {
    guard: Option<OwnedMutexGuard<()>>,
    path: PathBuf,
    table: Arc<Table>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `path`.
    pub async fn lock(&self, path: &Path) -> PathGuard {
        let mutex = {
            let mut table = self.table.lock();
            match table.get(path).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let fresh = Arc::new(AsyncMutex::new(()));
                    table.insert(path.to_path_buf(), Arc::downgrade(&fresh));
                    fresh
                }
            }
        };

        let guard = mutex.lock_owned().await;
        PathGuard {
            guard: Some(guard),
            path: path.to_path_buf(),
            table: Arc::clone(&self.table),
        }
    }

    /// Number of paths currently tracked.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        // Release the mutex first so our own reference no longer counts.
        drop(self.guard.take());

        let mut table = self.table.lock();
        if table
            .get(&self.path)
            .is_some_and(|weak| weak.strong_count() == 0)
        {
            table.remove(&self.path);
        }
    }
}
