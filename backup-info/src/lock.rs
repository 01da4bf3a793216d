//! Per-directory mutual exclusion for metadata mutations.
//!
//! Two writers on the same backup directory would race on `backup.info.tmp`
//! and could lose each other's changes, so every read-modify-rename sequence
//! runs under the lock for its directory. Readers never lock.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Registry of directory locks shared by everything that mutates records.
#[derive(Clone, Default)]
pub struct DirectoryLocks {
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DirectoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `directory`.
    ///
    /// The entry is dropped again once no other caller holds or waits on it,
    /// so the registry only tracks directories with mutations in flight.
    pub fn with_lock<T>(&self, directory: &Path, f: impl FnOnce() -> T) -> T {
        let key: PathBuf = directory.components().collect();
        // Clone the mutex out so the map shard is not held while waiting.
        let lock = self.locks.entry(key.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f()
        };
        drop(lock);
        self.locks.remove_if(&key, |_, entry| Arc::strong_count(entry) == 1);
        result
    }

    /// Number of directories currently locked or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
