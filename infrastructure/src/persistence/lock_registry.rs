use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// One async mutex per backing file, shared by every store opened on that path.
///
/// Create one registry at startup and hand clones of it to each store. The map
/// itself is only locked (per shard, briefly) while a path's mutex is looked up
/// or registered; file operations on different paths never contend.
#[derive(Debug, Clone, Default)]
pub struct LockRegistry {
    // Normalized absolute path -> file lock
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Returns the lock for `path`, registering it on first use.
    /// `path` is expected to be normalized already.
    pub fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(path) {
            return lock.value().clone();
        }
        self.locks
            .entry(path.to_path_buf())
            .or_insert_with(|| {
                debug!(path = %path.display(), "Registering file lock");
                Arc::new(Mutex::new(()))
            })
            .value()
            .clone()
    }

    /// Number of distinct paths seen so far.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
