//! Process-wide header cache keyed by file path.
//!
//! Headers never change after creation except for the aggregation method, so
//! a cached copy saves re-reading and re-validating them on every operation.
//! There is one cache per process, shared by every [`crate::Store`]. It only
//! sees this process's writes: every header mutation made through any store
//! invalidates the entry for that path, but changes made by other processes
//! go unnoticed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, PoisonError};

use crate::header::Header;

static GLOBAL: LazyLock<HeaderCache> = LazyLock::new(HeaderCache::new);

/// Parsed headers keyed by path.
#[derive(Debug, Default)]
pub struct HeaderCache {
    entries: Mutex<HashMap<PathBuf, Header>>,
}

impl HeaderCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by every [`crate::Store`].
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Returns a copy of the cached header for `path`, if any.
    pub fn get(&self, path: &Path) -> Option<Header> {
        self.lock().get(path).cloned()
    }

    /// Stores the header for `path`, replacing any previous entry.
    pub fn insert(&self, path: &Path, header: Header) {
        self.lock().insert(path.to_path_buf(), header);
    }

    /// Drops the entry for `path`. Returns `true` if one was present.
    pub fn invalidate(&self, path: &Path) -> bool {
        self.lock().remove(path).is_some()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of cached headers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave a half-written map entry,
    // so a poisoned lock is still usable.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Header>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
