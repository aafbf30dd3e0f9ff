//! Best-effort persistence for the progress cache.
//!
//! The host persists after every accepted mutation and loads at startup.
//! A missing or unreadable snapshot file is a cold start, never an error
//! that blocks the UI: the engine simply begins in the empty state.

use std::path::PathBuf;

use crate::error::StoreError;
use crate::progress::ProgressCache;
use crate::storage::data_dir;

const CACHE_FILE: &str = "progress_cache.json";

/// JSON snapshot store for [`ProgressCache`].
pub struct CacheStore {
    cache_file: PathBuf,
}

impl CacheStore {
    /// Store under the default data directory.
    pub fn new() -> Self {
        let dir = data_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            cache_file: dir.join(CACHE_FILE),
        }
    }

    /// Store at a specific path (for testing).
    pub fn new_with_path(path: PathBuf) -> Self {
        Self { cache_file: path }
    }

    /// Write the cache snapshot to disk.
    pub fn persist(&self, cache: &ProgressCache) -> Result<(), StoreError> {
        let data = serde_json::to_string_pretty(cache)
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
        std::fs::write(&self.cache_file, data)?;
        Ok(())
    }

    /// Load the persisted cache, if a readable one exists.
    ///
    /// Absence and corruption both yield `None`; corruption is logged so
    /// repeated cold starts are diagnosable.
    pub fn load(&self) -> Option<ProgressCache> {
        if !self.cache_file.exists() {
            return None;
        }
        let content = std::fs::read_to_string(&self.cache_file).ok()?;
        match serde_json::from_str(&content) {
            Ok(cache) => Some(cache),
            Err(err) => {
                tracing::warn!(error = %err, "discarding unreadable cache snapshot");
                None
            }
        }
    }

    /// Remove the persisted snapshot (logout).
    pub fn remove(&self) -> Result<(), StoreError> {
        if self.cache_file.exists() {
            std::fs::remove_file(&self.cache_file)?;
        }
        Ok(())
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}
