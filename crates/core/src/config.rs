//! Storage runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the
//! store. The intent is to avoid reading process-wide environment variables
//! during request handling, which can lead to inconsistent behaviour in
//! multi-threaded runtimes and test harnesses.

use std::path::{Path, PathBuf};

/// Storage configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    storage_root: PathBuf,
}

impl StoreConfig {
    /// Create a new `StoreConfig` rooted at the given directory.
    ///
    /// The directory does not need to exist yet; [`crate::FileStore::new`]
    /// creates it.
    pub fn new(storage_root: PathBuf) -> Self {
        Self { storage_root }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }
}
