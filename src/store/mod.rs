// src/store/mod.rs

//! Durable path -> digest cache backing the rebuild decision.
//!
//! - [`file`] keeps the mapping in a single file under the cache directory.
//! - [`memory`] keeps it in memory only (tests, `hash_storage = "memory"`).
//! - [`locks`] serialises get/compare/set sequences on the same path.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use crate::errors::{BuildError, Result};
use crate::hash::Digest;
use crate::types::HashStorageMode;

pub mod file;
pub mod locks;
pub mod memory;

pub use file::{FileHashStore, HASH_FILE_NAME};
pub use locks::KeyedLocks;
pub use memory::MemoryHashStore;

/// Keyed mapping from absolute file path to its last recorded digest.
///
/// `set` is an upsert: it replaces any previous digest for the path.
pub trait HashStore: Send + Sync + Debug {
    /// Last recorded digest for `path`, or `None` if never recorded.
    fn get(&self, path: &str) -> Result<Option<Digest>>;
    fn set(&self, path: &str, digest: &Digest) -> Result<()>;

    /// Record every entry in order. The first failure stops the batch;
    /// entries before it may already be recorded, the rest are not.
    fn set_many(&self, batch: &[(String, Digest)]) -> std::result::Result<(), BatchError> {
        for (index, (path, digest)) in batch.iter().enumerate() {
            self.set(path, digest)
                .map_err(|error| BatchError { index, error })?;
        }
        Ok(())
    }

    /// Number of recorded paths.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A failed [`HashStore::set_many`]: which entry failed, and why.
#[derive(Debug)]
pub struct BatchError {
    pub index: usize,
    pub error: BuildError,
}

/// Open the store selected by `mode` under `cache_dir`.
pub fn open_store(mode: HashStorageMode, cache_dir: &Path) -> Result<Arc<dyn HashStore>> {
    Ok(match mode {
        HashStorageMode::File => Arc::new(FileHashStore::open(cache_dir)?),
        HashStorageMode::Memory => Arc::new(MemoryHashStore::new()),
    })
}
