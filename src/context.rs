// src/context.rs

//! Explicit build context threaded through graph execution.
//!
//! Everything a run needs besides the graph itself lives here: the hash
//! store handle, the content hasher, the filesystem view and the rebuild
//! policy. There is no process-wide state; dropping the context releases
//! the store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::hash::ContentHasher;
use crate::store::{open_store, HashStore, KeyedLocks};
use crate::types::{DigestAlgorithm, HashStorageMode, NewFilePolicy};

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".stepwise";

/// Options used to open a [`BuildContext`].
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub cache_dir: PathBuf,
    pub digest: DigestAlgorithm,
    pub hash_storage: HashStorageMode,
    pub new_files: NewFilePolicy,
    /// Upper bound on concurrently running steps for parallel runs.
    pub workers: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            digest: DigestAlgorithm::default(),
            hash_storage: HashStorageMode::default(),
            new_files: NewFilePolicy::default(),
            workers: default_workers(),
        }
    }
}

pub(crate) fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Shared, cheaply clonable handle to everything a build run needs.
#[derive(Debug, Clone)]
pub struct BuildContext {
    store: Arc<dyn HashStore>,
    hasher: ContentHasher,
    fs: Arc<dyn FileSystem>,
    locks: Arc<KeyedLocks>,
    new_files: NewFilePolicy,
    workers: usize,
    cache_dir: Option<PathBuf>,
}

impl BuildContext {
    /// Open a context on the real filesystem, bootstrapping the cache
    /// directory for file-backed storage.
    pub fn open(options: ContextOptions) -> Result<Self> {
        let cache_dir = absolute_or_relative(&options.cache_dir);
        debug!(cache_dir = ?cache_dir, "using cache directory");

        let store = open_store(options.hash_storage, &cache_dir)?;
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

        let mut ctx = Self::with_parts(store, fs, options.digest);
        ctx.new_files = options.new_files;
        ctx.workers = options.workers.max(1);
        ctx.cache_dir = Some(cache_dir);
        Ok(ctx)
    }

    /// Assemble a context from explicit parts (tests, embedders).
    pub fn with_parts(
        store: Arc<dyn HashStore>,
        fs: Arc<dyn FileSystem>,
        digest: DigestAlgorithm,
    ) -> Self {
        Self {
            store,
            hasher: ContentHasher::new(digest, Arc::clone(&fs)),
            fs,
            locks: Arc::new(KeyedLocks::new()),
            new_files: NewFilePolicy::default(),
            workers: default_workers(),
            cache_dir: None,
        }
    }

    pub fn with_new_file_policy(mut self, policy: NewFilePolicy) -> Self {
        self.new_files = policy;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn store(&self) -> &dyn HashStore {
        self.store.as_ref()
    }

    pub fn hasher(&self) -> &ContentHasher {
        &self.hasher
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    pub fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    pub fn new_file_policy(&self) -> NewFilePolicy {
        self.new_files
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Cache directory in use, if the context was opened from options.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }
}

/// Make `path` absolute, falling back to it unchanged (with a warning).
pub fn absolute_or_relative(path: &Path) -> PathBuf {
    match std::path::absolute(path) {
        Ok(abs) => abs,
        Err(err) => {
            warn!(
                path = ?path,
                error = %err,
                "unable to use absolute path, using relative path instead"
            );
            path.to_path_buf()
        }
    }
}
