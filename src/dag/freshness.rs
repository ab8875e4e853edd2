// src/dag/freshness.rs

//! The rebuild decision: compare current file digests against the store.

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use crate::context::BuildContext;
use crate::errors::{BuildError, Result};
use crate::fs::glob;
use crate::hash::Digest;
use crate::types::NewFilePolicy;

/// How one matched file compares to its recorded digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// No digest recorded yet.
    New,
    Unchanged,
    Changed,
}

/// Result of checking a step's file dependencies.
#[derive(Debug, Default)]
pub struct Freshness {
    /// Files that force a rebuild, with the digests to record once the
    /// step's commands succeed.
    pub pending: Vec<(String, Digest)>,
    /// Files seen for the first time whose digest was recorded immediately.
    pub baselined: Vec<String>,
}

impl Freshness {
    pub fn needs_rebuild(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Classify a file against the store.
pub fn classify(stored: Option<&Digest>, current: &Digest) -> FileStatus {
    match stored {
        None => FileStatus::New,
        Some(prev) if prev == current => FileStatus::Unchanged,
        Some(_) => FileStatus::Changed,
    }
}

/// Expand every pattern (in order) and classify every matched file.
///
/// New files are baselined straight away under the default policy; under
/// [`NewFilePolicy::Rebuild`] they count as changed instead. A failed
/// baseline write is returned as the store reported it: no command has run.
pub fn check(ctx: &BuildContext, patterns: &[String]) -> Result<Freshness> {
    let mut files: Vec<PathBuf> = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for pattern in patterns {
        let matched = glob::expand(ctx.fs(), pattern)?;
        debug!(pattern = %pattern, files = ?matched, "files matched");
        files.extend(matched.into_iter().filter(|f| seen.insert(f.clone())));
    }

    let keys: Vec<String> = files
        .iter()
        .map(|f| f.to_string_lossy().into_owned())
        .collect();
    let locks = lock_handles(ctx, &keys);
    let _guards: Vec<_> = locks
        .iter()
        .map(|lock| lock.lock().unwrap_or_else(|e| e.into_inner()))
        .collect();

    let mut result = Freshness::default();
    let mut baselines: Vec<(String, Digest)> = Vec::new();

    for (file, key) in files.iter().zip(keys) {
        let current = ctx.hasher().hash(file)?;
        let stored = ctx.store().get(&key)?;

        match (classify(stored.as_ref(), &current), ctx.new_file_policy()) {
            (FileStatus::Unchanged, _) => {}
            (FileStatus::New, NewFilePolicy::Baseline) => {
                debug!(file = %key, hash = %current, "recording baseline hash");
                baselines.push((key, current));
            }
            (FileStatus::New, NewFilePolicy::Rebuild) | (FileStatus::Changed, _) => {
                debug!(file = %key, "file changed");
                result.pending.push((key, current));
            }
        }
    }

    ctx.store().set_many(&baselines).map_err(|batch| {
        error!(file = %baselines[batch.index].0, error = %batch.error, "unable to record baseline");
        batch.error
    })?;
    result.baselined = baselines.into_iter().map(|(key, _)| key).collect();

    Ok(result)
}

/// Record digests after a successful run in one batch; the first failure
/// aborts the rest and is reported as [`BuildError::Persist`].
pub fn persist(ctx: &BuildContext, pending: &[(String, Digest)]) -> Result<()> {
    let keys: Vec<String> = pending.iter().map(|(key, _)| key.clone()).collect();
    let locks = lock_handles(ctx, &keys);
    let _guards: Vec<_> = locks
        .iter()
        .map(|lock| lock.lock().unwrap_or_else(|e| e.into_inner()))
        .collect();

    ctx.store().set_many(pending).map_err(|batch| {
        let key = &pending[batch.index].0;
        error!(file = %key, error = %batch.error, "unable to update cache for file");
        BuildError::Persist {
            path: key.clone(),
            source: Box::new(batch.error),
        }
    })
}

/// Per-path locks for `keys`, deduplicated and sorted so that steps locking
/// overlapping sets always acquire them in the same order.
fn lock_handles(ctx: &BuildContext, keys: &[String]) -> Vec<Arc<Mutex<()>>> {
    let ordered: BTreeSet<&String> = keys.iter().collect();
    ordered.into_iter().map(|key| ctx.locks().handle(key)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::hash::hash_bytes;
    use crate::store::{HashStore, MemoryHashStore};
    use crate::types::DigestAlgorithm;

    fn setup() -> (MockFileSystem, Arc<MemoryHashStore>, BuildContext) {
        let fs = MockFileSystem::new();
        let store = Arc::new(MemoryHashStore::new());
        let ctx = BuildContext::with_parts(
            store.clone(),
            Arc::new(fs.clone()),
            DigestAlgorithm::Blake3,
        );
        (fs, store, ctx)
    }

    #[test]
    fn classify_covers_all_cases() {
        let a = hash_bytes(DigestAlgorithm::Blake3, b"a");
        let b = hash_bytes(DigestAlgorithm::Blake3, b"b");
        assert_eq!(classify(None, &a), FileStatus::New);
        assert_eq!(classify(Some(&a), &a), FileStatus::Unchanged);
        assert_eq!(classify(Some(&b), &a), FileStatus::Changed);
    }

    #[test]
    fn new_files_are_baselined_not_pending() {
        let (fs, store, ctx) = setup();
        fs.add_file("/p/f.txt", "x");

        let res = check(&ctx, &["/p/*.txt".to_string()]).unwrap();
        assert!(!res.needs_rebuild());
        assert_eq!(res.baselined, vec!["/p/f.txt".to_string()]);
        assert_eq!(
            store.get("/p/f.txt").unwrap(),
            Some(hash_bytes(DigestAlgorithm::Blake3, b"x"))
        );
    }

    #[test]
    fn changed_files_are_pending_and_store_untouched() {
        let (fs, store, ctx) = setup();
        fs.add_file("/p/f.txt", "x");
        check(&ctx, &["/p/f.txt".to_string()]).unwrap();

        fs.add_file("/p/f.txt", "y");
        let res = check(&ctx, &["/p/f.txt".to_string()]).unwrap();
        assert!(res.needs_rebuild());
        assert_eq!(res.pending.len(), 1);
        assert_eq!(
            store.get("/p/f.txt").unwrap(),
            Some(hash_bytes(DigestAlgorithm::Blake3, b"x"))
        );

        persist(&ctx, &res.pending).unwrap();
        assert_eq!(
            store.get("/p/f.txt").unwrap(),
            Some(hash_bytes(DigestAlgorithm::Blake3, b"y"))
        );
    }

    #[test]
    fn rebuild_policy_treats_new_files_as_changed() {
        let (fs, store, ctx) = setup();
        let ctx = ctx.with_new_file_policy(NewFilePolicy::Rebuild);
        fs.add_file("/p/f.txt", "x");

        let res = check(&ctx, &["/p/f.txt".to_string()]).unwrap();
        assert!(res.needs_rebuild());
        assert!(res.baselined.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn overlapping_patterns_count_a_file_once() {
        let (fs, _store, ctx) = setup();
        fs.add_file("/p/f.txt", "x");
        check(&ctx, &["/p/f.txt".to_string()]).unwrap();
        fs.add_file("/p/f.txt", "y");

        let res = check(&ctx, &["/p/*.txt".to_string(), "/p/f.txt".to_string()]).unwrap();
        assert_eq!(res.pending.len(), 1);
    }

    #[test]
    fn unreadable_file_fails_the_check() {
        let (fs, _store, ctx) = setup();
        fs.add_broken_file("/p/f.txt", "partial");
        let err = check(&ctx, &["/p/f.txt".to_string()]).unwrap_err();
        assert!(matches!(err, BuildError::Io { .. }));
    }
}
