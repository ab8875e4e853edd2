// src/store/file.rs

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::errors::{BuildError, Result};
use crate::hash::Digest;
use crate::store::{BatchError, HashStore};

/// Name of the hashes file inside the cache directory.
///
/// The effective path on disk is `<cache_dir>/hashes.toml`: a `[hashes]`
/// table mapping each file path to its hex digest. TOML quoting keeps any
/// path, including ones with newlines, a single key.
pub const HASH_FILE_NAME: &str = "hashes.toml";

#[derive(Debug, Default, Serialize, Deserialize)]
struct HashFile {
    #[serde(default)]
    hashes: BTreeMap<String, String>,
}

/// Stores hashes in a single file under the cache directory.
///
/// The whole mapping is loaded on open. Every write rewrites the file through
/// a temporary file that is renamed into place, so a crash mid-write leaves
/// the previous contents intact. [`HashStore::set_many`] does this once per
/// batch.
#[derive(Debug)]
pub struct FileHashStore {
    dir: PathBuf,
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Digest>>,
}

impl FileHashStore {
    /// Open (creating if needed) the store under `cache_dir`.
    pub fn open(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = cache_dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| BuildError::io(&dir, e))?;

        let path = dir.join(HASH_FILE_NAME);
        let entries = load_all_hashes(&path)?;
        info!(path = ?path, entries = entries.len(), "opened hash store");

        Ok(Self {
            dir,
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HashStore for FileHashStore {
    fn get(&self, path: &str) -> Result<Option<Digest>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(path).cloned())
    }

    fn set(&self, path: &str, digest: &Digest) -> Result<()> {
        self.set_many(&[(path.to_string(), digest.clone())])
            .map_err(|batch| batch.error)
    }

    /// One rewrite for the whole batch. The rewrite is all-or-nothing, so a
    /// failure is reported against the first entry and nothing is recorded.
    fn set_many(&self, batch: &[(String, Digest)]) -> std::result::Result<(), BatchError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let previous: Vec<Option<Digest>> = batch
            .iter()
            .map(|(path, digest)| entries.insert(path.clone(), digest.clone()))
            .collect();

        if let Err(error) = save_all_hashes(&self.dir, &self.path, &entries) {
            // Keep memory in line with what is on disk.
            for ((path, _), prev) in batch.iter().zip(previous).rev() {
                match prev {
                    Some(prev) => entries.insert(path.clone(), prev),
                    None => entries.remove(path),
                };
            }
            return Err(BatchError { index: 0, error });
        }

        debug!(count = batch.len(), "stored file hashes (file)");
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Load all stored hashes from `path`.
///
/// An unparsable file or record is skipped with a warning; the affected
/// files are simply seen as new again.
fn load_all_hashes(path: &Path) -> Result<BTreeMap<String, Digest>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let text = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
    let file: HashFile = match toml::from_str(&text) {
        Ok(file) => file,
        Err(err) => {
            warn!(path = ?path, error = %err, "hash store unreadable; starting empty");
            return Ok(BTreeMap::new());
        }
    };

    let mut map = BTreeMap::new();
    for (file, hex) in file.hashes {
        match Digest::from_hex(&hex) {
            Some(digest) => {
                map.insert(file, digest);
            }
            None => warn!(path = ?path, file = %file, "skipping malformed hash record"),
        }
    }

    Ok(map)
}

/// Persist all hashes to `path` via a temp file in `dir`.
fn save_all_hashes(dir: &Path, path: &Path, map: &BTreeMap<String, Digest>) -> Result<()> {
    let file = HashFile {
        hashes: map
            .iter()
            .map(|(file, digest)| (file.clone(), digest.to_hex()))
            .collect(),
    };
    let text = toml::to_string(&file).map_err(|e| {
        BuildError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| BuildError::io(dir, e))?;
    tmp.write_all(text.as_bytes())
        .map_err(|e| BuildError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| BuildError::io(tmp.path(), e))?;

    tmp.persist(path)
        .map_err(|e| BuildError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use crate::types::DigestAlgorithm;
    use tempfile::tempdir;

    #[test]
    fn round_trip_and_overwrite() {
        let dir = tempdir().unwrap();
        let store = FileHashStore::open(dir.path()).unwrap();

        let h1 = hash_bytes(DigestAlgorithm::Sha256, b"test");
        let h2 = hash_bytes(DigestAlgorithm::Sha256, b"test2");

        store.set("test.txt", &h1).unwrap();
        assert_eq!(store.get("test.txt").unwrap(), Some(h1));

        store.set("test.txt", &h2).unwrap();
        assert_eq!(store.get("test.txt").unwrap(), Some(h2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unknown_path_is_absent() {
        let dir = tempdir().unwrap();
        let store = FileHashStore::open(dir.path()).unwrap();
        assert_eq!(store.get("test.txt").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join(".stepwise");
        let digest = hash_bytes(DigestAlgorithm::Blake3, b"persist me");

        {
            let store = FileHashStore::open(&cache).unwrap();
            store.set("/abs/path with spaces.txt", &digest).unwrap();
        }

        let reopened = FileHashStore::open(&cache).unwrap();
        assert_eq!(
            reopened.get("/abs/path with spaces.txt").unwrap(),
            Some(digest)
        );
        assert!(reopened.path().ends_with(HASH_FILE_NAME));
    }

    #[test]
    fn malformed_records_are_skipped() {
        let dir = tempdir().unwrap();
        let digest = hash_bytes(DigestAlgorithm::Blake3, b"ok");
        fs::write(
            dir.path().join(HASH_FILE_NAME),
            format!(
                "[hashes]\n\"/bad.txt\" = \"not-hex\"\n\"/good.txt\" = \"{}\"\n",
                digest.to_hex()
            ),
        )
        .unwrap();

        let store = FileHashStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("/good.txt").unwrap(), Some(digest));
    }

    #[test]
    fn unparsable_file_starts_empty() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(HASH_FILE_NAME), "this is = = not toml").unwrap();

        let store = FileHashStore::open(dir.path()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn awkward_paths_keep_their_own_key() {
        let dir = tempdir().unwrap();
        let digest = hash_bytes(DigestAlgorithm::Blake3, b"content");
        let awkward = "/a\nb \"quoted\" = [x]";

        FileHashStore::open(dir.path())
            .unwrap()
            .set(awkward, &digest)
            .unwrap();

        let reopened = FileHashStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get(awkward).unwrap(), Some(digest));
        assert_eq!(reopened.get("/a").unwrap(), None);
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn batch_is_written_and_reloaded() {
        let dir = tempdir().unwrap();
        let batch: Vec<(String, Digest)> = (0..50)
            .map(|i| {
                let name = format!("/f{i}.txt");
                let digest = hash_bytes(DigestAlgorithm::Blake3, name.as_bytes());
                (name, digest)
            })
            .collect();

        FileHashStore::open(dir.path())
            .unwrap()
            .set_many(&batch)
            .unwrap();

        let reopened = FileHashStore::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 50);
        for (name, digest) in &batch {
            assert_eq!(reopened.get(name).unwrap().as_ref(), Some(digest));
        }
    }

    #[test]
    fn failed_batch_leaves_memory_unchanged() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("cache");
        let store = FileHashStore::open(&cache).unwrap();
        let old = hash_bytes(DigestAlgorithm::Blake3, b"old");
        let new = hash_bytes(DigestAlgorithm::Blake3, b"new");
        store.set("/kept.txt", &old).unwrap();

        // Without the directory the temp file cannot be created.
        fs::remove_dir_all(&cache).unwrap();

        let err = store
            .set_many(&[
                ("/kept.txt".to_string(), new.clone()),
                ("/added.txt".to_string(), new),
            ])
            .unwrap_err();
        assert_eq!(err.index, 0);
        assert!(matches!(err.error, BuildError::Io { .. }));
        assert_eq!(store.get("/kept.txt").unwrap(), Some(old));
        assert_eq!(store.get("/added.txt").unwrap(), None);
    }
}
