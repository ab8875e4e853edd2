// src/store/memory.rs

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::errors::Result;
use crate::hash::Digest;
use crate::store::HashStore;

/// Stores hashes in memory only.
#[derive(Debug, Default)]
pub struct MemoryHashStore {
    map: Mutex<HashMap<String, Digest>>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HashStore for MemoryHashStore {
    fn get(&self, path: &str) -> Result<Option<Digest>> {
        let map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(path).cloned())
    }

    fn set(&self, path: &str, digest: &Digest) -> Result<()> {
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(path.to_string(), digest.clone());
        debug!(file = %path, hash = %digest, "stored file hash (memory)");
        Ok(())
    }

    fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_overwrite() {
        let store = MemoryHashStore::new();
        assert_eq!(store.get("a.txt").unwrap(), None);

        let h1 = Digest::from_bytes(vec![1, 2, 3]);
        let h2 = Digest::from_bytes(vec![4, 5, 6]);
        store.set("a.txt", &h1).unwrap();
        assert_eq!(store.get("a.txt").unwrap(), Some(h1));

        store.set("a.txt", &h2).unwrap();
        assert_eq!(store.get("a.txt").unwrap(), Some(h2));
        assert_eq!(store.len(), 1);
    }
}
