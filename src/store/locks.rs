// src/store/locks.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Per-key mutexes, created on first use.
///
/// Callers take the handle for a path and hold its guard for the whole
/// get/compare/set sequence on that path.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutex guarding `key`. The same key always yields the same mutex.
    pub fn handle(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(key.to_string()).or_default())
    }
}
