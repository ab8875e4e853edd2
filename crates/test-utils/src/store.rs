use std::sync::Mutex;

use stepwise::errors::{BuildError, Result};
use stepwise::hash::Digest;
use stepwise::store::{HashStore, MemoryHashStore};

/// In-memory store whose writes can be made to fail on demand.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryHashStore,
    /// Writes still allowed before every further one fails; `None` never fails.
    writes_left: Mutex<Option<usize>>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        *self.writes_left.lock().unwrap() = fail.then_some(0);
    }

    /// Let the next `allowed` writes through, then fail the rest.
    pub fn fail_after(&self, allowed: usize) {
        *self.writes_left.lock().unwrap() = Some(allowed);
    }
}

impl HashStore for FailingStore {
    fn get(&self, path: &str) -> Result<Option<Digest>> {
        self.inner.get(path)
    }

    fn set(&self, path: &str, digest: &Digest) -> Result<()> {
        {
            let mut left = self.writes_left.lock().unwrap();
            match left.as_mut() {
                Some(0) => {
                    return Err(BuildError::io(
                        path,
                        std::io::Error::other("injected write failure"),
                    ));
                }
                Some(n) => *n -= 1,
                None => {}
            }
        }
        self.inner.set(path, digest)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
