#![allow(dead_code)]

use std::sync::Arc;

use stepwise::context::BuildContext;
use stepwise::fs::mock::MockFileSystem;
use stepwise::store::{HashStore, MemoryHashStore};
use stepwise::types::DigestAlgorithm;

/// A context over an in-memory filesystem and store.
pub fn mock_ctx() -> (MockFileSystem, Arc<MemoryHashStore>, BuildContext) {
    let fs = MockFileSystem::new();
    let store = Arc::new(MemoryHashStore::new());
    let ctx = BuildContext::with_parts(store.clone(), Arc::new(fs.clone()), DigestAlgorithm::Blake3);
    (fs, store, ctx)
}

/// A context over an in-memory filesystem and the given store.
pub fn ctx_with_store(store: Arc<dyn HashStore>) -> (MockFileSystem, BuildContext) {
    let fs = MockFileSystem::new();
    let ctx = BuildContext::with_parts(store, Arc::new(fs.clone()), DigestAlgorithm::Blake3);
    (fs, ctx)
}
