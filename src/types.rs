use serde::Deserialize;

/// Digest algorithm used for file content hashes.
///
/// The algorithm is fixed for the lifetime of a [`crate::context::BuildContext`].
/// Digests from different algorithms never compare equal, so after a switch
/// every recorded file reads as changed and each step with file dependencies
/// reruns once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Blake3,
    Sha256,
}

impl Default for DigestAlgorithm {
    fn default() -> Self {
        DigestAlgorithm::Blake3
    }
}

/// Mode for storing file hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashStorageMode {
    /// Store hashes in a file (`<cache_dir>/hashes.toml`).
    File,
    /// Store hashes in memory only (lost on restart).
    Memory,
}

impl Default for HashStorageMode {
    fn default() -> Self {
        HashStorageMode::File
    }
}

/// What a file dependency seen for the first time means for its step.
///
/// - `Baseline`: record its digest, but do not force the step to run.
/// - `Rebuild`: treat it like a changed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewFilePolicy {
    Baseline,
    Rebuild,
}

impl Default for NewFilePolicy {
    fn default() -> Self {
        NewFilePolicy::Baseline
    }
}
