// src/hash.rs

//! File content digests.

use std::fmt;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest as _, Sha256};

use crate::errors::{BuildError, Result};
use crate::fs::FileSystem;
use crate::types::DigestAlgorithm;

/// Files are read in chunks of this size, whatever their length.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Binary content fingerprint of a file.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Digest(Vec<u8>);

impl Digest {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Digest(bytes.into())
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        hex::decode(hex.trim()).ok().map(Digest)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

/// Streaming digest accumulator over the supported algorithms.
enum Accumulator {
    Blake3(Box<blake3::Hasher>),
    Sha256(Sha256),
}

impl Accumulator {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Blake3 => Accumulator::Blake3(Box::new(blake3::Hasher::new())),
            DigestAlgorithm::Sha256 => Accumulator::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Accumulator::Blake3(h) => {
                h.update(chunk);
            }
            Accumulator::Sha256(h) => h.update(chunk),
        }
    }

    fn finalize(self) -> Digest {
        match self {
            Accumulator::Blake3(h) => Digest::from_bytes(h.finalize().as_bytes().to_vec()),
            Accumulator::Sha256(h) => Digest::from_bytes(h.finalize().to_vec()),
        }
    }
}

/// Computes digests of files reachable through a [`FileSystem`].
#[derive(Debug, Clone)]
pub struct ContentHasher {
    algorithm: DigestAlgorithm,
    fs: Arc<dyn FileSystem>,
}

impl ContentHasher {
    pub fn new(algorithm: DigestAlgorithm, fs: Arc<dyn FileSystem>) -> Self {
        Self { algorithm, fs }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Hash the file at `path`.
    ///
    /// A read failure at any point fails the whole hash.
    pub fn hash(&self, path: &Path) -> Result<Digest> {
        let mut reader = self.fs.open_read(path)?;
        hash_reader(self.algorithm, &mut reader).map_err(|e| BuildError::io(path, e))
    }
}

/// Hash an in-memory byte slice.
pub fn hash_bytes(algorithm: DigestAlgorithm, data: &[u8]) -> Digest {
    let mut acc = Accumulator::new(algorithm);
    acc.update(data);
    acc.finalize()
}

fn hash_reader(algorithm: DigestAlgorithm, reader: &mut dyn Read) -> std::io::Result<Digest> {
    let mut acc = Accumulator::new(algorithm);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        acc.update(&buf[..n]);
    }
    Ok(acc.finalize())
}
