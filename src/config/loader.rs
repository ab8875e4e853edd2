// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{BuildFile, RawBuildFile};
use crate::errors::{BuildError, Result};

/// Read and deserialize a build file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawBuildFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;

    let config: RawBuildFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a build file and check it: dependency names resolve, no cycles,
/// every step has runnable commands.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<BuildFile> {
    let raw_config = load_from_path(&path)?;
    BuildFile::try_from(raw_config)
}

/// `Stepwise.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Stepwise.toml")
}

/// Directory that relative paths in a build file are resolved against.
///
/// A bare file name (no parent component) means the current directory.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
