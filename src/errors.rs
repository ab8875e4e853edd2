// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("step '{0}' needs at least one command")]
    EmptyCommands(String),

    #[error("function command needs at least one function")]
    EmptyFunctions,

    #[error("process command needs at least a program to run")]
    EmptyArgs,

    #[error("target is required")]
    MissingTarget,

    #[error("directory target must be exclusive: {0:?}")]
    DirectoryTargetNotExclusive(PathBuf),

    #[error("step not found: {0}")]
    StepNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cyclic dependency: {0}")]
    DependencyCycle(String),

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid file pattern '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {}", exit_code_label(.code))]
    CommandFailed { program: String, code: Option<i32> },

    #[error("function #{index} failed: {source}")]
    Function {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("unable to update cache for {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: Box<BuildError>,
    },

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BuildError {
    /// Attach a path to a raw IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
