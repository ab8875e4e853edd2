// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::context::{ContextOptions, DEFAULT_CACHE_DIR};
use crate::types::{DigestAlgorithm, HashStorageMode, NewFilePolicy};

/// Build file as read from TOML, before validation.
///
/// ```toml
/// [config]
/// digest = "sha256"
///
/// [step.generate]
/// files = ["data/*.txt"]
/// commands = [ { run = ["sh", "-c", "echo generating"] } ]
///
/// [step.build]
/// after = ["generate"]
/// commands = [ { toolchain = "go", subcommand = "build", targets = ["./cmd"] } ]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawBuildFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// All steps from `[step.<name>]`, keyed by step name.
    #[serde(default)]
    pub step: BTreeMap<String, StepConfig>,
}

/// A build file that passed validation.
///
/// Only obtainable through `TryFrom<RawBuildFile>`, so holders can rely on
/// dependency names resolving and the graph being acyclic.
#[derive(Debug, Clone)]
pub struct BuildFile {
    pub config: ConfigSection,
    pub step: BTreeMap<String, StepConfig>,
}

impl BuildFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        step: BTreeMap<String, StepConfig>,
    ) -> Self {
        Self { config, step }
    }
}

/// `[config]` section: options for the build context.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    /// Relative paths are resolved against the build file's directory.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default)]
    pub digest: DigestAlgorithm,

    #[serde(default)]
    pub hash_storage: HashStorageMode,

    #[serde(default)]
    pub new_files: NewFilePolicy,

    /// Parallel run width; defaults to the number of available CPUs.
    #[serde(default)]
    pub workers: Option<usize>,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            digest: DigestAlgorithm::default(),
            hash_storage: HashStorageMode::default(),
            new_files: NewFilePolicy::default(),
            workers: None,
        }
    }
}

impl ConfigSection {
    /// Context options with `cache_dir` resolved against `base_dir`.
    pub fn context_options(&self, base_dir: &std::path::Path) -> ContextOptions {
        let defaults = ContextOptions::default();
        ContextOptions {
            cache_dir: base_dir.join(&self.cache_dir),
            digest: self.digest,
            hash_storage: self.hash_storage,
            new_files: self.new_files,
            workers: self.workers.unwrap_or(defaults.workers),
        }
    }
}

/// `[step.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    /// Names of steps that must complete first, in order.
    #[serde(default)]
    pub after: Vec<String>,

    /// File dependency globs, relative to the build file's directory.
    #[serde(default)]
    pub files: Vec<String>,

    pub commands: Vec<CommandConfig>,
}

/// One entry in a step's `commands` list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CommandConfig {
    /// `{ run = ["prog", "arg"], cwd = "dir" }`
    Process {
        run: Vec<String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
    },
    /// `{ toolchain = "go", subcommand = "build", targets = [...], args = [...] }`
    Toolchain {
        toolchain: String,
        subcommand: String,
        targets: Vec<String>,
        #[serde(default)]
        args: Vec<String>,
        /// Explicit path to the toolchain binary; otherwise looked up on PATH.
        #[serde(default)]
        binary: Option<PathBuf>,
        #[serde(default)]
        cwd: Option<PathBuf>,
    },
}

impl CommandConfig {
    pub fn summary(&self) -> String {
        match self {
            CommandConfig::Process { run, .. } => run.join(" "),
            CommandConfig::Toolchain {
                toolchain,
                subcommand,
                targets,
                args,
                ..
            } => {
                let mut parts = vec![toolchain.clone(), subcommand.clone()];
                parts.extend(targets.iter().cloned());
                parts.extend(args.iter().cloned());
                parts.join(" ")
            }
        }
    }
}
