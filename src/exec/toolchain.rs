// src/exec/toolchain.rs

//! Language toolchain command: `<binary> <subcommand> <targets...> <args...>`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{BuildError, Result};
use crate::exec::output::OutputSink;
use crate::exec::process::ProcessCommand;
use crate::fs::{FileSystem, RealFileSystem};

/// Options recognised by toolchain command factories.
#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    /// Overrides the `PATH` lookup of the toolchain binary.
    pub binary_path: Option<PathBuf>,
    /// Overrides the working directory passed to the factory.
    pub cwd: Option<PathBuf>,
    pub stdout: OutputSink,
    pub stderr: OutputSink,
    /// Filesystem used to inspect targets.
    pub fs: Arc<dyn FileSystem>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            cwd: None,
            stdout: OutputSink::default(),
            stderr: OutputSink::default(),
            fs: Arc::new(RealFileSystem),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolchainCommand {
    toolchain: String,
    subcommand: String,
    targets: Vec<String>,
    process: ProcessCommand,
}

impl ToolchainCommand {
    /// Assemble a toolchain invocation.
    ///
    /// At least one target is required. A target naming a directory must be
    /// the only target; it is replaced by the directory's immediate files.
    pub fn new(
        toolchain: &str,
        subcommand: &str,
        cwd: impl Into<PathBuf>,
        targets: Vec<String>,
        args: Vec<String>,
        config: ToolchainConfig,
    ) -> Result<Self> {
        if targets.is_empty() {
            return Err(BuildError::MissingTarget);
        }

        let cwd = config.cwd.clone().unwrap_or_else(|| cwd.into());
        let binary = match &config.binary_path {
            Some(path) => path.to_string_lossy().into_owned(),
            None => default_binary(toolchain),
        };
        let targets = expand_targets(config.fs.as_ref(), &cwd, targets)?;

        debug!(
            toolchain,
            subcommand,
            binary = %binary,
            cwd = ?cwd,
            targets = ?targets,
            args = ?args,
            "toolchain command created"
        );

        let argv = std::iter::once(binary)
            .chain(std::iter::once(subcommand.to_string()))
            .chain(targets.iter().cloned())
            .chain(args);

        let process = ProcessCommand::new(argv)?
            .cwd(cwd)
            .stdout(config.stdout)
            .stderr(config.stderr);

        Ok(Self {
            toolchain: toolchain.to_string(),
            subcommand: subcommand.to_string(),
            targets,
            process,
        })
    }

    /// `<toolchain> build <targets...> <args...>`
    pub fn for_build(
        toolchain: &str,
        cwd: impl Into<PathBuf>,
        targets: Vec<String>,
        args: Vec<String>,
        config: ToolchainConfig,
    ) -> Result<Self> {
        Self::new(toolchain, "build", cwd, targets, args, config)
    }

    /// `<toolchain> run <targets...> <args...>`
    pub fn for_run(
        toolchain: &str,
        cwd: impl Into<PathBuf>,
        targets: Vec<String>,
        args: Vec<String>,
        config: ToolchainConfig,
    ) -> Result<Self> {
        Self::new(toolchain, "run", cwd, targets, args, config)
    }

    pub fn toolchain(&self) -> &str {
        &self.toolchain
    }

    pub fn subcommand(&self) -> &str {
        &self.subcommand
    }

    /// Targets after directory expansion.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// The underlying process invocation.
    pub fn process(&self) -> &ProcessCommand {
        &self.process
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        self.process.run(cancel).await
    }
}

/// Locate `toolchain` on `PATH`, falling back to the bare name.
fn default_binary(toolchain: &str) -> String {
    match lookup_path(toolchain) {
        Some(path) => path.to_string_lossy().into_owned(),
        None => {
            warn!(
                toolchain,
                "unable to find toolchain binary on PATH, resorting to \"{}\"", toolchain
            );
            toolchain.to_string()
        }
    }
}

fn lookup_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = candidate.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

/// Replace a lone directory target by its immediate non-directory entries.
fn expand_targets(fs: &dyn FileSystem, cwd: &Path, targets: Vec<String>) -> Result<Vec<String>> {
    for target in &targets {
        let resolved = cwd.join(target);
        if !fs.exists(&resolved) {
            return Err(BuildError::io(
                resolved,
                std::io::Error::new(std::io::ErrorKind::NotFound, "target not found"),
            ));
        }
        if !fs.is_dir(&resolved) {
            continue;
        }

        if targets.len() != 1 {
            return Err(BuildError::DirectoryTargetNotExclusive(PathBuf::from(target)));
        }

        let mut files: Vec<String> = fs
            .read_dir(&resolved)?
            .into_iter()
            .filter(|entry| !fs.is_dir(entry))
            .filter_map(|entry| {
                entry
                    .file_name()
                    .map(|name| Path::new(target).join(name).to_string_lossy().into_owned())
            })
            .collect();
        files.sort();
        return Ok(files);
    }

    Ok(targets)
}
