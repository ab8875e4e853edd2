// src/config/build.rs

//! Turn a validated [`BuildFile`] into a runnable [`StepGraph`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{BuildFile, CommandConfig, StepConfig};
use crate::context::absolute_or_relative;
use crate::dag::{Step, StepGraph, StepId};
use crate::errors::{BuildError, Result};
use crate::exec::{Command, ProcessCommand, ToolchainCommand, ToolchainConfig};

/// Step ids by name, as declared in the build file.
pub type StepIndex = BTreeMap<String, StepId>;

/// Build the step graph. Relative file patterns and working directories are
/// resolved against `base_dir`.
pub fn build_graph(cfg: &BuildFile, base_dir: &Path) -> Result<(StepGraph, StepIndex)> {
    let base_dir = absolute_or_relative(base_dir);
    let mut graph = StepGraph::new();
    let mut index = StepIndex::new();

    for (name, step_cfg) in cfg.step.iter() {
        let step = build_step(name, step_cfg, &base_dir)?;
        let id = graph.add_step(step)?;
        index.insert(name.clone(), id);
    }

    // Wired after insertion so `after` order is kept regardless of names.
    for (name, step_cfg) in cfg.step.iter() {
        let id = lookup(&index, name)?;
        for dep in step_cfg.after.iter() {
            graph.add_dependency(id, lookup(&index, dep)?)?;
        }
    }

    debug!(steps = graph.len(), "step graph built from config");
    Ok((graph, index))
}

fn lookup(index: &StepIndex, name: &str) -> Result<StepId> {
    index
        .get(name)
        .copied()
        .ok_or_else(|| BuildError::StepNotFound(name.to_string()))
}

fn build_step(name: &str, cfg: &StepConfig, base_dir: &Path) -> Result<Step> {
    let commands = cfg
        .commands
        .iter()
        .map(|c| build_command(c, base_dir))
        .collect::<Result<Vec<_>>>()?;

    let patterns: Vec<String> = cfg
        .files
        .iter()
        .map(|p| resolve(base_dir, Path::new(p)).to_string_lossy().into_owned())
        .collect();

    Ok(Step::new(name, commands)?.set_file_deps(patterns))
}

fn build_command(cfg: &CommandConfig, base_dir: &Path) -> Result<Command> {
    match cfg {
        CommandConfig::Process { run, cwd } => {
            let cwd = resolve_cwd(base_dir, cwd.as_deref());
            Ok(ProcessCommand::new(run.iter().cloned())?.cwd(cwd).into())
        }
        CommandConfig::Toolchain {
            toolchain,
            subcommand,
            targets,
            args,
            binary,
            cwd,
        } => {
            let config = ToolchainConfig {
                binary_path: binary.as_deref().map(|b| resolve_binary(base_dir, b)),
                ..ToolchainConfig::default()
            };
            let cmd = ToolchainCommand::new(
                toolchain,
                subcommand,
                resolve_cwd(base_dir, cwd.as_deref()),
                targets.clone(),
                args.clone(),
                config,
            )?;
            Ok(cmd.into())
        }
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn resolve_cwd(base_dir: &Path, cwd: Option<&Path>) -> PathBuf {
    match cwd {
        Some(dir) => resolve(base_dir, dir),
        None => base_dir.to_path_buf(),
    }
}

/// A bare program name stays as given; anything with a separator is a path.
fn resolve_binary(base_dir: &Path, binary: &Path) -> PathBuf {
    if binary.components().count() > 1 {
        resolve(base_dir, binary)
    } else {
        binary.to_path_buf()
    }
}
