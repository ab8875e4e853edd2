// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{BuildFile, CommandConfig, RawBuildFile};
use crate::errors::{BuildError, Result};

impl TryFrom<RawBuildFile> for BuildFile {
    type Error = BuildError;

    fn try_from(raw: RawBuildFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(BuildFile::new_unchecked(raw.config, raw.step))
    }
}

fn validate_raw_config(cfg: &RawBuildFile) -> Result<()> {
    ensure_has_steps(cfg)?;
    validate_global_config(cfg)?;
    validate_commands(cfg)?;
    validate_step_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_steps(cfg: &RawBuildFile) -> Result<()> {
    if cfg.step.is_empty() {
        return Err(BuildError::Config(
            "build file must contain at least one [step.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawBuildFile) -> Result<()> {
    if cfg.config.workers == Some(0) {
        return Err(BuildError::Config(
            "[config].workers must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_commands(cfg: &RawBuildFile) -> Result<()> {
    for (name, step) in cfg.step.iter() {
        if step.commands.is_empty() {
            return Err(BuildError::EmptyCommands(name.clone()));
        }
        for (index, command) in step.commands.iter().enumerate() {
            match command {
                CommandConfig::Process { run, .. } if run.is_empty() => {
                    return Err(BuildError::Config(format!(
                        "step '{name}' command #{index}: `run` must name a program"
                    )));
                }
                CommandConfig::Toolchain { targets, .. } if targets.is_empty() => {
                    return Err(BuildError::Config(format!(
                        "step '{name}' command #{index}: `targets` must not be empty"
                    )));
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn validate_step_dependencies(cfg: &RawBuildFile) -> Result<()> {
    for (name, step) in cfg.step.iter() {
        for dep in step.after.iter() {
            if !cfg.step.contains_key(dep) {
                return Err(BuildError::Config(format!(
                    "step '{name}' has unknown dependency '{dep}' in `after`"
                )));
            }
            if dep == name {
                return Err(BuildError::Config(format!(
                    "step '{name}' cannot depend on itself in `after`"
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawBuildFile) -> Result<()> {
    // Edge direction: dep -> step.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.step.keys() {
        graph.add_node(name.as_str());
    }

    for (name, step) in cfg.step.iter() {
        for dep in step.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(BuildError::DependencyCycle(format!(
            "cycle in build file involving step '{}'",
            cycle.node_id()
        ))),
    }
}
