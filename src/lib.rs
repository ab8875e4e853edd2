// src/lib.rs

//! Embeddable build orchestration: named steps with ordered dependencies,
//! rerun only when the content of their files changed.
//!
//! ```no_run
//! use stepwise::context::{BuildContext, ContextOptions};
//! use stepwise::dag::{Step, StepGraph};
//! use stepwise::exec::ProcessCommand;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> stepwise::errors::Result<()> {
//! let ctx = BuildContext::open(ContextOptions::default())?;
//! let mut graph = StepGraph::new();
//!
//! let generate = graph.add_step(
//!     Step::new("generate", vec![ProcessCommand::new(["./gen.sh"])?.into()])?
//!         .add_file_deps(["data/*.txt"]),
//! )?;
//! let build = graph.add_step(
//!     Step::new("build", vec![ProcessCommand::new(["make"])?.into()])?.depends_on([generate]),
//! )?;
//!
//! graph.run(&ctx, build, &CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod dag;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod hash;
pub mod logging;
pub mod store;
pub mod types;

use std::path::PathBuf;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{build_graph, config_root_dir, load_and_validate, BuildFile, StepIndex};
use crate::context::BuildContext;
use crate::dag::{StepGraph, StepId};
use crate::errors::BuildError;

/// High-level entry point used by `main.rs`.
///
/// Loads the build file, opens the build context, then builds each selected
/// target in one run-cycle, so a step shared by several targets runs at most
/// once. Ctrl-C cancels the run.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let root_dir = config_root_dir(&config_path);
    let mut options = cfg.config.context_options(&root_dir);
    if let Some(dir) = &args.cache_dir {
        options.cache_dir = dir.clone();
    }
    let ctx = BuildContext::open(options)?;

    let (mut graph, index) = build_graph(&cfg, &root_dir)?;
    let targets = select_targets(&graph, &index, &args.steps)?;
    info!(targets = ?args.steps, count = targets.len(), parallel = args.parallel, "starting build");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("interrupt received; cancelling build");
            cancel.cancel();
        });
    }

    for target in targets {
        if args.parallel {
            graph.run_parallel(&ctx, target, &cancel).await?;
        } else {
            graph.run(&ctx, target, &cancel).await?;
        }
    }

    info!("build finished");
    Ok(())
}

/// Resolve `--step` names, or default to every sink step in name order.
pub fn select_targets(
    graph: &StepGraph,
    index: &StepIndex,
    names: &[String],
) -> std::result::Result<Vec<StepId>, BuildError> {
    if names.is_empty() {
        let sinks = graph.sinks();
        return Ok(index
            .values()
            .copied()
            .filter(|id| sinks.contains(id))
            .collect());
    }

    names
        .iter()
        .map(|name| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| BuildError::StepNotFound(name.clone()))
        })
        .collect()
}

/// Simple dry-run output: print steps, deps, file patterns and commands.
fn print_dry_run(cfg: &BuildFile) {
    println!("stepwise dry-run");
    println!("  config.cache_dir = {}", cfg.config.cache_dir.display());
    println!("  config.digest = {:?}", cfg.config.digest);
    println!("  config.hash_storage = {:?}", cfg.config.hash_storage);
    println!("  config.new_files = {:?}", cfg.config.new_files);
    if let Some(workers) = cfg.config.workers {
        println!("  config.workers = {workers}");
    }
    println!();

    println!("steps ({}):", cfg.step.len());
    for (name, step) in cfg.step.iter() {
        println!("  - {name}");
        if !step.after.is_empty() {
            println!("      after: {:?}", step.after);
        }
        if !step.files.is_empty() {
            println!("      files: {:?}", step.files);
        }
        for command in step.commands.iter() {
            println!("      cmd: {}", command.summary());
        }
    }

    debug!("dry-run complete (no execution)");
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::config::model::RawBuildFile;

    fn graph(src: &str) -> (StepGraph, StepIndex) {
        let raw: RawBuildFile = toml::from_str(src).unwrap();
        let cfg = BuildFile::try_from(raw).unwrap();
        build_graph(&cfg, Path::new("/proj")).unwrap()
    }

    const DIAMOND: &str = r#"
        [step.a]
        commands = [ { run = ["true"] } ]

        [step.b]
        after = ["a"]
        commands = [ { run = ["true"] } ]

        [step.zz]
        after = ["a"]
        commands = [ { run = ["true"] } ]

        [step.c]
        commands = [ { run = ["true"] } ]
    "#;

    #[test]
    fn defaults_to_sinks_in_name_order() {
        let (g, index) = graph(DIAMOND);
        let targets = select_targets(&g, &index, &[]).unwrap();
        assert_eq!(targets, vec![index["b"], index["c"], index["zz"]]);
    }

    #[test]
    fn named_targets_are_resolved() {
        let (g, index) = graph(DIAMOND);
        let targets = select_targets(&g, &index, &["a".to_string()]).unwrap();
        assert_eq!(targets, vec![index["a"]]);

        let err = select_targets(&g, &index, &["nope".to_string()]).unwrap_err();
        assert!(matches!(err, BuildError::StepNotFound(ref n) if n == "nope"));
    }
}
