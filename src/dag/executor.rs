// src/dag/executor.rs

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::context::BuildContext;
use crate::dag::cycle::ensure_acyclic;
use crate::dag::freshness::{self, Freshness};
use crate::dag::graph::{StepGraph, StepState};
use crate::dag::step::{Step, StepId};
use crate::errors::{BuildError, Result};
use crate::hash::Digest;

/// What happened to a step that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Every matched file was unchanged; no command ran.
    Skipped,
    /// All commands ran and succeeded.
    Ran,
}

/// A successful step evaluation plus the digests still to be recorded.
#[derive(Debug)]
pub(crate) struct Execution {
    pub outcome: StepOutcome,
    pub pending: Vec<(String, Digest)>,
}

/// Sequential, depth-first executor.
///
/// Dependencies run in declaration order before the step itself. A
/// dependency that is already `Done` in this run-cycle is not revisited.
#[derive(Debug, Clone)]
pub struct Executor {
    ctx: BuildContext,
}

type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

impl Executor {
    pub fn new(ctx: &BuildContext) -> Self {
        Self { ctx: ctx.clone() }
    }

    pub async fn run(
        &self,
        graph: &mut StepGraph,
        target: StepId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        graph.step_ref(target)?;
        ensure_acyclic(graph, target)?;
        self.run_step(graph, target, cancel).await
    }

    fn run_step<'a>(
        &'a self,
        graph: &'a mut StepGraph,
        id: StepId,
        cancel: &'a CancellationToken,
    ) -> StepFuture<'a> {
        Box::pin(async move {
            let deps = graph.step_ref(id)?.dependencies().to_vec();
            for dep in deps {
                if graph.is_done(dep) {
                    debug!(step = %dep, "dependency already done");
                    continue;
                }
                self.run_step(graph, dep, cancel).await?;
            }

            let result = execute_step(&self.ctx, graph.step_ref(id)?, cancel).await;
            finish_step(&self.ctx, graph, id, result).await.map(|_| ())
        })
    }
}

/// Record a step's result in the graph.
///
/// A successful step is marked `Done` before its pending digests are written,
/// so a persistence failure leaves it `Done` but still returns the error.
pub(crate) async fn finish_step(
    ctx: &BuildContext,
    graph: &mut StepGraph,
    id: StepId,
    result: Result<Execution>,
) -> Result<StepOutcome> {
    match result {
        Ok(execution) => {
            graph.set_state(id, StepState::Done);
            persist_pending(ctx, execution.pending).await?;
            Ok(execution.outcome)
        }
        Err(err) => {
            graph.set_state(id, StepState::Failed);
            Err(err)
        }
    }
}

/// Decide whether `step` is stale and, if so, run its commands in order.
///
/// Nothing is written to the store here except baselines for files seen for
/// the first time.
pub(crate) async fn execute_step(
    ctx: &BuildContext,
    step: &Step,
    cancel: &CancellationToken,
) -> Result<Execution> {
    let name = step.name();

    let pending = if step.file_deps().is_empty() {
        debug!(step = %name, "no file dependencies; always runs");
        Vec::new()
    } else {
        let fresh = check_freshness(ctx, step.file_deps().to_vec())
            .await
            .inspect_err(|err| error!(step = %name, error = %err, "freshness check failed"))?;
        if !fresh.needs_rebuild() {
            info!(step = %name, "no files changed; skipping");
            return Ok(Execution {
                outcome: StepOutcome::Skipped,
                pending: Vec::new(),
            });
        }
        fresh.pending
    };

    info!(step = %name, commands = step.commands().len(), "running step");

    for (index, command) in step.commands().iter().enumerate() {
        if cancel.is_cancelled() {
            info!(step = %name, "cancelled before command {index}");
            return Err(BuildError::Cancelled);
        }
        debug!(step = %name, index, command = %command.describe(), "running command");
        if let Err(err) = command.run(cancel).await {
            error!(step = %name, index, error = %err, "step failed");
            return Err(err);
        }
    }

    info!(step = %name, "step complete");
    Ok(Execution {
        outcome: StepOutcome::Ran,
        pending,
    })
}

async fn check_freshness(ctx: &BuildContext, patterns: Vec<String>) -> Result<Freshness> {
    let ctx = ctx.clone();
    tokio::task::spawn_blocking(move || freshness::check(&ctx, &patterns)).await?
}

async fn persist_pending(ctx: &BuildContext, pending: Vec<(String, Digest)>) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let ctx = ctx.clone();
    tokio::task::spawn_blocking(move || freshness::persist(&ctx, &pending)).await?
}
