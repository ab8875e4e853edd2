// src/dag/scheduler.rs

use std::collections::{BTreeSet, HashMap, HashSet};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::BuildContext;
use crate::dag::cycle::ensure_acyclic;
use crate::dag::executor::{execute_step, finish_step, Execution};
use crate::dag::graph::StepGraph;
use crate::dag::step::StepId;
use crate::errors::Result;

/// Parallel executor.
///
/// Works out which steps the target needs (skipping any already `Done`), then
/// dispatches every step whose dependencies are satisfied, with at most
/// `ctx.workers()` in flight. The first failure cancels the remaining work;
/// steps already running are drained before the error is returned.
#[derive(Debug, Clone)]
pub struct Scheduler {
    ctx: BuildContext,
}

impl Scheduler {
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

        let members = required_steps(graph, target)?;
        let mut waiting: HashMap<StepId, usize> = HashMap::new();
        // Ordered so dispatch is deterministic for a given graph.
        let mut ready: BTreeSet<StepId> = BTreeSet::new();

        for id in &members {
            let unique: HashSet<StepId> = graph
                .step_ref(*id)?
                .dependencies()
                .iter()
                .copied()
                .filter(|dep| members.contains(dep))
                .collect();
            if unique.is_empty() {
                ready.insert(*id);
            } else {
                waiting.insert(*id, unique.len());
            }
        }

        debug!(steps = members.len(), ready = ready.len(), "scheduling steps");

        let workers = self.ctx.workers();
        let token = cancel.child_token();
        let mut running: JoinSet<(StepId, Result<Execution>)> = JoinSet::new();
        let mut first_error = None;

        loop {
            while first_error.is_none() && running.len() < workers {
                let Some(id) = ready.pop_first() else {
                    break;
                };
                let step = graph.step_ref(id)?.clone();
                let ctx = self.ctx.clone();
                let token = token.clone();
                running.spawn(async move {
                    let result = execute_step(&ctx, &step, &token).await;
                    (id, result)
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };

            let outcome = match joined {
                Ok((id, result)) => finish_step(&self.ctx, graph, id, result)
                    .await
                    .map(|_| id),
                Err(err) => Err(err.into()),
            };

            match outcome {
                Ok(id) => {
                    for dependent in graph.dependents(id) {
                        if let Some(count) = waiting.get_mut(&dependent) {
                            *count -= 1;
                            if *count == 0 {
                                waiting.remove(&dependent);
                                ready.insert(dependent);
                            }
                        }
                    }
                }
                Err(err) => {
                    if first_error.is_none() {
                        warn!(error = %err, "step failed; cancelling remaining steps");
                        token.cancel();
                        first_error = Some(err);
                    } else {
                        debug!(error = %err, "further failure while draining");
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                info!(steps = members.len(), "all steps complete");
                Ok(())
            }
        }
    }
}

/// The target plus every transitive dependency not yet `Done`.
fn required_steps(graph: &StepGraph, target: StepId) -> Result<HashSet<StepId>> {
    let mut members = HashSet::from([target]);
    let mut stack = vec![target];

    while let Some(id) = stack.pop() {
        for dep in graph.step_ref(id)?.dependencies() {
            if !graph.is_done(*dep) && members.insert(*dep) {
                stack.push(*dep);
            }
        }
    }

    Ok(members)
}
