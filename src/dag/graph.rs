// src/dag/graph.rs

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use tokio_util::sync::CancellationToken;

use crate::context::BuildContext;
use crate::dag::executor::Executor;
use crate::dag::scheduler::Scheduler;
use crate::dag::step::{Step, StepId};
use crate::errors::{BuildError, Result};

/// Per-run state of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    /// Not yet completed in this run-cycle.
    Pending,
    /// Completed (ran or skipped as fresh). Sticky until [`StepGraph::reset`].
    Done,
    /// Its own commands (or freshness check) failed in this run-cycle.
    Failed,
}

#[derive(Debug, Clone)]
struct StepNode {
    step: Step,
    state: StepState,
}

/// Arena of steps plus dependency edges.
///
/// Edge direction: dep -> step. For a step `B` that depends on `A` we add
/// edge `A -> B`. Dependency *order* comes from each step's own
/// `dependencies()` list, which preserves declaration order.
#[derive(Debug, Clone, Default)]
pub struct StepGraph {
    graph: DiGraph<StepNode, ()>,
}

impl StepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a step. Every dependency it names must already be in the graph.
    pub fn add_step(&mut self, step: Step) -> Result<StepId> {
        for dep in step.dependencies() {
            self.ensure(*dep)?;
        }

        let deps = step.dependencies().to_vec();
        let id = StepId(self.graph.add_node(StepNode {
            step,
            state: StepState::Pending,
        }));
        for dep in deps {
            self.graph.add_edge(dep.0, id.0, ());
        }
        Ok(id)
    }

    /// Make `step` depend on `dep` after both were inserted.
    ///
    /// This can close a cycle; runs detect that before executing anything.
    pub fn add_dependency(&mut self, step: StepId, dep: StepId) -> Result<()> {
        self.ensure(dep)?;
        self.node_mut(step)?.step.push_dependency(dep);
        self.graph.add_edge(dep.0, step.0, ());
        Ok(())
    }

    /// Replace the file dependency patterns of an inserted step.
    pub fn set_file_deps<I, S>(&mut self, step: StepId, patterns: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns = patterns.into_iter().map(Into::into).collect();
        self.node_mut(step)?.step.replace_file_deps(patterns);
        Ok(())
    }

    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.graph.node_weight(id.0).map(|n| &n.step)
    }

    pub(crate) fn step_ref(&self, id: StepId) -> Result<&Step> {
        self.step(id)
            .ok_or_else(|| BuildError::StepNotFound(id.to_string()))
    }

    pub fn state(&self, id: StepId) -> Option<StepState> {
        self.graph.node_weight(id.0).map(|n| n.state)
    }

    pub fn is_done(&self, id: StepId) -> bool {
        self.state(id) == Some(StepState::Done)
    }

    /// Start a new run-cycle: every step becomes pending again.
    pub fn reset(&mut self) {
        for node in self.graph.node_weights_mut() {
            node.state = StepState::Pending;
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All step ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = StepId> + '_ {
        self.graph.node_indices().map(StepId)
    }

    /// First step with the given name.
    pub fn find(&self, name: &str) -> Option<StepId> {
        self.ids()
            .find(|id| self.step(*id).is_some_and(|s| s.name() == name))
    }

    /// Steps with no dependencies.
    pub fn roots(&self) -> Vec<StepId> {
        self.with_no_neighbors(Direction::Incoming)
    }

    /// Steps nothing depends on.
    pub fn sinks(&self) -> Vec<StepId> {
        self.with_no_neighbors(Direction::Outgoing)
    }

    /// Steps that list `id` as a dependency.
    pub fn dependents(&self, id: StepId) -> Vec<StepId> {
        let mut out: Vec<StepId> = self
            .graph
            .neighbors_directed(id.0, Direction::Outgoing)
            .map(StepId)
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Run `target` and, first, whatever it transitively depends on, one step
    /// at a time.
    pub async fn run(
        &mut self,
        ctx: &BuildContext,
        target: StepId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        Executor::new(ctx).run(self, target, cancel).await
    }

    /// Like [`StepGraph::run`], but independent steps run concurrently, up to
    /// the context's worker count.
    pub async fn run_parallel(
        &mut self,
        ctx: &BuildContext,
        target: StepId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        Scheduler::new(ctx).run(self, target, cancel).await
    }

    pub(crate) fn set_state(&mut self, id: StepId, state: StepState) {
        if let Some(node) = self.graph.node_weight_mut(id.0) {
            node.state = state;
        }
    }

    fn with_no_neighbors(&self, dir: Direction) -> Vec<StepId> {
        self.graph
            .node_indices()
            .filter(|n| self.graph.neighbors_directed(*n, dir).next().is_none())
            .map(StepId)
            .collect()
    }

    fn ensure(&self, id: StepId) -> Result<NodeIndex> {
        if self.graph.node_weight(id.0).is_some() {
            Ok(id.0)
        } else {
            Err(BuildError::StepNotFound(id.to_string()))
        }
    }

    fn node_mut(&mut self, id: StepId) -> Result<&mut StepNode> {
        self.graph
            .node_weight_mut(id.0)
            .ok_or_else(|| BuildError::StepNotFound(id.to_string()))
    }
}
