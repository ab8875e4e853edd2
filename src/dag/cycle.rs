// src/dag/cycle.rs

//! Cycle detection over step dependencies (three-colour depth-first search).

use std::collections::HashMap;

use crate::dag::graph::StepGraph;
use crate::dag::step::StepId;
use crate::errors::{BuildError, Result};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    /// On the current DFS path.
    Gray,
    /// Fully explored.
    Black,
}

/// Find a dependency cycle reachable from `start`.
///
/// Returns the cycle as a path that begins and ends with the same step,
/// e.g. `[a, b, a]`.
pub fn find_cycle(graph: &StepGraph, start: StepId) -> Option<Vec<StepId>> {
    let mut colors: HashMap<StepId, Color> = HashMap::new();
    // (step, index of the next dependency to visit)
    let mut stack: Vec<(StepId, usize)> = vec![(start, 0)];
    colors.insert(start, Color::Gray);

    while let Some((id, next)) = stack.last_mut() {
        let deps = graph.step(*id).map(|s| s.dependencies()).unwrap_or(&[]);

        if *next >= deps.len() {
            colors.insert(*id, Color::Black);
            stack.pop();
            continue;
        }

        let dep = deps[*next];
        *next += 1;

        match colors.get(&dep) {
            Some(Color::Black) => {}
            Some(Color::Gray) => {
                let from = stack.iter().position(|(s, _)| *s == dep).unwrap_or(0);
                let mut cycle: Vec<StepId> = stack[from..].iter().map(|(s, _)| *s).collect();
                cycle.push(dep);
                return Some(cycle);
            }
            None => {
                colors.insert(dep, Color::Gray);
                stack.push((dep, 0));
            }
        }
    }

    None
}

/// Fail with [`BuildError::DependencyCycle`] if a cycle is reachable from
/// `start`.
pub fn ensure_acyclic(graph: &StepGraph, start: StepId) -> Result<()> {
    match find_cycle(graph, start) {
        None => Ok(()),
        Some(cycle) => {
            let names: Vec<String> = cycle
                .iter()
                .map(|id| {
                    graph
                        .step(*id)
                        .map(|s| s.name().to_string())
                        .unwrap_or_else(|| id.to_string())
                })
                .collect();
            Err(BuildError::DependencyCycle(names.join(" -> ")))
        }
    }
}
