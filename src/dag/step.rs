// src/dag/step.rs

//! Build step definition.

use std::fmt;

use petgraph::graph::NodeIndex;
use tracing::debug;

use crate::context::absolute_or_relative;
use crate::errors::{BuildError, Result};
use crate::exec::Command;

/// Handle to a step inside a [`crate::dag::StepGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub(crate) NodeIndex);

impl StepId {
    pub fn index(self) -> usize {
        self.0.index()
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0.index())
    }
}

/// A named unit of build work.
///
/// - `commands` run in order when the step is stale; the list is fixed at
///   construction and never empty.
/// - `depends_on` lists upstream steps, run (in order) before this one.
/// - `file_deps` are glob patterns whose matched files decide freshness. A
///   step without file dependencies is always stale.
#[derive(Debug, Clone)]
pub struct Step {
    name: String,
    commands: Vec<Command>,
    depends_on: Vec<StepId>,
    file_deps: Vec<String>,
}

impl Step {
    pub fn new(name: impl Into<String>, commands: Vec<Command>) -> Result<Self> {
        let name = name.into();
        if commands.is_empty() {
            return Err(BuildError::EmptyCommands(name));
        }

        Ok(Self {
            name,
            commands,
            depends_on: Vec::new(),
            file_deps: Vec::new(),
        })
    }

    /// Append upstream dependencies.
    pub fn depends_on(mut self, steps: impl IntoIterator<Item = StepId>) -> Self {
        self.depends_on.extend(steps);
        self
    }

    /// Append file dependency patterns, each made absolute against the
    /// current directory (or kept as given if that fails).
    pub fn add_file_deps<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let resolved: Vec<String> = patterns
            .into_iter()
            .map(|p| resolve_pattern(p.as_ref()))
            .collect();
        debug!(step = %self.name, patterns = ?resolved, "adding file dependencies");
        self.file_deps.extend(resolved);
        self
    }

    /// Replace the file dependency patterns wholesale, as given.
    pub fn set_file_deps<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file_deps = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn dependencies(&self) -> &[StepId] {
        &self.depends_on
    }

    pub fn file_deps(&self) -> &[String] {
        &self.file_deps
    }

    pub(crate) fn push_dependency(&mut self, dep: StepId) {
        self.depends_on.push(dep);
    }

    pub(crate) fn replace_file_deps(&mut self, patterns: Vec<String>) {
        self.file_deps = patterns;
    }
}

fn resolve_pattern(pattern: &str) -> String {
    absolute_or_relative(std::path::Path::new(pattern))
        .to_string_lossy()
        .into_owned()
}
