// src/dag/mod.rs

//! Steps, the dependency graph, and the two ways of running it.
//!
//! - [`step`] defines a build step and its handle.
//! - [`graph`] stores steps and dependency edges, plus per-run state.
//! - [`cycle`] rejects cyclic dependencies before anything executes.
//! - [`freshness`] decides whether a step's files changed.
//! - [`executor`] runs a target and its dependencies one step at a time.
//! - [`scheduler`] runs independent steps concurrently.

pub mod cycle;
pub mod executor;
pub mod freshness;
pub mod graph;
pub mod scheduler;
pub mod step;

pub use executor::{Executor, StepOutcome};
pub use graph::{StepGraph, StepState};
pub use scheduler::Scheduler;
pub use step::{Step, StepId};
