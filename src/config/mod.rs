// src/config/mod.rs

//! Build file (`Stepwise.toml`) support.
//!
//! - [`model`] is the TOML-backed data model.
//! - [`loader`] reads a build file from disk.
//! - [`validate`] checks dependency names, cycles and commands.
//! - [`build`] turns a validated file into a [`crate::dag::StepGraph`].

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use build::{build_graph, StepIndex};
pub use loader::{config_root_dir, default_config_path, load_and_validate, load_from_path};
pub use model::{BuildFile, CommandConfig, ConfigSection, RawBuildFile, StepConfig};
