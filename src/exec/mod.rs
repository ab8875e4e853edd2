// src/exec/mod.rs

//! Command execution layer.
//!
//! A [`Command`] is one cancellable unit of work inside a step. The variants
//! share a single `run` entry point:
//!
//! - [`process`]: spawn an external program via `tokio::process`.
//! - [`toolchain`]: a process command whose argument list is assembled from a
//!   toolchain binary, subcommand, targets and extra arguments.
//! - [`function`]: a sequence of in-process async callables.
//! - [`output`]: stdout / stderr redirection for process commands.

pub mod function;
pub mod output;
pub mod process;
pub mod toolchain;

use tokio_util::sync::CancellationToken;

use crate::errors::Result;

pub use function::{func, sync_func, CommandFn, CommandFuture, FunctionCommand};
pub use output::{OutputSink, SharedBuffer};
pub use process::ProcessCommand;
pub use toolchain::{ToolchainCommand, ToolchainConfig};

#[derive(Debug, Clone)]
pub enum Command {
    Process(ProcessCommand),
    Toolchain(ToolchainCommand),
    Function(FunctionCommand),
}

impl Command {
    /// Run the command to completion, or until `cancel` fires for commands
    /// that observe it.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        match self {
            Command::Process(cmd) => cmd.run(cancel).await,
            Command::Toolchain(cmd) => cmd.run(cancel).await,
            Command::Function(cmd) => cmd.run(cancel).await,
        }
    }

    /// Short human-readable description for logs.
    pub fn describe(&self) -> String {
        match self {
            Command::Process(cmd) => cmd.command_line(),
            Command::Toolchain(cmd) => cmd.process().command_line(),
            Command::Function(cmd) => format!("<{} function(s)>", cmd.len()),
        }
    }
}

impl From<ProcessCommand> for Command {
    fn from(cmd: ProcessCommand) -> Self {
        Command::Process(cmd)
    }
}

impl From<ToolchainCommand> for Command {
    fn from(cmd: ToolchainCommand) -> Self {
        Command::Toolchain(cmd)
    }
}

impl From<FunctionCommand> for Command {
    fn from(cmd: FunctionCommand) -> Self {
        Command::Function(cmd)
    }
}
