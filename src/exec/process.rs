// src/exec/process.rs

//! External process command.

use std::path::{Path, PathBuf};

use tokio::process::Command as TokioCommand;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{BuildError, Result};
use crate::exec::output::OutputSink;

/// Runs an external program and waits for it to exit.
///
/// Output goes to the configured sinks (inherited by default). A non-zero
/// exit status or a spawn failure is an error; cancellation kills the child.
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    stdout: OutputSink,
    stderr: OutputSink,
}

impl ProcessCommand {
    /// Build from a full argument vector: `args[0]` is the program.
    pub fn new<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);
        let program = args.next().ok_or(BuildError::EmptyArgs)?;

        Ok(Self {
            program,
            args: args.collect(),
            cwd: None,
            env: Vec::new(),
            stdout: OutputSink::default(),
            stderr: OutputSink::default(),
        })
    }

    /// Working directory for the child (defaults to the current one).
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Replace the program while keeping the arguments.
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdout(mut self, sink: OutputSink) -> Self {
        self.stdout = sink;
        self
    }

    pub fn stderr(mut self, sink: OutputSink) -> Self {
        self.stderr = sink;
        self
    }

    pub fn program_name(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Space-joined command line, for logs and dry runs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        debug!(
            program = %self.program,
            args = ?self.args,
            cwd = ?self.cwd,
            "starting process"
        );

        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args)
            .stdout(self.stdout.stdio())
            .stderr(self.stderr.stdio())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| BuildError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let pumps: Vec<_> = [
            self.stdout.pump(child.stdout.take(), &self.program, "stdout"),
            self.stderr.pump(child.stderr.take(), &self.program, "stderr"),
        ]
        .into_iter()
        .flatten()
        .collect();

        // Either the process exits on its own (normal case), or we receive a
        // cancellation request and kill it.
        tokio::select! {
            status_res = child.wait() => {
                let status = status_res.map_err(|source| BuildError::Spawn {
                    program: self.program.clone(),
                    source,
                })?;

                await_pumps(&self.program, pumps).await;

                info!(
                    program = %self.program,
                    exit_code = ?status.code(),
                    success = status.success(),
                    "process exited"
                );

                if status.success() {
                    Ok(())
                } else {
                    Err(BuildError::CommandFailed {
                        program: self.program.clone(),
                        code: status.code(),
                    })
                }
            }

            _ = cancel.cancelled() => {
                info!(program = %self.program, "cancellation requested; killing process");
                if let Err(e) = child.kill().await {
                    warn!(
                        program = %self.program,
                        error = %e,
                        "failed to kill child process on cancellation"
                    );
                }
                Err(BuildError::Cancelled)
            }
        }
    }
}

/// Wait for the output pumps so captured output is complete.
async fn await_pumps(program: &str, pumps: Vec<JoinHandle<()>>) {
    for pump in pumps {
        if let Err(e) = pump.await {
            warn!(program = %program, error = %e, "output capture task failed");
        }
    }
}
