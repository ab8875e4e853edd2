// src/exec/output.rs

//! Where a process command's stdout / stderr go.

use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::info;

/// In-memory capture target shared between the command and its owner.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything captured so far.
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }

    fn append(&self, bytes: &[u8]) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(bytes);
    }
}

/// Output redirection for one stream of a child process.
#[derive(Debug, Clone, Default)]
pub enum OutputSink {
    /// Share the parent's stream.
    #[default]
    Inherit,
    /// Discard.
    Null,
    /// Forward each line to `tracing` at info level.
    Log,
    /// Capture into a [`SharedBuffer`].
    Buffer(SharedBuffer),
}

impl OutputSink {
    pub(crate) fn stdio(&self) -> Stdio {
        match self {
            OutputSink::Inherit => Stdio::inherit(),
            OutputSink::Null => Stdio::null(),
            OutputSink::Log | OutputSink::Buffer(_) => Stdio::piped(),
        }
    }

    /// Drain a piped stream into this sink on a background task.
    ///
    /// Returns `None` when there is nothing to drain.
    pub(crate) fn pump<R>(
        &self,
        stream: Option<R>,
        program: &str,
        name: &'static str,
    ) -> Option<JoinHandle<()>>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let stream = stream?;
        match self {
            OutputSink::Inherit | OutputSink::Null => None,
            OutputSink::Log => {
                let program = program.to_string();
                Some(tokio::spawn(async move {
                    let mut lines = BufReader::new(stream).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        info!(program = %program, stream = name, "{}", line);
                    }
                }))
            }
            OutputSink::Buffer(buffer) => {
                let buffer = buffer.clone();
                Some(tokio::spawn(async move {
                    let mut stream = stream;
                    let mut chunk = [0u8; 8192];
                    while let Ok(n) = stream.read(&mut chunk).await {
                        if n == 0 {
                            break;
                        }
                        buffer.append(&chunk[..n]);
                    }
                }))
            }
        }
    }
}
