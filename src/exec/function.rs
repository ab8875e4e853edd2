// src/exec/function.rs

//! In-process function command.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::errors::{BuildError, Result};

pub type CommandFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// One fallible in-process callable.
///
/// It receives the run's cancellation token; honouring it is up to the
/// callable.
pub type CommandFn = Arc<dyn Fn(CancellationToken) -> CommandFuture + Send + Sync>;

/// Wrap an async closure as a [`CommandFn`].
pub fn func<F, Fut>(f: F) -> CommandFn
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |cancel| Box::pin(f(cancel)))
}

/// Wrap a plain closure as a [`CommandFn`].
pub fn sync_func<F>(f: F) -> CommandFn
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(move |_cancel| {
        let res = f();
        Box::pin(async move { res })
    })
}

/// Ordered sequence of callables; the first failure stops the sequence.
#[derive(Clone)]
pub struct FunctionCommand {
    funcs: Vec<CommandFn>,
}

impl fmt::Debug for FunctionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCommand")
            .field("funcs", &self.funcs.len())
            .finish()
    }
}

impl FunctionCommand {
    pub fn new(funcs: Vec<CommandFn>) -> Result<Self> {
        if funcs.is_empty() {
            return Err(BuildError::EmptyFunctions);
        }
        Ok(Self { funcs })
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        for (index, f) in self.funcs.iter().enumerate() {
            if let Err(source) = f(cancel.clone()).await {
                error!(index, error = %source, "function command failed");
                return Err(BuildError::Function { index, source });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recorder(log: &Arc<Mutex<Vec<usize>>>, id: usize, fail: bool) -> CommandFn {
        let log = Arc::clone(log);
        sync_func(move || {
            log.lock().unwrap().push(id);
            if fail {
                anyhow::bail!("function {id} failed");
            }
            Ok(())
        })
    }

    #[test]
    fn requires_at_least_one_function() {
        assert!(matches!(
            FunctionCommand::new(vec![]),
            Err(BuildError::EmptyFunctions)
        ));
    }

    #[tokio::test]
    async fn runs_all_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let cmd = FunctionCommand::new(vec![
            recorder(&log, 0, false),
            recorder(&log, 1, false),
            recorder(&log, 2, false),
        ])
        .unwrap();

        cmd.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn first_failure_stops_the_sequence() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let cmd = FunctionCommand::new(vec![
            recorder(&log, 0, false),
            recorder(&log, 1, true),
            recorder(&log, 2, false),
        ])
        .unwrap();

        let err = cmd.run(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BuildError::Function { index: 1, .. }));
        assert_eq!(*log.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn async_functions_see_the_token() {
        let cmd = FunctionCommand::new(vec![func(|cancel: CancellationToken| async move {
            anyhow::ensure!(cancel.is_cancelled(), "expected a cancelled token");
            Ok(())
        })])
        .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        cmd.run(&cancel).await.unwrap();
    }
}
