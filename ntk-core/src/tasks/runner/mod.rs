//! Task runner implementations.
#[cfg(feature = "tokio-runner")]
use self::tokio_runner::TokioRunner;
use crate::error::Result;
use std::future::Future;

#[cfg(feature = "tokio-runner")]
pub mod tokio_runner;

/// An abstraction over a task runner.
#[derive(Debug)]
pub enum TaskRunner {
    /// The tokio task runner.
    #[cfg(feature = "tokio-runner")]
    Tokio(TokioRunner),
    /// No task runner selected. Work goes to smol's global executor.
    None,
}

impl TaskRunner {
    /// Blocks on the given future.
    pub fn block_on<F>(&self, fut: F) -> F::Output
    where
        F: Future,
    {
        match self {
            #[cfg(feature = "tokio-runner")]
            TaskRunner::Tokio(runner) => runner.block_on(fut),
            TaskRunner::None => pollster::block_on(fut),
        }
    }

    /// Spawns the given future (fire-and-forget).
    pub fn spawn_detached<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self {
            #[cfg(feature = "tokio-runner")]
            TaskRunner::Tokio(runner) => runner.spawn_detached(fut),
            TaskRunner::None => smol::spawn(fut).detach(),
        }
    }

    /// Spawns the given blocking function.
    pub async fn spawn_blocking<F, R>(&self, fut: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        match self {
            #[cfg(feature = "tokio-runner")]
            TaskRunner::Tokio(runner) => runner.spawn_blocking(fut).await,
            TaskRunner::None => Ok(smol::unblock(fut).await),
        }
    }

    /// Consumes the runner and stops its worker threads.
    pub fn shutdown(self) {
        match self {
            #[cfg(feature = "tokio-runner")]
            TaskRunner::Tokio(runner) => runner.shutdown(),
            TaskRunner::None => {},
        }
    }
}
