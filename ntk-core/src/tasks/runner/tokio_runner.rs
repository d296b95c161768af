use crate::config::TasksConfig;
use crate::error::{Result, ToolkitError};
use std::future::Future;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinError;

/// A task runner using [tokio] as runtime.
#[derive(Debug)]
pub struct TokioRunner {
    rt: Runtime,
}

impl TokioRunner {
    /// Initializes the tokio task runner with the given config.
    pub(crate) fn new(config: TasksConfig) -> std::io::Result<Self> {
        let mut builder = if config.workers.get() == 1 {
            Builder::new_current_thread()
        } else {
            let mut builder = Builder::new_multi_thread();
            builder.worker_threads(config.workers.get());
            builder
        };

        let rt = builder
            .enable_all()
            .thread_name("ntk-task")
            .thread_stack_size(config.stack_size)
            .build()?;

        log::debug!("Tokio task runner started with {} worker(s)", config.workers);
        Ok(Self { rt })
    }

    /// Blocks on the given future.
    pub(crate) fn block_on<F>(&self, fut: F) -> F::Output
    where
        F: Future,
    {
        self.rt.block_on(fut)
    }

    /// Spawns the given future (fire-and-forget).
    pub(crate) fn spawn_detached<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        drop(self.rt.spawn(fut));
    }

    /// Spawns the given blocking function.
    pub(crate) async fn spawn_blocking<F, R>(&self, fut: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.rt
            .spawn_blocking(fut)
            .await
            .map_err(|err: JoinError| ToolkitError::ExecutionFailed(err.into()))
    }

    /// Stops the runtime without waiting for outstanding blocking work.
    pub(crate) fn shutdown(self) {
        self.rt.shutdown_background();
    }
}
