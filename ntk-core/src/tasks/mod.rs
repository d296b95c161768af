//! An executor for running tasks in the background.
//!
//! Results of background work are handed back to the UI thread through
//! [DisplayProxy::spawn_then](crate::display::DisplayProxy::spawn_then).
use crate::config::TasksConfig;
use arc_swap::ArcSwap;
use runner::TaskRunner;
use std::future::Future;
use std::sync::{Arc, LazyLock};

/// An abstraction over a task runner.
pub mod runner;

static RUNNER: LazyLock<ArcSwap<TaskRunner>> =
    LazyLock::new(|| ArcSwap::new(Arc::new(TaskRunner::None)));

/// Initializes the task runner.
///
/// If the configured runner cannot be built, the fallback runner stays in place.
pub fn init(config: TasksConfig) {
    #[cfg(feature = "tokio-runner")]
    let runner = match runner::tokio_runner::TokioRunner::new(config) {
        Ok(runner) => TaskRunner::Tokio(runner),
        Err(err) => {
            log::error!("Failed to create tokio task runner: {}", err);
            TaskRunner::None
        },
    };
    #[cfg(not(feature = "tokio-runner"))]
    let runner = {
        log::debug!("No task runner feature enabled, ignoring {:?}", config);
        TaskRunner::None
    };
    RUNNER.store(Arc::new(runner));
}

/// Spawns the given future (fire-and-forget).
pub fn spawn<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let runner = RUNNER.load().clone();
    runner.spawn_detached(fut);
}

/// Blocks on the given future.
pub fn block_on<F>(fut: F) -> F::Output
where
    F: Future,
{
    RUNNER.load().block_on(fut)
}

/// Spawns the given blocking function.
pub fn spawn_blocking<F, R>(fut: F) -> impl Future<Output = crate::error::Result<R>>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let runner = RUNNER.load().clone();
    async move { runner.spawn_blocking(fut).await }
}

/// Shuts down the task runner gracefully.
///
/// Called by the runtime when the last display is disposed.
pub fn shutdown() {
    log::debug!("Shutting down task runner...");

    let current_runner = RUNNER.swap(Arc::new(TaskRunner::None));

    match Arc::try_unwrap(current_runner) {
        Ok(runner) => runner.shutdown(),
        Err(_) => {
            log::warn!("Could not shutdown task runner - still has active references");
        },
    }
}
