//! Process-wide toolkit runtime.
//!
//! Tracks the live displays (at most one per thread), the default display
//! and the process-wide services that come and go with them: the task
//! runner is started with the first display and shut down with the last.

use crate::config::TasksConfig;
use crate::display::DisplayProxy;
use crate::error::{Result, ToolkitError};
use indexmap::IndexMap;
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::thread::ThreadId;

#[derive(Default)]
struct Runtime {
    displays: IndexMap<ThreadId, DisplayProxy>,
    default: Option<DisplayProxy>,
    tasks_started: bool,
    next_class: u64,
}

static RUNTIME: LazyLock<Mutex<Runtime>> = LazyLock::new(|| Mutex::new(Runtime::default()));

fn runtime() -> MutexGuard<'static, Runtime> {
    RUNTIME.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Add a display to the runtime.
///
/// Fails with [ToolkitError::ThreadAccessViolation] if its thread already
/// owns a live display.
pub(crate) fn register(proxy: &DisplayProxy, tasks: Option<TasksConfig>) -> Result<()> {
    let mut rt = runtime();
    let thread = proxy.thread();

    if let Some(existing) = rt.displays.get(&thread) {
        if !existing.is_disposed() {
            return Err(ToolkitError::ThreadAccessViolation);
        }
    }
    rt.displays.retain(|_, d| !d.is_disposed());

    if rt.displays.is_empty() {
        log::info!("Initializing toolkit runtime");
        if let Some(tasks) = tasks {
            log::info!("initializing task runner");
            crate::tasks::init(tasks);
            rt.tasks_started = true;
        }
    }

    rt.displays.insert(thread, proxy.clone());
    if rt.default.as_ref().map_or(true, DisplayProxy::is_disposed) {
        log::debug!("Display {} is the default display", proxy.id());
        rt.default = Some(proxy.clone());
    }
    Ok(())
}

/// Remove a display. Tears the runtime down when it was the last one.
pub(crate) fn deregister(proxy: &DisplayProxy) {
    let mut rt = runtime();
    let thread = proxy.thread();

    if rt.displays.get(&thread).is_some_and(|d| d.id() == proxy.id()) {
        rt.displays.shift_remove(&thread);
    }
    if rt.default.as_ref().is_some_and(|d| d.id() == proxy.id()) {
        rt.default = None;
    }

    if rt.displays.is_empty() {
        if rt.tasks_started {
            rt.tasks_started = false;
            crate::tasks::shutdown();
        }
        log::info!("Toolkit runtime torn down");
    }
}

/// The live display owned by `thread`.
pub fn find(thread: ThreadId) -> Option<DisplayProxy> {
    runtime()
        .displays
        .get(&thread)
        .filter(|d| !d.is_disposed())
        .cloned()
}

/// The default display: the first display created that is still alive.
pub fn default_proxy() -> Option<DisplayProxy> {
    runtime().default.clone().filter(|d| !d.is_disposed())
}

/// Number of live displays in the process.
pub fn live_displays() -> usize {
    runtime().displays.values().filter(|d| !d.is_disposed()).count()
}

/// A process-unique window class suffix.
pub(crate) fn next_class_id() -> u64 {
    let mut rt = runtime();
    let id = rt.next_class;
    rt.next_class += 1;
    id
}
