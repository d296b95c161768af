use std::num::NonZeroUsize;

/// ntk Display Configuration Structure.
#[derive(Clone, Debug)]
pub struct DisplayConfig {
    /// The application name. Used to build the native window class name.
    pub app_name: String,
    /// The native backend driving the display.
    pub backend: BackendKind,
    /// Synchronizer configuration.
    pub synchronizer: SynchronizerConfig,
    /// Disposal configuration.
    pub dispose: DisposeConfig,
    /// Task Runner Configuration. If [None] (default), the task runner won't be enabled.
    pub tasks: Option<TasksConfig>,
    /// Resource limits of the headless backend.
    pub headless: HeadlessConfig,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            app_name: "ntk".to_string(),
            backend: BackendKind::from_env(),
            synchronizer: SynchronizerConfig::from_env(),
            dispose: DisposeConfig::default(),
            tasks: None,
            headless: HeadlessConfig::default(),
        }
    }
}

impl DisplayConfig {
    /// A configuration using the headless backend regardless of the environment.
    pub fn headless() -> Self {
        Self {
            backend: BackendKind::Headless,
            ..Self::default()
        }
    }
}

/// The native backend to create for a display.
///
/// Can be configured via the `NTK_BACKEND` environment variable:
/// - `headless` (default) - in-process message queue, no windows on screen
/// - `winit` - winit event loop (requires the `winit` feature)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// The in-process headless backend.
    #[default]
    Headless,
    /// The winit backend.
    #[cfg(feature = "winit")]
    Winit,
}

impl BackendKind {
    /// Parse the backend from the `NTK_BACKEND` environment variable.
    pub fn from_env() -> Self {
        match std::env::var("NTK_BACKEND") {
            Ok(val) => {
                let val_lower = val.to_lowercase();
                match val_lower.as_str() {
                    "headless" | "" => BackendKind::Headless,
                    #[cfg(feature = "winit")]
                    "winit" => {
                        log::info!("NTK_BACKEND=winit detected; using the winit backend");
                        BackendKind::Winit
                    },
                    other => {
                        log::warn!("Unknown backend '{}'; falling back to headless", other);
                        BackendKind::Headless
                    },
                }
            },
            Err(_) => BackendKind::default(),
        }
    }
}

/// Synchronizer configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SynchronizerConfig {
    /// How many queued items a single drain pass runs.
    ///
    /// Can be configured via the `NTK_SYNC_DRAIN` environment variable
    /// (`snapshot` or `single`).
    pub drain: DrainPolicy,
}

impl SynchronizerConfig {
    /// Read the drain policy from the environment.
    pub fn from_env() -> Self {
        Self {
            drain: DrainPolicy::from_env(),
        }
    }
}

/// How many queued items one call to
/// [Synchronizer::run_async_messages](crate::synchronizer::Synchronizer::run_async_messages) runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DrainPolicy {
    /// Run every item that was queued when the pass started. Items queued by
    /// those items wait for the next pass.
    #[default]
    Snapshot,
    /// Run exactly one item per pass.
    Single,
}

impl DrainPolicy {
    /// Parse the policy from the `NTK_SYNC_DRAIN` environment variable.
    pub fn from_env() -> Self {
        match std::env::var("NTK_SYNC_DRAIN") {
            Ok(val) => match val.to_lowercase().as_str() {
                "single" => {
                    log::info!("NTK_SYNC_DRAIN=single detected; running one item per pass");
                    DrainPolicy::Single
                },
                "snapshot" | "" => DrainPolicy::Snapshot,
                other => {
                    log::warn!("Unknown drain policy '{}'; using snapshot", other);
                    DrainPolicy::Snapshot
                },
            },
            Err(_) => DrainPolicy::default(),
        }
    }
}

/// Disposal configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisposeConfig {
    /// Upper bound on pump iterations while draining native messages and
    /// deferred events during disposal.
    pub max_drain_iterations: usize,
}

impl Default for DisposeConfig {
    fn default() -> Self {
        Self {
            max_drain_iterations: 1024,
        }
    }
}

/// Resource limits of the [HeadlessBackend](crate::platform::headless::HeadlessBackend).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeadlessConfig {
    /// Maximum number of simultaneously armed timers.
    pub max_timers: usize,
    /// Maximum number of registered window classes.
    pub max_window_classes: usize,
    /// Maximum number of installed callback trampolines.
    pub max_trampolines: usize,
    /// Maximum number of live windows.
    pub max_windows: usize,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            max_timers: 1024,
            max_window_classes: 64,
            max_trampolines: 64,
            max_windows: 10_000,
        }
    }
}

/// Configuration structure for the integrated [TaskRunner](crate::tasks::runner::TaskRunner).
///
/// Background tasks spawned through [DisplayProxy::spawn_then](crate::display::DisplayProxy::spawn_then)
/// run here and deliver their results on the UI thread.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TasksConfig {
    /// The stack size of each thread of the task runner thread pool. Defaults to 1 MB.
    pub stack_size: usize,
    /// The amount of worker threads of the task runner thread pool. Defaults to half of the available threads.
    pub workers: NonZeroUsize,
}

impl Default for TasksConfig {
    fn default() -> Self {
        let available = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self {
            stack_size: 1024 * 1024, // 1 MB
            workers: NonZeroUsize::new(available / 2).unwrap_or(NonZeroUsize::MIN),
        }
    }
}
