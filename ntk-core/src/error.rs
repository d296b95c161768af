//! Toolkit errors.

use crate::handle::NativeHandle;
use thiserror::Error;

/// Errors raised by the display engine and the widget layer built on top of it.
#[derive(Debug, Error)]
pub enum ToolkitError {
    /// A UI-affine operation was invoked from a thread other than the display's owning thread.
    #[error("Invalid thread access: operation must run on the display's UI thread")]
    ThreadAccessViolation,

    /// The display (or an entity it owns) has been disposed.
    #[error("Device is disposed")]
    DeviceDisposed,

    /// The widget has been disposed.
    #[error("Widget is disposed")]
    WidgetDisposed,

    /// A unit of work submitted through `sync_exec` failed on the UI thread.
    #[error("Failed to execute runnable: {0}")]
    ExecutionFailed(#[source] anyhow::Error),

    /// A native registration (window class, callback trampoline, timer) failed.
    #[error("No more native resources: {0}")]
    NoMoreNativeResources(&'static str),

    /// A native handle is already registered to a different widget.
    #[error("Native handle {handle} is already registered to another widget")]
    HandleCollision {
        /// The colliding handle.
        handle: NativeHandle,
    },

    /// The null native handle was passed where a live handle is required.
    #[error("Null native handle")]
    NullHandle,

    /// A bounded `sync_exec` wait elapsed before the UI thread ran the work.
    #[error("Timed out waiting for the UI thread")]
    Timeout,

    /// The native backend reported a failure.
    #[error("Native backend error: {0}")]
    Backend(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ToolkitError>;
