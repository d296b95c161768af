#![warn(missing_docs)]

//! Core display and event-loop engine for ntk => See `ntk` crate.
//!
//! Contains the [Display](display::Display), the native backend
//! abstraction and the cross-thread work queue.

/// Contains useful types for interacting with winit.
#[cfg(feature = "winit")]
pub mod window {
    pub use winit::event::*;
    pub use winit::event_loop::*;
    pub use winit::keyboard::*;
    pub use winit::window::*;
}

/// Contains the [Display](display::Display) and its thread-safe [DisplayProxy](display::DisplayProxy).
pub mod display;

/// Contains the [DisplayConfig](config::DisplayConfig) struct.
pub mod config;

/// Contains the toolkit error type.
pub mod error;

/// Contains native handle and identifier types.
pub mod handle;

/// Contains the native backend abstraction and its implementations.
pub mod platform;

/// Contains the widget traits the display routes to.
pub mod widget;

/// Contains semantic events and listener tables.
pub mod event;

/// Contains the cross-thread work queue.
pub mod synchronizer;

/// Contains the handle to widget registry.
pub mod registry;

/// Contains one-shot timers.
pub mod timer;

/// Contains the posted event queue.
pub mod deferred;

/// Contains the modal shell stack.
pub mod modal;

/// Contains per-handle message interceptors.
pub mod interceptor;

/// Contains the process-wide display registry.
pub mod runtime;

/// Contains the task runner and utilities for running async
pub mod tasks;

/// Contains the lowest-free-slot id allocator.
pub mod alloc;
