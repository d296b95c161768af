//! Native backend abstraction.
//!
//! The display drives a [NativeBackend] for everything that touches the
//! operating system: the message queue, timers, window class and callback
//! registrations and the native parent chain.

use crate::error::Result;
use crate::event::Modifiers;
use crate::handle::{NativeHandle, TimerId};
use std::sync::Arc;
use std::time::Duration;

/// In-process backend used by tests and headless applications.
pub mod headless;

/// Backend driving a winit event loop.
#[cfg(feature = "winit")]
pub mod winit;

pub use headless::{HeadlessBackend, HeadlessPoster};
#[cfg(feature = "winit")]
pub use self::winit::WinitBackend;

/// A raw message taken from the native queue.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeMessage {
    /// The null message posted by [Waker::wake]. Never dispatched to a widget.
    Wake,
    /// The application asked the event loop to quit.
    Quit,
    /// A native timer elapsed.
    Timer(TimerId),
    /// A message addressed to a native window or control.
    Window {
        /// Target of the message.
        handle: NativeHandle,
        /// Message payload.
        kind: MessageKind,
    },
}

/// Payload of a window message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    /// The user asked to close the window.
    Close,
    /// The native window was destroyed.
    Destroy,
    /// The window was activated (`true`) or deactivated.
    Activate(bool),
    /// The window gained (`true`) or lost keyboard focus.
    Focus(bool),
    /// The client area was resized.
    Resize {
        /// New width in physical pixels.
        width: u32,
        /// New height in physical pixels.
        height: u32,
    },
    /// The window was moved.
    Move {
        /// New x position.
        x: i32,
        /// New y position.
        y: i32,
    },
    /// A key was pressed or released.
    Key {
        /// Native key code.
        code: u32,
        /// `true` on press.
        pressed: bool,
        /// Modifier state.
        modifiers: Modifiers,
    },
    /// A translated character.
    Char(char),
    /// A mouse button was pressed or released.
    MouseButton {
        /// Button number, 1-based.
        button: u32,
        /// `true` on press.
        pressed: bool,
        /// Pointer x.
        x: i32,
        /// Pointer y.
        y: i32,
    },
    /// The pointer moved.
    MouseMove {
        /// Pointer x.
        x: i32,
        /// Pointer y.
        y: i32,
    },
    /// The window needs repainting.
    Paint,
    /// Application or backend specific message.
    Custom {
        /// Message id.
        id: u32,
        /// Message parameter.
        param: isize,
    },
}

/// Wakes the UI thread of a display from any thread.
pub trait Waker: Send + Sync {
    /// Post the wake message to the UI thread's native queue.
    fn wake(&self);
}

/// Operations the display consumes from the native system.
///
/// A backend is created on the UI thread and only ever used there. The
/// [Waker] it hands out is the only part other threads see.
pub trait NativeBackend {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// Remove and return one pending message without blocking.
    fn next_message(&mut self) -> Option<NativeMessage>;

    /// Translate a message before it is routed (e.g. key to character).
    ///
    /// Backends may queue derived messages, which are returned by later
    /// calls to [NativeBackend::next_message].
    fn translate_message(&mut self, _message: &NativeMessage) {}

    /// The result of a window message nobody consumed.
    fn default_procedure(&mut self, _handle: NativeHandle, _kind: &MessageKind) -> isize {
        0
    }

    /// Block until a message is available.
    fn wait_message(&mut self) -> Result<()>;

    /// A waker that may be sent to other threads.
    fn waker(&self) -> Arc<dyn Waker>;

    /// Arm the native one-shot timer `id`. Re-arming an armed id restarts it.
    fn set_timer(&mut self, id: TimerId, delay: Duration) -> Result<()>;

    /// Disarm the native timer `id`. Unknown ids are ignored.
    fn kill_timer(&mut self, id: TimerId);

    /// Register the display's native window class.
    fn register_window_class(&mut self, name: &str) -> Result<()>;

    /// Unregister a window class registered with [NativeBackend::register_window_class].
    fn unregister_window_class(&mut self, name: &str);

    /// Install a named native callback trampoline.
    fn install_trampoline(&mut self, name: &'static str) -> Result<()>;

    /// Remove a trampoline installed with [NativeBackend::install_trampoline].
    fn remove_trampoline(&mut self, name: &'static str);

    /// The native parent of `handle`, or [NativeHandle::NULL] at the root.
    fn parent_of(&self, _handle: NativeHandle) -> NativeHandle {
        NativeHandle::NULL
    }
}
