use crate::display::DisplayProxy;
use crate::error::{Result, ToolkitError};
use crate::event::Event;
use crate::handle::NativeHandle;
use crate::platform::MessageKind;
use std::rc::Rc;

/// A shared reference to a widget.
///
/// Widgets live on the UI thread and are shared between the application, the
/// display's registry (as a weak reference) and queued events.
pub type WidgetRef = Rc<dyn Widget>;

/// Anything backed by a native window or control.
pub trait HasNativeHandle {
    /// The native handle. Returns [NativeHandle::NULL] once the native peer is gone.
    fn native_handle(&self) -> NativeHandle;
}

/// Lifecycle of a widget.
pub trait Disposable {
    /// Returns `true` once [Disposable::dispose] has run.
    fn is_disposed(&self) -> bool;

    /// Destroy the widget and its native peer. Must be idempotent.
    fn dispose(&self);
}

/// Receives semantic events and raw native messages routed to it.
pub trait EventSource {
    /// Deliver a semantic event to the widget's listeners.
    fn handle_event(&self, event: &mut Event);

    /// Handle a raw native message addressed to this widget.
    ///
    /// Return `Some(result)` to consume the message. `None` (the default) lets
    /// the backend's default procedure handle it.
    fn handle_message(&self, _kind: &MessageKind) -> Option<isize> {
        None
    }
}

/// Widgets that remember which display they belong to.
pub trait ThreadAffine: Disposable {
    /// The proxy of the owning display.
    fn display(&self) -> &DisplayProxy;

    /// Fails with [ToolkitError::ThreadAccessViolation] off the UI thread,
    /// [ToolkitError::DeviceDisposed] if the display is gone and
    /// [ToolkitError::WidgetDisposed] if the widget is.
    fn check_widget(&self) -> Result<()> {
        self.display().check_device()?;
        if self.is_disposed() {
            return Err(ToolkitError::WidgetDisposed);
        }
        Ok(())
    }
}

/// The base trait for everything the display can route messages to.
///
/// A widget registers its native handle with
/// [Display::register_handle](crate::display::Display::register_handle) after
/// creating its native peer and deregisters it when disposed. The display
/// never owns widgets; it keeps weak references only.
///
/// ```rust,no_run
/// use ntk_core::event::Event;
/// use ntk_core::handle::NativeHandle;
/// use ntk_core::widget::{Disposable, EventSource, HasNativeHandle, Widget};
/// use std::cell::Cell;
///
/// struct Label {
///     handle: NativeHandle,
///     disposed: Cell<bool>,
/// }
///
/// impl HasNativeHandle for Label {
///     fn native_handle(&self) -> NativeHandle {
///         self.handle
///     }
/// }
///
/// impl Disposable for Label {
///     fn is_disposed(&self) -> bool {
///         self.disposed.get()
///     }
///
///     fn dispose(&self) {
///         self.disposed.set(true);
///     }
/// }
///
/// impl EventSource for Label {
///     fn handle_event(&self, event: &mut Event) {
///         println!("label got {:?}", event.kind);
///     }
/// }
///
/// impl Widget for Label {}
/// ```
pub trait Widget: HasNativeHandle + Disposable + EventSource {
    /// The parent widget, if any. Top-level shells have none.
    fn parent(&self) -> Option<WidgetRef> {
        None
    }

    /// Returns `true` for top-level shells.
    fn is_top_level(&self) -> bool {
        self.parent().is_none()
    }

    /// Called by the modal stack when the widget may or may not receive input.
    fn set_input_enabled(&self, _enabled: bool) {}
}

/// Returns `true` if `ancestor` is `widget` or one of its parents.
pub fn is_ancestor_or_self(ancestor: &WidgetRef, widget: &WidgetRef) -> bool {
    let mut current = Some(widget.clone());
    while let Some(w) = current {
        if Rc::ptr_eq(&w, ancestor) {
            return true;
        }
        current = w.parent();
    }
    false
}

