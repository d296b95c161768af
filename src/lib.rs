#![warn(missing_docs)]

//! A native-backed widget toolkit core.
//!
//! Every UI thread owns one [Display](core::display::Display) that pumps
//! the native message queue. Other threads talk to it through a
//! [DisplayProxy](core::display::DisplayProxy).

pub use ntk_core as core;

/// A "prelude" for users of the ntk toolkit.
///
/// Importing this module brings into scope the most common types
/// needed to drive a display.
///
/// ```rust
/// use ntk::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::config::{BackendKind, DisplayConfig, DrainPolicy, SynchronizerConfig};
    pub use crate::core::display::{Display, DisplayProxy};
    pub use crate::core::error::{Result, ToolkitError};
    pub use crate::core::event::{Event, EventKind, Modifiers};
    pub use crate::core::handle::{CallbackId, NativeHandle};
    pub use crate::core::interceptor::{FnInterceptor, Flow, Interceptor};
    pub use crate::core::modal::ModalState;
    pub use crate::core::platform::{MessageKind, NativeMessage};
    pub use crate::core::timer::Runnable;
    pub use crate::core::widget::{Disposable, EventSource, HasNativeHandle, Widget, WidgetRef};
}
