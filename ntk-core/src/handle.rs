//! Opaque identifiers shared between the engine and the native backend.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque OS-assigned identifier for a window or control.
///
/// The value `0` is the null handle and is never registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NativeHandle(pub u64);

impl NativeHandle {
    /// The null handle.
    pub const NULL: NativeHandle = NativeHandle(0);

    /// Returns `true` for the null handle.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Identifier of a native timer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u32);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Logical identity of a timer callback.
///
/// At most one timer is pending per callback id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(pub u64);

static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(1);

impl CallbackId {
    /// Allocates a process-unique callback id.
    pub fn next() -> Self {
        Self(NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed))
    }
}
