//! Native handle to widget lookup.

use crate::error::{Result, ToolkitError};
use crate::handle::NativeHandle;
use crate::widget::{Widget, WidgetRef};
use indexmap::IndexMap;
use std::rc::{Rc, Weak};

/// Maps native handles to the widgets that own them.
///
/// The registry holds weak references. A widget that is dropped without
/// deregistering simply stops being found.
#[derive(Default)]
pub struct HandleRegistry {
    entries: IndexMap<NativeHandle, Weak<dyn Widget>>,
}

impl HandleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handle` to `widget`.
    ///
    /// Re-registering the same widget is a no-op. Binding a handle that
    /// belongs to a different live widget fails with
    /// [ToolkitError::HandleCollision]. An entry whose widget was dropped is
    /// replaced.
    pub fn register(&mut self, handle: NativeHandle, widget: &WidgetRef) -> Result<()> {
        if handle.is_null() {
            return Err(ToolkitError::NullHandle);
        }

        if let Some(existing) = self.entries.get(&handle).and_then(Weak::upgrade) {
            if Rc::ptr_eq(&existing, widget) {
                return Ok(());
            }
            return Err(ToolkitError::HandleCollision { handle });
        }

        log::trace!("Registering handle {}", handle);
        self.entries.insert(handle, Rc::downgrade(widget));
        Ok(())
    }

    /// Remove the binding for `handle`. Returns the widget if it was still alive.
    pub fn deregister(&mut self, handle: NativeHandle) -> Option<WidgetRef> {
        log::trace!("Deregistering handle {}", handle);
        self.entries.shift_remove(&handle).and_then(|w| w.upgrade())
    }

    /// Exact lookup.
    pub fn lookup(&self, handle: NativeHandle) -> Option<WidgetRef> {
        if handle.is_null() {
            return None;
        }
        self.entries.get(&handle).and_then(Weak::upgrade)
    }

    /// Find the widget owning `handle` or, failing that, its closest
    /// registered native ancestor. `parent_of` yields the native parent of a
    /// handle, [NativeHandle::NULL] at the root.
    pub fn find_ancestor(
        &self,
        handle: NativeHandle,
        parent_of: impl Fn(NativeHandle) -> NativeHandle,
    ) -> Option<WidgetRef> {
        let mut current = handle;
        // Bounded in case a broken parent chain cycles.
        for _ in 0..=self.entries.len().max(64) {
            if current.is_null() {
                return None;
            }
            if let Some(widget) = self.lookup(current) {
                return Some(widget);
            }
            current = parent_of(current);
        }
        log::warn!("Parent chain of {} did not terminate", handle);
        None
    }

    /// Returns `true` if `handle` is bound.
    pub fn contains(&self, handle: NativeHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Live top-level widgets in registration order. Dead entries are pruned.
    pub fn top_level(&mut self) -> Vec<WidgetRef> {
        self.entries.retain(|_, w| w.strong_count() > 0);
        self.entries
            .values()
            .filter_map(Weak::upgrade)
            .filter(|w| w.is_top_level() && !w.is_disposed())
            .collect()
    }

    /// Number of entries, live or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
