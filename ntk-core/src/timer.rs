//! Timers keyed by callback identity.

use crate::alloc::IdAllocator;
use crate::error::{Result, ToolkitError};
use crate::handle::{CallbackId, TimerId};
use crate::platform::NativeBackend;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// A callback with a stable identity, used with
/// [Display::timer_exec](crate::display::Display::timer_exec).
///
/// Clones share the identity, so scheduling a clone replaces the pending
/// timer of the runnable it was cloned from.
#[derive(Clone)]
pub struct Runnable {
    id: CallbackId,
    callback: Rc<dyn Fn()>,
}

impl Runnable {
    /// Wrap `callback` with a fresh identity.
    pub fn new(callback: impl Fn() + 'static) -> Self {
        Self {
            id: CallbackId::next(),
            callback: Rc::new(callback),
        }
    }

    /// Wrap `callback` under an identity chosen by the caller.
    pub fn with_id(id: CallbackId, callback: impl Fn() + 'static) -> Self {
        Self {
            id,
            callback: Rc::new(callback),
        }
    }

    /// The identity of this runnable.
    pub fn id(&self) -> CallbackId {
        self.id
    }

    /// Invoke the callback.
    pub fn run(&self) {
        (self.callback)()
    }
}

impl fmt::Debug for Runnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Runnable").field(&self.id).finish()
    }
}

/// Maps callback identities to armed native timers.
///
/// At most one native timer is armed per callback identity. Each entry is
/// removed exactly once: when it fires, or when it is cancelled or replaced.
pub struct TimerManager {
    timers: IndexMap<TimerId, Runnable>,
    by_callback: HashMap<CallbackId, TimerId>,
    ids: IdAllocator,
}

impl TimerManager {
    /// Create an empty manager. Native timer ids start at 1.
    pub fn new() -> Self {
        Self {
            timers: IndexMap::new(),
            by_callback: HashMap::new(),
            ids: IdAllocator::new(1),
        }
    }

    /// Arm a one-shot timer for `runnable`, replacing any pending timer of the
    /// same identity.
    pub fn schedule(
        &mut self,
        delay: Duration,
        runnable: Runnable,
        backend: &mut dyn NativeBackend,
    ) -> Result<TimerId> {
        self.cancel(runnable.id(), backend);

        let id = self
            .ids
            .allocate()
            .and_then(|raw| u32::try_from(raw).ok())
            .map(TimerId)
            .ok_or(ToolkitError::NoMoreNativeResources("timer id"))?;

        if let Err(err) = backend.set_timer(id, delay) {
            self.ids.release(u64::from(id.0));
            return Err(match err {
                ToolkitError::NoMoreNativeResources(what) => ToolkitError::NoMoreNativeResources(what),
                other => {
                    log::warn!("Native timer registration failed: {}", other);
                    ToolkitError::NoMoreNativeResources("timer")
                },
            });
        }

        log::trace!("Armed {} for {:?} in {:?}", id, runnable.id(), delay);
        self.by_callback.insert(runnable.id(), id);
        self.timers.insert(id, runnable);
        Ok(id)
    }

    /// Disarm the pending timer of `callback`. Returns `true` if one was pending.
    pub fn cancel(&mut self, callback: CallbackId, backend: &mut dyn NativeBackend) -> bool {
        match self.by_callback.remove(&callback) {
            Some(id) => {
                self.timers.shift_remove(&id);
                self.disarm(id, backend);
                log::trace!("Cancelled {} for {:?}", id, callback);
                true
            },
            None => false,
        }
    }

    /// Take the callback of the fired timer `id`, disarming it.
    ///
    /// The caller invokes the returned runnable after releasing any borrow of
    /// the manager. Unknown ids (already cancelled) yield `None`.
    pub fn fire(&mut self, id: TimerId, backend: &mut dyn NativeBackend) -> Option<Runnable> {
        let runnable = self.timers.shift_remove(&id)?;
        self.by_callback.remove(&runnable.id());
        self.disarm(id, backend);
        Some(runnable)
    }

    fn disarm(&mut self, id: TimerId, backend: &mut dyn NativeBackend) {
        backend.kill_timer(id);
        self.ids.release(u64::from(id.0));
    }

    /// Returns `true` if a timer is pending for `callback`.
    pub fn is_pending(&self, callback: CallbackId) -> bool {
        self.by_callback.contains_key(&callback)
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Returns `true` if no timer is armed.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Disarm every timer without running it.
    pub fn kill_all(&mut self, backend: &mut dyn NativeBackend) {
        for id in self.timers.keys() {
            backend.kill_timer(*id);
        }
        self.timers.clear();
        self.by_callback.clear();
        self.ids.clear();
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}
