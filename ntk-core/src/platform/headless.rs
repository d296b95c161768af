use super::{MessageKind, NativeBackend, NativeMessage, Waker};
use crate::alloc::IdAllocator;
use crate::config::HeadlessConfig;
use crate::error::{Result, ToolkitError};
use crate::handle::{NativeHandle, TimerId};
use indexmap::{IndexMap, IndexSet};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const FIRST_WINDOW_HANDLE: u64 = 0x100;

#[derive(Default)]
struct Queue {
    messages: VecDeque<NativeMessage>,
    wake_pending: bool,
}

struct Timer {
    deadline: Instant,
    period: Duration,
}

struct State {
    timers: IndexMap<TimerId, Timer>,
    classes: IndexSet<String>,
    trampolines: IndexSet<&'static str>,
    windows: IndexMap<NativeHandle, NativeHandle>,
    handles: IdAllocator,
}

struct Shared {
    queue: Mutex<Queue>,
    ready: Condvar,
    state: Mutex<State>,
    config: HeadlessConfig,
}

impl Shared {
    fn post(&self, message: NativeMessage) {
        let mut queue = lock(&self.queue);
        if message == NativeMessage::Wake {
            if queue.wake_pending {
                return;
            }
            queue.wake_pending = true;
        }
        queue.messages.push_back(message);
        self.ready.notify_all();
    }
}

/// An in-process native backend.
///
/// Messages live in a queue guarded by a mutex and condition variable.
/// Timers are deadlines that behave like periodic native timers: an armed
/// timer keeps producing [NativeMessage::Timer] until it is killed. Timer
/// messages are only produced when no posted message is waiting.
pub struct HeadlessBackend {
    shared: Arc<Shared>,
}

impl HeadlessBackend {
    /// Create a backend with the given resource limits.
    pub fn new(config: HeadlessConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue::default()),
                ready: Condvar::new(),
                state: Mutex::new(State {
                    timers: IndexMap::new(),
                    classes: IndexSet::new(),
                    trampolines: IndexSet::new(),
                    windows: IndexMap::new(),
                    handles: IdAllocator::with_limit(FIRST_WINDOW_HANDLE, config.max_windows),
                }),
                config,
            }),
        }
    }

    /// A handle for injecting messages and inspecting native state from any thread.
    pub fn poster(&self) -> HeadlessPoster {
        HeadlessPoster {
            shared: self.shared.clone(),
        }
    }

    fn due_timer(&self) -> Option<NativeMessage> {
        let now = Instant::now();
        let mut state = lock(&self.shared.state);
        let (id, timer) = state
            .timers
            .iter_mut()
            .filter(|(_, t)| t.deadline <= now)
            .min_by_key(|(_, t)| t.deadline)?;
        timer.deadline = now + timer.period;
        Some(NativeMessage::Timer(*id))
    }

    fn next_deadline(&self) -> Option<Instant> {
        lock(&self.shared.state).timers.values().map(|t| t.deadline).min()
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(HeadlessConfig::default())
    }
}

impl NativeBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn next_message(&mut self) -> Option<NativeMessage> {
        {
            let mut queue = lock(&self.shared.queue);
            if let Some(message) = queue.messages.pop_front() {
                if message == NativeMessage::Wake {
                    queue.wake_pending = false;
                }
                return Some(message);
            }
        }
        self.due_timer()
    }

    fn translate_message(&mut self, message: &NativeMessage) {
        if let NativeMessage::Window {
            handle,
            kind: MessageKind::Key {
                code,
                pressed: true,
                ..
            },
        } = message
        {
            if let Some(c) = char::from_u32(*code).filter(|c| !c.is_control()) {
                self.shared.post(NativeMessage::Window {
                    handle: *handle,
                    kind: MessageKind::Char(c),
                });
            }
        }
    }

    fn default_procedure(&mut self, handle: NativeHandle, kind: &MessageKind) -> isize {
        if *kind == MessageKind::Close {
            self.poster().destroy_window(handle);
        }
        0
    }

    fn wait_message(&mut self) -> Result<()> {
        let mut queue = lock(&self.shared.queue);
        loop {
            if !queue.messages.is_empty() {
                return Ok(());
            }
            match self.next_deadline() {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline <= now {
                        return Ok(());
                    }
                    queue = self
                        .shared
                        .ready
                        .wait_timeout(queue, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                },
                None => {
                    queue = self
                        .shared
                        .ready
                        .wait(queue)
                        .unwrap_or_else(PoisonError::into_inner);
                },
            }
        }
    }

    fn waker(&self) -> Arc<dyn Waker> {
        Arc::new(self.poster())
    }

    fn set_timer(&mut self, id: TimerId, delay: Duration) -> Result<()> {
        let mut state = lock(&self.shared.state);
        if !state.timers.contains_key(&id) && state.timers.len() >= self.shared.config.max_timers {
            return Err(ToolkitError::NoMoreNativeResources("timer"));
        }
        state.timers.insert(
            id,
            Timer {
                deadline: Instant::now() + delay,
                period: delay.max(Duration::from_millis(1)),
            },
        );
        Ok(())
    }

    fn kill_timer(&mut self, id: TimerId) {
        lock(&self.shared.state).timers.shift_remove(&id);
    }

    fn register_window_class(&mut self, name: &str) -> Result<()> {
        let mut state = lock(&self.shared.state);
        if state.classes.len() >= self.shared.config.max_window_classes {
            return Err(ToolkitError::NoMoreNativeResources("window class"));
        }
        if !state.classes.insert(name.to_string()) {
            return Err(ToolkitError::Backend(format!(
                "window class {} is already registered",
                name
            )));
        }
        Ok(())
    }

    fn unregister_window_class(&mut self, name: &str) {
        lock(&self.shared.state).classes.shift_remove(name);
    }

    fn install_trampoline(&mut self, name: &'static str) -> Result<()> {
        let mut state = lock(&self.shared.state);
        if state.trampolines.contains(name) {
            return Ok(());
        }
        if state.trampolines.len() >= self.shared.config.max_trampolines {
            return Err(ToolkitError::NoMoreNativeResources("callback trampoline"));
        }
        state.trampolines.insert(name);
        Ok(())
    }

    fn remove_trampoline(&mut self, name: &'static str) {
        lock(&self.shared.state).trampolines.shift_remove(name);
    }

    fn parent_of(&self, handle: NativeHandle) -> NativeHandle {
        lock(&self.shared.state)
            .windows
            .get(&handle)
            .copied()
            .unwrap_or(NativeHandle::NULL)
    }
}

/// Thread-safe access to a [HeadlessBackend].
///
/// Used to feed native messages from other threads and to create and
/// destroy headless windows.
#[derive(Clone)]
pub struct HeadlessPoster {
    shared: Arc<Shared>,
}

impl HeadlessPoster {
    /// Append a message to the native queue.
    pub fn post(&self, message: NativeMessage) {
        self.shared.post(message);
    }

    /// Append a window message to the native queue.
    pub fn post_window(&self, handle: NativeHandle, kind: MessageKind) {
        self.post(NativeMessage::Window { handle, kind });
    }

    /// Ask the event loop to quit.
    pub fn quit(&self) {
        self.post(NativeMessage::Quit);
    }

    /// Create a native window. `parent` of [NativeHandle::NULL] creates a top-level window.
    pub fn create_window(&self, parent: NativeHandle) -> Result<NativeHandle> {
        let mut state = lock(&self.shared.state);
        if !parent.is_null() && !state.windows.contains_key(&parent) {
            return Err(ToolkitError::Backend(format!("unknown parent window {}", parent)));
        }
        let handle = state
            .handles
            .allocate()
            .map(NativeHandle)
            .ok_or(ToolkitError::NoMoreNativeResources("window"))?;
        state.windows.insert(handle, parent);
        Ok(handle)
    }

    /// Destroy a native window and its descendants, posting
    /// [MessageKind::Destroy] for each, children first.
    pub fn destroy_window(&self, handle: NativeHandle) {
        let destroyed = {
            let mut state = lock(&self.shared.state);
            let mut doomed = vec![handle];
            let mut index = 0;
            while index < doomed.len() {
                let current = doomed[index];
                doomed.extend(
                    state
                        .windows
                        .iter()
                        .filter(|(_, parent)| **parent == current)
                        .map(|(child, _)| *child),
                );
                index += 1;
            }
            doomed.retain(|h| state.windows.shift_remove(h).is_some());
            for h in &doomed {
                state.handles.release(h.0);
            }
            doomed
        };
        for h in destroyed.into_iter().rev() {
            self.post_window(h, MessageKind::Destroy);
        }
    }

    /// Returns `true` if `handle` is a live headless window.
    pub fn is_window(&self, handle: NativeHandle) -> bool {
        lock(&self.shared.state).windows.contains_key(&handle)
    }

    /// Number of armed timers.
    pub fn armed_timers(&self) -> usize {
        lock(&self.shared.state).timers.len()
    }

    /// Registered window class names.
    pub fn window_classes(&self) -> Vec<String> {
        lock(&self.shared.state).classes.iter().cloned().collect()
    }

    /// Installed trampolines.
    pub fn trampolines(&self) -> Vec<&'static str> {
        lock(&self.shared.state).trampolines.iter().copied().collect()
    }

    /// Number of queued messages.
    pub fn queued(&self) -> usize {
        lock(&self.shared.queue).messages.len()
    }
}

impl Waker for HeadlessPoster {
    fn wake(&self) {
        self.shared.post(NativeMessage::Wake);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
