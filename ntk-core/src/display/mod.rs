//! The display: owner of the UI thread's native message pump.

use crate::config::{BackendKind, DisplayConfig};
use crate::deferred::DeferredEventQueue;
use crate::error::{Result, ToolkitError};
use crate::event::{event_time, Event, EventKind, EventTable, Listener, ListenerId};
use crate::handle::{CallbackId, NativeHandle, TimerId};
use crate::interceptor::{self, Flow, Interceptor, InterceptorChain};
use crate::modal::{ModalStack, ModalState};
use crate::platform::{HeadlessBackend, MessageKind, NativeBackend, NativeMessage};
use crate::registry::HandleRegistry;
use crate::runtime;
use crate::synchronizer::{run_caught, Synchronizer};
use crate::timer::{Runnable, TimerManager};
use crate::widget::{Widget, WidgetRef};
use indexmap::IndexMap;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

mod proxy;

pub use proxy::DisplayProxy;
use proxy::Shared;

/// Names of the callback trampolines every display installs.
const TRAMPOLINES: [&str; 2] = ["window_proc", "message_proc"];

thread_local! {
    static CURRENT: RefCell<Weak<DisplayInner>> = RefCell::new(Weak::new());
}

/// Identifies a native message filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId(u64);

type MessageFilter = Rc<dyn Fn(&NativeMessage) -> bool>;

struct DisplayInner {
    shared: Arc<Shared>,
    config: DisplayConfig,
    window_class: String,
    backend: RefCell<Box<dyn NativeBackend>>,
    registry: RefCell<HandleRegistry>,
    modal: RefCell<ModalStack>,
    deferred: RefCell<DeferredEventQueue>,
    timers: RefCell<TimerManager>,
    interceptors: RefCell<IndexMap<NativeHandle, InterceptorChain>>,
    message_filters: RefCell<Vec<(FilterId, MessageFilter)>>,
    next_filter: Cell<u64>,
    listeners: RefCell<EventTable>,
    filters: RefCell<EventTable>,
    dispose_list: RefCell<Vec<Box<dyn FnOnce()>>>,
    data: RefCell<Option<Rc<dyn Any>>>,
    keyed_data: RefCell<IndexMap<String, Rc<dyn Any>>>,
    disposing: Cell<bool>,
    quit: Cell<bool>,
}

impl DisplayInner {
    /// Give back everything registered with the native system and the runtime.
    fn release_native(&self) {
        {
            let mut backend = self.backend.borrow_mut();
            self.timers.borrow_mut().kill_all(&mut **backend);
            backend.unregister_window_class(&self.window_class);
            for name in TRAMPOLINES {
                backend.remove_trampoline(name);
            }
        }
        runtime::deregister(&DisplayProxy {
            shared: self.shared.clone(),
        });
    }
}

impl Drop for DisplayInner {
    fn drop(&mut self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        log::warn!("Display {} dropped without being disposed", self.shared.id);
        self.shared.synchronizer.load().release();
        self.release_native();
    }
}

/// The connection between the toolkit and the native window system of one
/// thread.
///
/// A display is bound to the thread that created it (its UI thread) and
/// cannot be sent to other threads. It pumps native messages, routes them to
/// registered widgets, runs posted events, timers and work queued from other
/// threads, and keeps the modal shell stack. Clones share the same display.
///
/// ```rust,no_run
/// use ntk_core::display::Display;
///
/// let display = Display::new()?;
/// let proxy = display.proxy();
/// std::thread::spawn(move || {
///     let answer = proxy.sync_exec(|| 42).unwrap();
///     proxy.async_exec(move || println!("worker got {}", answer)).unwrap();
/// });
/// display.run()?;
/// # Ok::<(), ntk_core::error::ToolkitError>(())
/// ```
#[derive(Clone)]
pub struct Display {
    inner: Rc<DisplayInner>,
}

impl Display {
    /// Create a display for the current thread with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(DisplayConfig::default())
    }

    /// Create a display for the current thread, building the backend named by `config`.
    pub fn with_config(config: DisplayConfig) -> Result<Self> {
        let backend: Box<dyn NativeBackend> = match config.backend {
            BackendKind::Headless => Box::new(HeadlessBackend::new(config.headless)),
            #[cfg(feature = "winit")]
            BackendKind::Winit => Box::new(crate::platform::WinitBackend::new()?),
        };
        Self::with_backend(config, backend)
    }

    /// Create a display for the current thread driving `backend`.
    ///
    /// Fails with [ToolkitError::ThreadAccessViolation] if the thread
    /// already owns a live display and with
    /// [ToolkitError::NoMoreNativeResources] if the native registrations fail.
    pub fn with_backend(config: DisplayConfig, mut backend: Box<dyn NativeBackend>) -> Result<Self> {
        let shared = Arc::new(Shared::new(
            Synchronizer::new(config.synchronizer),
            backend.waker(),
        ));
        let proxy = DisplayProxy {
            shared: shared.clone(),
        };
        runtime::register(&proxy, config.tasks.clone())?;

        let window_class = format!("{}{}", config.app_name, runtime::next_class_id());
        if let Err(err) = register_native(&mut *backend, &window_class) {
            shared.disposed.store(true, Ordering::Release);
            runtime::deregister(&proxy);
            return Err(err);
        }

        log::info!(
            "Display {} created on {:?} ({} backend)",
            shared.id,
            shared.thread,
            backend.name()
        );

        let inner = Rc::new(DisplayInner {
            shared,
            config,
            window_class,
            backend: RefCell::new(backend),
            registry: RefCell::new(HandleRegistry::new()),
            modal: RefCell::new(ModalStack::new()),
            deferred: RefCell::new(DeferredEventQueue::new()),
            timers: RefCell::new(TimerManager::new()),
            interceptors: RefCell::new(IndexMap::new()),
            message_filters: RefCell::new(Vec::new()),
            next_filter: Cell::new(0),
            listeners: RefCell::new(EventTable::new()),
            filters: RefCell::new(EventTable::new()),
            dispose_list: RefCell::new(Vec::new()),
            data: RefCell::new(None),
            keyed_data: RefCell::new(IndexMap::new()),
            disposing: Cell::new(false),
            quit: Cell::new(false),
        });
        CURRENT.with(|current| *current.borrow_mut() = Rc::downgrade(&inner));

        Ok(Self { inner })
    }

    /// The live display of the calling thread.
    pub fn current() -> Option<Display> {
        CURRENT
            .with(|current| current.borrow().upgrade())
            .filter(|inner| !inner.shared.disposed.load(Ordering::Acquire))
            .map(|inner| Display { inner })
    }

    /// The live display owned by `thread`.
    pub fn find(thread: ThreadId) -> Option<DisplayProxy> {
        runtime::find(thread)
    }

    /// The default display of the process.
    pub fn default_proxy() -> Option<DisplayProxy> {
        runtime::default_proxy()
    }

    /// A thread-safe handle to this display.
    pub fn proxy(&self) -> DisplayProxy {
        DisplayProxy {
            shared: self.inner.shared.clone(),
        }
    }

    /// Process-unique id of the display.
    pub fn id(&self) -> u64 {
        self.inner.shared.id
    }

    /// The UI thread.
    pub fn thread(&self) -> ThreadId {
        self.inner.shared.thread
    }

    /// The configuration the display was created with.
    pub fn config(&self) -> &DisplayConfig {
        &self.inner.config
    }

    /// Name of the native window class registered for this display.
    pub fn window_class(&self) -> &str {
        &self.inner.window_class
    }

    /// Returns `true` once the display has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.shared.disposed.load(Ordering::Acquire)
    }

    /// Fails with [ToolkitError::ThreadAccessViolation] off the UI thread and
    /// with [ToolkitError::DeviceDisposed] once disposed.
    pub fn check_device(&self) -> Result<()> {
        self.proxy().check_device()
    }

    /// [Display::check_device], then [ToolkitError::WidgetDisposed] if `widget` is disposed.
    pub fn check_widget(&self, widget: &dyn Widget) -> Result<()> {
        self.check_device()?;
        if widget.is_disposed() {
            return Err(ToolkitError::WidgetDisposed);
        }
        Ok(())
    }

    fn synchronizer(&self) -> Arc<Synchronizer> {
        self.inner.shared.synchronizer.load_full()
    }

    // ---- message pump ----------------------------------------------------

    /// Read one native message and dispatch it.
    ///
    /// If no message is pending the queued cross-thread work runs instead.
    /// Posted events are delivered afterwards on every pass. Returns `false`
    /// when there was nothing to do.
    pub fn read_and_dispatch(&self) -> Result<bool> {
        self.check_device()?;
        Ok(self.pump_once(true))
    }

    fn pump_once(&self, run_async: bool) -> bool {
        let message = self.inner.backend.borrow_mut().next_message();
        match message {
            Some(NativeMessage::Quit) => {
                log::debug!("Quit requested");
                self.inner.quit.set(true);
                true
            },
            Some(NativeMessage::Wake) | None => {
                if !run_async {
                    return message.is_some();
                }
                let ran = self.synchronizer().run_async_messages();
                let delivered = self.run_deferred_events();
                ran || delivered > 0
            },
            Some(message) => {
                if !self.filter_message(&message) {
                    self.inner.backend.borrow_mut().translate_message(&message);
                    self.dispatch(message);
                }
                self.run_deferred_events();
                true
            },
        }
    }

    /// Block until a native message arrives or the display is woken.
    ///
    /// Returns immediately if cross-thread work or posted events are waiting.
    pub fn sleep(&self) -> Result<bool> {
        self.check_device()?;
        if self.synchronizer().has_pending() || self.pending_events() > 0 {
            return Ok(true);
        }
        self.inner.backend.borrow_mut().wait_message()?;
        Ok(true)
    }

    /// Wake the UI thread. A no-op when called on the UI thread.
    pub fn wake(&self) -> Result<()> {
        self.proxy().wake()
    }

    /// Pump until the display is disposed or the backend asks to quit.
    pub fn run(&self) -> Result<()> {
        self.check_device()?;
        self.inner.quit.set(false);
        while !self.is_disposed() && !self.inner.quit.get() {
            if !self.read_and_dispatch()? {
                self.sleep()?;
            }
        }
        Ok(())
    }

    fn filter_message(&self, message: &NativeMessage) -> bool {
        let filters: Vec<MessageFilter> = self
            .inner
            .message_filters
            .borrow()
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        filters.iter().any(|f| f(message))
    }

    fn dispatch(&self, message: NativeMessage) {
        match message {
            NativeMessage::Timer(id) => self.run_timer(id),
            NativeMessage::Window { handle, kind } => {
                let result = self.route(handle, &kind);
                log::trace!("{:?} for {} returned {}", kind, handle, result);
            },
            NativeMessage::Wake | NativeMessage::Quit => {},
        }
    }

    /// Route a window message: closest registered ancestor, its interceptor
    /// chain, the widget, then the backend's default procedure.
    fn route(&self, handle: NativeHandle, kind: &MessageKind) -> isize {
        let widget = {
            let backend = self.inner.backend.borrow();
            self.inner
                .registry
                .borrow()
                .find_ancestor(handle, |h| backend.parent_of(h))
        };

        let owner = widget.as_ref().map_or(handle, |w| w.native_handle());
        let chain = self
            .inner
            .interceptors
            .borrow()
            .get(&owner)
            .map(InterceptorChain::snapshot)
            .unwrap_or_default();
        if let Flow::Handled(result) = interceptor::run(&chain, handle, kind) {
            return result;
        }

        if let Some(widget) = widget.filter(|w| !w.is_disposed()) {
            if let Some(result) = widget.handle_message(kind) {
                return result;
            }
        }

        self.inner.backend.borrow_mut().default_procedure(handle, kind)
    }

    fn run_timer(&self, id: TimerId) {
        let runnable = {
            let mut backend = self.inner.backend.borrow_mut();
            self.inner.timers.borrow_mut().fire(id, &mut **backend)
        };
        match runnable {
            Some(runnable) => {
                log::trace!("Running {:?} for {}", runnable, id);
                runnable.run();
            },
            None => log::trace!("Ignoring stale {}", id),
        }
    }

    /// Add a filter that sees every native message before it is translated
    /// and dispatched. Returning `true` consumes the message.
    pub fn add_message_filter(
        &self,
        filter: impl Fn(&NativeMessage) -> bool + 'static,
    ) -> Result<FilterId> {
        self.check_device()?;
        let id = FilterId(self.inner.next_filter.get() + 1);
        self.inner.next_filter.set(id.0);
        self.inner
            .message_filters
            .borrow_mut()
            .push((id, Rc::new(filter)));
        Ok(id)
    }

    /// Remove a message filter. Returns `true` if it was installed.
    pub fn remove_message_filter(&self, id: FilterId) -> Result<bool> {
        self.check_device()?;
        let mut filters = self.inner.message_filters.borrow_mut();
        let before = filters.len();
        filters.retain(|(fid, _)| *fid != id);
        Ok(filters.len() != before)
    }

    // ---- cross-thread work -----------------------------------------------

    /// Queue `work` to run on the UI thread during a later pump iteration.
    pub fn async_exec<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.proxy().async_exec(work)
    }

    /// Run `work` now. On the UI thread this is immediate.
    pub fn sync_exec<F, R>(&self, work: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.proxy().sync_exec(work)
    }

    /// Replace the synchronizer. Work queued on the old one runs first.
    pub fn set_synchronizer(&self, synchronizer: Synchronizer) -> Result<()> {
        self.check_device()?;
        let old = self.synchronizer();
        for _ in 0..self.inner.config.dispose.max_drain_iterations {
            if !old.run_async_messages() {
                break;
            }
        }
        let new = Arc::new(synchronizer);
        self.inner.shared.synchronizer.store(new.clone());
        old.transfer_to(&new);
        log::debug!("Synchronizer replaced");
        Ok(())
    }

    /// The thread whose `sync_exec` work is currently running.
    pub fn sync_thread(&self) -> Option<ThreadId> {
        self.synchronizer().sync_thread()
    }

    // ---- timers ------------------------------------------------------------

    /// Run `runnable` once after `delay_ms` milliseconds.
    ///
    /// A negative delay cancels the pending timer of the runnable. Scheduling
    /// a runnable that is already pending restarts its timer.
    pub fn timer_exec(&self, delay_ms: i64, runnable: &Runnable) -> Result<()> {
        self.check_device()?;
        match u64::try_from(delay_ms) {
            Ok(delay) => self.schedule(Duration::from_millis(delay), runnable.clone()),
            Err(_) => {
                self.cancel(runnable.id());
                Ok(())
            },
        }
    }

    /// Arm a one-shot timer for `callback` under `callback_id`.
    pub fn request_timer(
        &self,
        delay_ms: u32,
        callback_id: CallbackId,
        callback: impl Fn() + 'static,
    ) -> Result<()> {
        self.check_device()?;
        self.schedule(
            Duration::from_millis(u64::from(delay_ms)),
            Runnable::with_id(callback_id, callback),
        )
    }

    /// Cancel the pending timer of `callback_id`. Returns `true` if one was pending.
    pub fn cancel_timer(&self, callback_id: CallbackId) -> Result<bool> {
        self.check_device()?;
        Ok(self.cancel(callback_id))
    }

    fn schedule(&self, delay: Duration, runnable: Runnable) -> Result<()> {
        let mut backend = self.inner.backend.borrow_mut();
        self.inner
            .timers
            .borrow_mut()
            .schedule(delay, runnable, &mut **backend)
            .map(|_| ())
    }

    fn cancel(&self, callback_id: CallbackId) -> bool {
        let mut backend = self.inner.backend.borrow_mut();
        self.inner
            .timers
            .borrow_mut()
            .cancel(callback_id, &mut **backend)
    }

    // ---- handle registry ---------------------------------------------------

    /// Bind `handle` to `widget` so native messages reach it.
    pub fn register_handle(&self, handle: NativeHandle, widget: &WidgetRef) -> Result<()> {
        self.check_device()?;
        self.inner.registry.borrow_mut().register(handle, widget)
    }

    /// Remove the binding of `handle` and its interceptors.
    pub fn deregister_handle(&self, handle: NativeHandle) -> Result<Option<WidgetRef>> {
        self.check_device()?;
        let chain = self.inner.interceptors.borrow_mut().shift_remove(&handle);
        if let Some(mut chain) = chain {
            chain.clear();
        }
        let widget = self.inner.registry.borrow_mut().deregister(handle);
        let popped = widget
            .as_ref()
            .is_some_and(|widget| self.inner.modal.borrow_mut().pop(widget));
        if popped || self.inner.modal.borrow_mut().prune() {
            log::debug!("Modal shell {} left the stack", handle);
            self.update_modal();
        }
        Ok(widget)
    }

    /// The widget registered for exactly `handle`.
    pub fn find_widget(&self, handle: NativeHandle) -> Result<Option<WidgetRef>> {
        self.check_device()?;
        Ok(self.inner.registry.borrow().lookup(handle))
    }

    /// The widget registered for `handle` or its closest native ancestor.
    pub fn find_ancestor_widget(&self, handle: NativeHandle) -> Result<Option<WidgetRef>> {
        self.check_device()?;
        let backend = self.inner.backend.borrow();
        Ok(self
            .inner
            .registry
            .borrow()
            .find_ancestor(handle, |h| backend.parent_of(h)))
    }

    /// Live top-level shells, in registration order.
    pub fn shells(&self) -> Result<Vec<WidgetRef>> {
        self.check_device()?;
        Ok(self.inner.registry.borrow_mut().top_level())
    }

    /// Add an interceptor to the chain of `handle`.
    pub fn add_interceptor(&self, handle: NativeHandle, interceptor: Rc<dyn Interceptor>) -> Result<()> {
        self.check_device()?;
        if handle.is_null() {
            return Err(ToolkitError::NullHandle);
        }
        self.inner
            .interceptors
            .borrow_mut()
            .entry(handle)
            .or_insert_with(|| InterceptorChain::new(handle))
            .register(interceptor);
        Ok(())
    }

    /// Remove the interceptor `name` from the chain of `handle`.
    pub fn remove_interceptor(&self, handle: NativeHandle, name: &str) -> Result<bool> {
        self.check_device()?;
        let mut chains = self.inner.interceptors.borrow_mut();
        let removed = chains.get_mut(&handle).is_some_and(|c| c.unregister(name));
        if chains.get(&handle).is_some_and(InterceptorChain::is_empty) {
            chains.shift_remove(&handle);
        }
        Ok(removed)
    }

    // ---- events --------------------------------------------------------------

    /// Queue `event` for delivery after the current native dispatch.
    pub fn post_event(&self, mut event: Event) -> Result<()> {
        self.check_device()?;
        if event.time == 0 {
            event.time = event_time();
        }
        self.inner.deferred.borrow_mut().post(event);
        Ok(())
    }

    /// Deliver `event` now: display filters first, then the target widget
    /// (or the display's listeners for display-level events).
    pub fn send_event_now(&self, event: &mut Event) -> Result<()> {
        self.check_device()?;
        if event.is_stale() {
            return Err(ToolkitError::WidgetDisposed);
        }
        if event.time == 0 {
            event.time = event_time();
        }
        self.deliver(event);
        Ok(())
    }

    fn deliver(&self, event: &mut Event) {
        let filters = self.inner.filters.borrow().listeners(event.kind);
        for filter in filters {
            filter(event);
        }
        match event.widget.clone() {
            Some(widget) => widget.handle_event(event),
            None => {
                let listeners = self.inner.listeners.borrow().listeners(event.kind);
                for listener in listeners {
                    listener(event);
                }
            },
        }
    }

    /// Deliver posted events until none are left. Returns how many were delivered.
    pub(crate) fn run_deferred_events(&self) -> usize {
        DeferredEventQueue::run(&self.inner.deferred, |event| self.deliver(event))
    }

    /// Number of posted events waiting for delivery.
    pub fn pending_events(&self) -> usize {
        self.inner.deferred.borrow().len()
    }

    /// Listen for display-level events of `kind`.
    pub fn add_listener(&self, kind: EventKind, listener: impl Fn(&mut Event) + 'static) -> Result<ListenerId> {
        self.check_device()?;
        let listener: Listener = Rc::new(listener);
        Ok(self.inner.listeners.borrow_mut().hook(kind, listener))
    }

    /// Remove a display listener.
    pub fn remove_listener(&self, id: ListenerId) -> Result<bool> {
        self.check_device()?;
        Ok(self.inner.listeners.borrow_mut().unhook(id))
    }

    /// Add a filter that sees every event of `kind` sent through this
    /// display before its target does.
    pub fn add_filter(&self, kind: EventKind, filter: impl Fn(&mut Event) + 'static) -> Result<ListenerId> {
        self.check_device()?;
        let filter: Listener = Rc::new(filter);
        Ok(self.inner.filters.borrow_mut().hook(kind, filter))
    }

    /// Remove an event filter.
    pub fn remove_filter(&self, id: ListenerId) -> Result<bool> {
        self.check_device()?;
        Ok(self.inner.filters.borrow_mut().unhook(id))
    }

    // ---- modality --------------------------------------------------------------

    /// Make `shell` the innermost modal shell.
    pub fn push_modal(&self, shell: &WidgetRef) -> Result<()> {
        self.check_widget(&**shell)?;
        if self.inner.modal.borrow_mut().push(shell) {
            log::debug!("Modal shell {} pushed", shell.native_handle());
            self.update_modal();
        }
        Ok(())
    }

    /// Remove `shell` from the modal stack.
    pub fn pop_modal(&self, shell: &WidgetRef) -> Result<()> {
        self.check_device()?;
        if self.inner.modal.borrow_mut().pop(shell) {
            log::debug!("Modal shell {} popped", shell.native_handle());
            self.update_modal();
        }
        Ok(())
    }

    /// Returns `true` if `shell` may not receive input because of a modal shell.
    pub fn is_modal_blocked(&self, shell: &WidgetRef) -> Result<bool> {
        self.check_device()?;
        self.prune_modal();
        Ok(self.inner.modal.borrow_mut().is_blocked(shell))
    }

    /// The derived modal state of `shell`.
    pub fn modal_state(&self, shell: &WidgetRef) -> Result<ModalState> {
        self.check_device()?;
        self.prune_modal();
        Ok(self.inner.modal.borrow_mut().state_of(shell))
    }

    /// The innermost modal shell.
    pub fn active_modal_shell(&self) -> Result<Option<WidgetRef>> {
        self.check_device()?;
        self.prune_modal();
        Ok(self.inner.modal.borrow_mut().topmost())
    }

    /// Drop disposed shells from the stack, recomputing modality if any were removed.
    fn prune_modal(&self) {
        let pruned = self.inner.modal.borrow_mut().prune();
        if pruned {
            self.update_modal();
        }
    }

    /// Recompute the modal state of every shell, then notify each of them.
    fn update_modal(&self) {
        let shells = self.inner.registry.borrow_mut().top_level();
        let states = self.inner.modal.borrow_mut().compute(&shells);
        for (shell, state) in states {
            shell.set_input_enabled(state != ModalState::ModalBlocked);
        }
    }

    // ---- data ----------------------------------------------------------------

    /// Set the application data of the display.
    pub fn set_data(&self, data: Option<Rc<dyn Any>>) -> Result<()> {
        self.check_device()?;
        *self.inner.data.borrow_mut() = data;
        Ok(())
    }

    /// The application data of the display.
    pub fn data(&self) -> Result<Option<Rc<dyn Any>>> {
        self.check_device()?;
        Ok(self.inner.data.borrow().clone())
    }

    /// Set (or with `None` remove) the data stored under `key`.
    pub fn set_keyed_data(&self, key: impl Into<String>, data: Option<Rc<dyn Any>>) -> Result<()> {
        self.check_device()?;
        let key = key.into();
        let mut map = self.inner.keyed_data.borrow_mut();
        match data {
            Some(data) => {
                map.insert(key, data);
            },
            None => {
                map.shift_remove(&key);
            },
        }
        Ok(())
    }

    /// The data stored under `key`.
    pub fn keyed_data(&self, key: &str) -> Result<Option<Rc<dyn Any>>> {
        self.check_device()?;
        Ok(self.inner.keyed_data.borrow().get(key).cloned())
    }

    // ---- lifecycle -------------------------------------------------------------

    /// Run `callback` when the display is disposed, after the shells are gone
    /// and before the native registrations are released.
    pub fn dispose_exec(&self, callback: impl FnOnce() + 'static) -> Result<()> {
        self.check_device()?;
        self.inner.dispose_list.borrow_mut().push(Box::new(callback));
        Ok(())
    }

    /// Ask the display to close. Listeners of [EventKind::Close] may veto by
    /// clearing [Event::doit]; otherwise the display is disposed.
    pub fn close(&self) -> Result<()> {
        self.check_device()?;
        let mut event = Event::new(EventKind::Close);
        event.time = event_time();
        self.deliver(&mut event);
        if event.doit {
            self.dispose()?;
        } else {
            log::debug!("Close of display {} vetoed", self.id());
        }
        Ok(())
    }

    /// Dispose the display. Idempotent.
    ///
    /// Shells are disposed, outstanding native messages and posted events
    /// are drained, dispose callbacks run, queued cross-thread work is
    /// discarded (blocked `sync_exec` callers fail with
    /// [ToolkitError::DeviceDisposed]) and every native registration is
    /// released.
    pub fn dispose(&self) -> Result<()> {
        if self.is_disposed() || self.inner.disposing.get() {
            return Ok(());
        }
        self.check_device()?;
        self.inner.disposing.set(true);
        log::info!("Disposing display {}", self.id());

        let mut event = Event::new(EventKind::Dispose);
        event.time = event_time();
        self.deliver(&mut event);

        let shells = self.inner.registry.borrow_mut().top_level();
        for shell in shells {
            shell.dispose();
        }

        let mut drained = false;
        for _ in 0..self.inner.config.dispose.max_drain_iterations {
            if !self.pump_once(false) {
                drained = true;
                break;
            }
        }
        if !drained {
            log::warn!(
                "Display {} still had native messages after {} iterations",
                self.id(),
                self.inner.config.dispose.max_drain_iterations
            );
        }
        self.run_deferred_events();

        let callbacks = std::mem::take(&mut *self.inner.dispose_list.borrow_mut());
        for callback in callbacks {
            if let Err(err) = run_caught(move || {
                callback();
                Ok(())
            }) {
                log::error!("Dispose callback failed: {:#}", err);
            }
        }

        self.inner.shared.disposed.store(true, Ordering::Release);
        self.synchronizer().release();
        self.inner.release_native();

        self.inner.deferred.borrow_mut().clear();
        self.inner.modal.borrow_mut().clear();
        self.inner.registry.borrow_mut().clear();
        let chains = std::mem::take(&mut *self.inner.interceptors.borrow_mut());
        for (_, mut chain) in chains {
            chain.clear();
        }
        self.inner.message_filters.borrow_mut().clear();
        self.inner.listeners.borrow_mut().clear();
        self.inner.filters.borrow_mut().clear();
        *self.inner.data.borrow_mut() = None;
        self.inner.keyed_data.borrow_mut().clear();

        CURRENT.with(|current| {
            let mut current = current.borrow_mut();
            if current.ptr_eq(&Rc::downgrade(&self.inner)) {
                *current = Weak::new();
            }
        });
        log::info!("Display {} disposed", self.id());
        Ok(())
    }

    /// Name of the native backend.
    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.borrow().name()
    }
}

fn register_native(backend: &mut dyn NativeBackend, window_class: &str) -> Result<()> {
    let mut installed = Vec::new();
    for name in TRAMPOLINES {
        if let Err(err) = backend.install_trampoline(name) {
            for name in installed {
                backend.remove_trampoline(name);
            }
            return Err(err);
        }
        installed.push(name);
    }
    if let Err(err) = backend.register_window_class(window_class) {
        for name in installed {
            backend.remove_trampoline(name);
        }
        log::error!("Failed to register window class {}: {}", window_class, err);
        return Err(ToolkitError::NoMoreNativeResources("window class"));
    }
    Ok(())
}

impl fmt::Debug for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Display")
            .field("id", &self.inner.shared.id)
            .field("thread", &self.inner.shared.thread)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
