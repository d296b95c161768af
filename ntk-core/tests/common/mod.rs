//! Shared fixtures: a headless display and a shell widget backed by headless windows.

#![allow(dead_code)]

use ntk_core::config::DisplayConfig;
use ntk_core::display::{Display, DisplayProxy};
use ntk_core::event::{Event, EventKind};
use ntk_core::handle::NativeHandle;
use ntk_core::platform::{HeadlessBackend, HeadlessPoster, MessageKind};
use ntk_core::widget::{Disposable, EventSource, HasNativeHandle, ThreadAffine, Widget, WidgetRef};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A display on the calling thread driving a fresh headless backend.
pub fn headless_display() -> (Display, HeadlessPoster) {
    headless_display_with(DisplayConfig::headless())
}

pub fn headless_display_with(config: DisplayConfig) -> (Display, HeadlessPoster) {
    let backend = HeadlessBackend::new(config.headless);
    let poster = backend.poster();
    let display = Display::with_backend(config, Box::new(backend)).unwrap();
    (display, poster)
}

/// Dispatch until both the native queue and the cross-thread queue are empty.
pub fn drain(display: &Display, poster: &HeadlessPoster) {
    for _ in 0..10_000 {
        if !display.read_and_dispatch().unwrap() && poster.queued() == 0 {
            return;
        }
    }
    panic!("display did not go idle");
}

/// Run the loop until `done` holds, polling while idle.
pub fn pump_until(display: &Display, timeout: Duration, done: impl Fn() -> bool) {
    let deadline = Instant::now() + timeout;
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in {:?}", timeout);
        if !display.read_and_dispatch().unwrap() {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

/// A top-level shell or child control with a headless native window.
pub struct TestShell {
    handle: Cell<NativeHandle>,
    parent: Option<WidgetRef>,
    display: DisplayProxy,
    poster: HeadlessPoster,
    disposed: Cell<bool>,
    pub input_enabled: Cell<bool>,
    pub events: RefCell<Vec<EventKind>>,
    pub messages: RefCell<Vec<MessageKind>>,
    pub consume: Cell<Option<isize>>,
}

impl TestShell {
    pub fn open(display: &Display, poster: &HeadlessPoster) -> Rc<TestShell> {
        Self::create(display, poster, None)
    }

    pub fn open_child(display: &Display, poster: &HeadlessPoster, parent: &WidgetRef) -> Rc<TestShell> {
        Self::create(display, poster, Some(parent.clone()))
    }

    fn create(display: &Display, poster: &HeadlessPoster, parent: Option<WidgetRef>) -> Rc<TestShell> {
        let parent_handle = parent
            .as_ref()
            .map_or(NativeHandle::NULL, |p| p.native_handle());
        let handle = poster.create_window(parent_handle).unwrap();
        let shell = Rc::new(TestShell {
            handle: Cell::new(handle),
            parent,
            display: display.proxy(),
            poster: poster.clone(),
            disposed: Cell::new(false),
            input_enabled: Cell::new(true),
            events: RefCell::new(Vec::new()),
            messages: RefCell::new(Vec::new()),
            consume: Cell::new(None),
        });
        let widget: WidgetRef = shell.clone();
        display.register_handle(handle, &widget).unwrap();
        shell
    }

    pub fn as_widget(self: &Rc<Self>) -> WidgetRef {
        self.clone()
    }

    fn release_handle(&self) {
        let handle = self.handle.replace(NativeHandle::NULL);
        if handle.is_null() {
            return;
        }
        let _ = self.display.with_display(|d| d.deregister_handle(handle));
    }
}

impl HasNativeHandle for TestShell {
    fn native_handle(&self) -> NativeHandle {
        self.handle.get()
    }
}

impl Disposable for TestShell {
    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let handle = self.handle.get();
        self.release_handle();
        if !handle.is_null() {
            self.poster.destroy_window(handle);
        }
    }
}

impl EventSource for TestShell {
    fn handle_event(&self, event: &mut Event) {
        self.events.borrow_mut().push(event.kind);
    }

    fn handle_message(&self, kind: &MessageKind) -> Option<isize> {
        self.messages.borrow_mut().push(kind.clone());
        if *kind == MessageKind::Destroy {
            self.disposed.set(true);
            self.release_handle();
            return Some(0);
        }
        self.consume.get()
    }
}

impl ThreadAffine for TestShell {
    fn display(&self) -> &DisplayProxy {
        &self.display
    }
}

impl Widget for TestShell {
    fn parent(&self) -> Option<WidgetRef> {
        self.parent.clone()
    }

    fn set_input_enabled(&self, enabled: bool) {
        self.input_enabled.set(enabled);
    }
}
