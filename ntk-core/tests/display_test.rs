//! Tests for display creation, thread affinity and disposal

mod common;

use common::{drain, headless_display, headless_display_with, TestShell};
use ntk_core::config::{DisplayConfig, HeadlessConfig};
use ntk_core::display::Display;
use ntk_core::error::ToolkitError;
use ntk_core::event::EventKind;
use ntk_core::widget::{Disposable, HasNativeHandle, ThreadAffine};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread;

#[test]
fn test_display_registers_native_resources() {
    let (display, poster) = headless_display();

    assert_eq!(display.backend_name(), "headless");
    assert!(display.window_class().starts_with("ntk"));
    assert_eq!(poster.window_classes(), vec![display.window_class().to_string()]);
    assert_eq!(poster.trampolines(), vec!["window_proc", "message_proc"]);
    assert!(Display::current().is_some());
    assert_eq!(Display::find(thread::current().id()).map(|p| p.id()), Some(display.id()));

    display.dispose().unwrap();
}

#[test]
fn test_second_display_on_same_thread_is_rejected() {
    let (display, _poster) = headless_display();
    let second = Display::with_backend(
        DisplayConfig::headless(),
        Box::new(ntk_core::platform::HeadlessBackend::default()),
    );
    assert!(matches!(second, Err(ToolkitError::ThreadAccessViolation)));

    display.dispose().unwrap();
    let (again, _poster) = headless_display();
    again.dispose().unwrap();
}

#[test]
fn test_window_class_failure_rolls_back() {
    let config = DisplayConfig {
        headless: HeadlessConfig {
            max_window_classes: 0,
            ..HeadlessConfig::default()
        },
        ..DisplayConfig::headless()
    };
    let backend = ntk_core::platform::HeadlessBackend::new(config.headless);
    let poster = backend.poster();

    let result = Display::with_backend(config, Box::new(backend));
    assert!(matches!(result, Err(ToolkitError::NoMoreNativeResources(_))));
    assert!(poster.trampolines().is_empty());
    assert!(Display::find(thread::current().id()).is_none());
}

#[test]
fn test_proxy_rejects_foreign_thread() {
    let (display, _poster) = headless_display();
    let proxy = display.proxy();

    let result = thread::spawn(move || proxy.check_device()).join().unwrap();
    assert!(matches!(result, Err(ToolkitError::ThreadAccessViolation)));

    let proxy = display.proxy();
    let result = thread::spawn(move || proxy.with_display(|d| d.id())).join().unwrap();
    assert!(matches!(result, Err(ToolkitError::ThreadAccessViolation)));

    display.dispose().unwrap();
}

#[test]
fn test_widget_checks_follow_display() {
    let (display, poster) = headless_display();
    let shell = TestShell::open(&display, &poster);
    assert!(shell.check_widget().is_ok());
    assert!(display.check_widget(&*shell).is_ok());

    shell.dispose();
    assert!(matches!(shell.check_widget(), Err(ToolkitError::WidgetDisposed)));
    assert!(matches!(display.check_widget(&*shell), Err(ToolkitError::WidgetDisposed)));

    let live = TestShell::open(&display, &poster);
    display.dispose().unwrap();
    assert!(matches!(live.check_widget(), Err(ToolkitError::DeviceDisposed)));
}

#[test]
fn test_operations_fail_after_dispose() {
    let (display, _poster) = headless_display();
    let proxy = display.proxy();
    display.dispose().unwrap();

    assert!(display.is_disposed());
    assert!(matches!(display.read_and_dispatch(), Err(ToolkitError::DeviceDisposed)));
    assert!(matches!(display.shells(), Err(ToolkitError::DeviceDisposed)));
    assert!(matches!(proxy.async_exec(|| {}), Err(ToolkitError::DeviceDisposed)));
    assert!(matches!(proxy.wake(), Err(ToolkitError::DeviceDisposed)));
    assert!(Display::current().is_none());
}

#[test]
fn test_dispose_is_idempotent_and_releases_everything() {
    let (display, poster) = headless_display();
    let shell = TestShell::open(&display, &poster);
    let child = TestShell::open_child(&display, &poster, &shell.as_widget());
    let child_handle = child.native_handle();
    let runnable = ntk_core::timer::Runnable::new(|| {});
    display.timer_exec(60_000, &runnable).unwrap();
    assert_eq!(poster.armed_timers(), 1);

    let disposed_events = Rc::new(Cell::new(0));
    let counter = disposed_events.clone();
    display
        .add_listener(EventKind::Dispose, move |_| counter.set(counter.get() + 1))
        .unwrap();

    display.dispose().unwrap();
    display.dispose().unwrap();

    assert_eq!(disposed_events.get(), 1);
    assert!(shell.is_disposed());
    assert!(child.is_disposed());
    assert!(!poster.is_window(child_handle));
    assert_eq!(poster.armed_timers(), 0);
    assert!(poster.window_classes().is_empty());
    assert!(poster.trampolines().is_empty());
    assert_eq!(poster.queued(), 0);
}

#[test]
fn test_dispose_exec_runs_in_order_before_release() {
    let (display, poster) = headless_display();
    let order = Rc::new(RefCell::new(Vec::new()));

    for name in ["first", "second"] {
        let order = order.clone();
        let poster = poster.clone();
        display
            .dispose_exec(move || {
                order.borrow_mut().push((name, poster.window_classes().len()));
            })
            .unwrap();
    }
    display.dispose().unwrap();

    assert_eq!(*order.borrow(), vec![("first", 1), ("second", 1)]);
}

#[test]
fn test_close_can_be_vetoed() {
    let (display, _poster) = headless_display();
    let veto = Rc::new(Cell::new(true));
    let flag = veto.clone();
    display
        .add_listener(EventKind::Close, move |event| event.doit = !flag.get())
        .unwrap();

    display.close().unwrap();
    assert!(!display.is_disposed());

    veto.set(false);
    display.close().unwrap();
    assert!(display.is_disposed());
}

#[test]
fn test_dispose_drains_posted_native_messages() {
    let (display, poster) = headless_display();
    let shell = TestShell::open(&display, &poster);
    let handle = shell.native_handle();
    poster.post_window(handle, ntk_core::platform::MessageKind::Paint);
    poster.post_window(handle, ntk_core::platform::MessageKind::Paint);

    display.dispose().unwrap();
    assert_eq!(poster.queued(), 0);
}

#[test]
fn test_application_data() {
    let (display, poster) = headless_display();
    display.set_data(Some(Rc::new(7u32))).unwrap();
    display.set_keyed_data("name", Some(Rc::new("ntk"))).unwrap();

    let data = display.data().unwrap().unwrap();
    assert_eq!(data.downcast_ref::<u32>(), Some(&7));
    let named = display.keyed_data("name").unwrap().unwrap();
    assert_eq!(named.downcast_ref::<&str>(), Some(&"ntk"));

    display.set_keyed_data("name", None).unwrap();
    assert!(display.keyed_data("name").unwrap().is_none());

    drain(&display, &poster);
    display.dispose().unwrap();
}

#[test]
fn test_drop_without_dispose_releases_thread() {
    {
        let (_display, _poster) = headless_display_with(DisplayConfig::headless());
    }
    let (display, _poster) = headless_display();
    display.dispose().unwrap();
}
