//! Tests for one-shot timers

mod common;

use common::{drain, headless_display, pump_until};
use ntk_core::handle::CallbackId;
use ntk_core::timer::Runnable;
use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

fn counting_runnable() -> (Runnable, Rc<Cell<u32>>) {
    let count = Rc::new(Cell::new(0));
    let counter = count.clone();
    (Runnable::new(move || counter.set(counter.get() + 1)), count)
}

#[test]
fn test_timer_fires_exactly_once() {
    let (display, poster) = headless_display();
    let (runnable, count) = counting_runnable();

    display.timer_exec(5, &runnable).unwrap();
    pump_until(&display, TIMEOUT, || count.get() == 1);
    assert_eq!(poster.armed_timers(), 0);

    thread::sleep(Duration::from_millis(20));
    drain(&display, &poster);
    assert_eq!(count.get(), 1);
    display.dispose().unwrap();
}

#[test]
fn test_rescheduling_replaces_pending_timer() {
    let (display, poster) = headless_display();
    let (runnable, count) = counting_runnable();

    display.timer_exec(60_000, &runnable).unwrap();
    display.timer_exec(5, &runnable.clone()).unwrap();
    assert_eq!(poster.armed_timers(), 1);

    pump_until(&display, TIMEOUT, || count.get() == 1);
    assert_eq!(poster.armed_timers(), 0);
    display.dispose().unwrap();
}

#[test]
fn test_negative_delay_cancels() {
    let (display, poster) = headless_display();
    let (runnable, count) = counting_runnable();

    display.timer_exec(5, &runnable).unwrap();
    display.timer_exec(-1, &runnable).unwrap();
    assert_eq!(poster.armed_timers(), 0);

    thread::sleep(Duration::from_millis(20));
    drain(&display, &poster);
    assert_eq!(count.get(), 0);

    // Cancelling something that is not pending is fine.
    display.timer_exec(-1, &runnable).unwrap();
    display.dispose().unwrap();
}

#[test]
fn test_timer_can_reschedule_itself() {
    let (display, poster) = headless_display();
    let count = Rc::new(Cell::new(0));
    let id = CallbackId::next();

    fn arm(display: &ntk_core::display::Display, id: CallbackId, count: Rc<Cell<u32>>) {
        let again = display.clone();
        display
            .request_timer(1, id, move || {
                count.set(count.get() + 1);
                if count.get() < 3 {
                    arm(&again, id, count.clone());
                }
            })
            .unwrap();
    }
    arm(&display, id, count.clone());

    pump_until(&display, TIMEOUT, || count.get() == 3);
    assert_eq!(poster.armed_timers(), 0);
    display.dispose().unwrap();
}

#[test]
fn test_cancel_timer_by_callback_id() {
    let (display, poster) = headless_display();
    let id = CallbackId::next();

    display.request_timer(60_000, id, || {}).unwrap();
    assert_eq!(poster.armed_timers(), 1);
    assert!(display.cancel_timer(id).unwrap());
    assert!(!display.cancel_timer(id).unwrap());
    assert_eq!(poster.armed_timers(), 0);
    display.dispose().unwrap();
}

#[test]
fn test_dispose_kills_pending_timers() {
    let (display, poster) = headless_display();
    let (first, _) = counting_runnable();
    let (second, _) = counting_runnable();
    display.timer_exec(60_000, &first).unwrap();
    display.timer_exec(60_000, &second).unwrap();
    assert_eq!(poster.armed_timers(), 2);

    display.dispose().unwrap();
    assert_eq!(poster.armed_timers(), 0);
}
