//! Winit backend.
//!
//! Pumps a winit 0.30 event loop with `pump_app_events`, converting window
//! events into [NativeMessage]s. Waking goes through an [EventLoopProxy].
//! Winit has no timer API, so timers are emulated with the pump timeout.

use super::{MessageKind, NativeBackend, NativeMessage, Waker};
use crate::error::{Result, ToolkitError};
use crate::event::Modifiers;
use crate::handle::{NativeHandle, TimerId};
use indexmap::{IndexMap, IndexSet};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy};
use winit::keyboard::{Key, ModifiersState, NamedKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::WindowId;

/// User event sent through the proxy to wake the loop.
#[derive(Debug, Clone, Copy)]
pub struct WakeUp;

/// Buffers converted messages while winit calls back into it.
#[derive(Default)]
struct Collector {
    queue: VecDeque<NativeMessage>,
    modifiers: Modifiers,
    cursor: (i32, i32),
}

impl Collector {
    fn push(&mut self, window_id: WindowId, kind: MessageKind) {
        self.queue.push_back(NativeMessage::Window {
            handle: handle_of(window_id),
            kind,
        });
    }

    fn key(&mut self, window_id: WindowId, event: KeyEvent) {
        let pressed = event.state == ElementState::Pressed;
        self.push(
            window_id,
            MessageKind::Key {
                code: key_code(&event.logical_key),
                pressed,
                modifiers: self.modifiers,
            },
        );
        if pressed {
            for c in event.text.iter().flat_map(|t| t.chars()) {
                self.push(window_id, MessageKind::Char(c));
            }
        }
    }
}

impl ApplicationHandler<WakeUp> for Collector {
    fn resumed(&mut self, _: &ActiveEventLoop) {}

    fn user_event(&mut self, _: &ActiveEventLoop, _: WakeUp) {
        if !self.queue.contains(&NativeMessage::Wake) {
            self.queue.push_back(NativeMessage::Wake);
        }
    }

    fn window_event(&mut self, _: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.push(window_id, MessageKind::Close),
            WindowEvent::Destroyed => self.push(window_id, MessageKind::Destroy),
            WindowEvent::Focused(focused) => {
                self.push(window_id, MessageKind::Activate(focused));
                self.push(window_id, MessageKind::Focus(focused));
            },
            WindowEvent::Resized(size) => self.push(
                window_id,
                MessageKind::Resize {
                    width: size.width,
                    height: size.height,
                },
            ),
            WindowEvent::Moved(position) => self.push(
                window_id,
                MessageKind::Move {
                    x: position.x,
                    y: position.y,
                },
            ),
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers_of(modifiers.state());
            },
            WindowEvent::KeyboardInput { event, .. } => self.key(window_id, event),
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x as i32, position.y as i32);
                let (x, y) = self.cursor;
                self.push(window_id, MessageKind::MouseMove { x, y });
            },
            WindowEvent::MouseInput { state, button, .. } => {
                let (x, y) = self.cursor;
                self.push(
                    window_id,
                    MessageKind::MouseButton {
                        button: button_number(button),
                        pressed: state == ElementState::Pressed,
                        x,
                        y,
                    },
                );
            },
            WindowEvent::RedrawRequested => self.push(window_id, MessageKind::Paint),
            _ => {},
        }
    }
}

fn handle_of(window_id: WindowId) -> NativeHandle {
    NativeHandle(u64::from(window_id))
}

fn key_code(key: &Key) -> u32 {
    match key {
        Key::Character(s) => s.chars().next().map_or(0, u32::from),
        Key::Named(NamedKey::Enter) => 13,
        Key::Named(NamedKey::Escape) => 27,
        Key::Named(NamedKey::Tab) => 9,
        Key::Named(NamedKey::Backspace) => 8,
        Key::Named(NamedKey::Space) => 32,
        Key::Named(NamedKey::Delete) => 127,
        _ => 0,
    }
}

fn button_number(button: MouseButton) -> u32 {
    match button {
        MouseButton::Left => 1,
        MouseButton::Middle => 2,
        MouseButton::Right => 3,
        MouseButton::Back => 4,
        MouseButton::Forward => 5,
        MouseButton::Other(n) => u32::from(n),
    }
}

fn modifiers_of(state: ModifiersState) -> Modifiers {
    let mut modifiers = Modifiers::empty();
    modifiers.set(Modifiers::SHIFT, state.shift_key());
    modifiers.set(Modifiers::CTRL, state.control_key());
    modifiers.set(Modifiers::ALT, state.alt_key());
    modifiers.set(Modifiers::COMMAND, state.super_key());
    modifiers
}

struct ProxyWaker(Mutex<EventLoopProxy<WakeUp>>);

impl Waker for ProxyWaker {
    fn wake(&self) {
        let proxy = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if proxy.send_event(WakeUp).is_err() {
            log::debug!("Event loop closed, dropping wake");
        }
    }
}

struct Timer {
    deadline: Instant,
    period: Duration,
}

/// A native backend running on a winit event loop.
pub struct WinitBackend {
    event_loop: EventLoop<WakeUp>,
    waker: Arc<ProxyWaker>,
    collector: Collector,
    timers: IndexMap<TimerId, Timer>,
    classes: IndexSet<String>,
    trampolines: IndexSet<&'static str>,
    exited: bool,
}

impl WinitBackend {
    /// Create the event loop. Must be called on the thread winit expects
    /// (the main thread on most platforms).
    pub fn new() -> Result<Self> {
        let event_loop = EventLoop::<WakeUp>::with_user_event()
            .build()
            .map_err(|err| ToolkitError::Backend(format!("failed to create event loop: {}", err)))?;
        let proxy = event_loop.create_proxy();

        Ok(Self {
            event_loop,
            waker: Arc::new(ProxyWaker(Mutex::new(proxy))),
            collector: Collector::default(),
            timers: IndexMap::new(),
            classes: IndexSet::new(),
            trampolines: IndexSet::new(),
            exited: false,
        })
    }

    /// The underlying event loop, e.g. to create windows from a pump callback.
    pub fn event_loop(&mut self) -> &mut EventLoop<WakeUp> {
        &mut self.event_loop
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if self.exited {
            return;
        }
        let status = self.event_loop.pump_app_events(timeout, &mut self.collector);
        if let PumpStatus::Exit(code) = status {
            log::info!("Event loop exited with code {}", code);
            self.exited = true;
            self.collector.queue.push_back(NativeMessage::Quit);
        }
    }

    fn due_timer(&mut self) -> Option<NativeMessage> {
        let now = Instant::now();
        let (id, timer) = self
            .timers
            .iter_mut()
            .filter(|(_, t)| t.deadline <= now)
            .min_by_key(|(_, t)| t.deadline)?;
        timer.deadline = now + timer.period;
        Some(NativeMessage::Timer(*id))
    }
}

impl NativeBackend for WinitBackend {
    fn name(&self) -> &'static str {
        "winit"
    }

    fn next_message(&mut self) -> Option<NativeMessage> {
        if self.collector.queue.is_empty() {
            self.pump(Some(Duration::ZERO));
        }
        self.collector.queue.pop_front().or_else(|| self.due_timer())
    }

    fn wait_message(&mut self) -> Result<()> {
        if !self.collector.queue.is_empty() || self.exited {
            return Ok(());
        }
        let timeout = self
            .timers
            .values()
            .map(|t| t.deadline.saturating_duration_since(Instant::now()))
            .min();
        self.pump(timeout);
        Ok(())
    }

    fn waker(&self) -> Arc<dyn Waker> {
        self.waker.clone()
    }

    fn set_timer(&mut self, id: TimerId, delay: Duration) -> Result<()> {
        self.timers.insert(
            id,
            Timer {
                deadline: Instant::now() + delay,
                period: delay.max(Duration::from_millis(1)),
            },
        );
        Ok(())
    }

    fn kill_timer(&mut self, id: TimerId) {
        self.timers.shift_remove(&id);
    }

    fn register_window_class(&mut self, name: &str) -> Result<()> {
        // Winit owns window classes; only the name is tracked.
        self.classes.insert(name.to_string());
        Ok(())
    }

    fn unregister_window_class(&mut self, name: &str) {
        self.classes.shift_remove(name);
    }

    fn install_trampoline(&mut self, name: &'static str) -> Result<()> {
        self.trampolines.insert(name);
        Ok(())
    }

    fn remove_trampoline(&mut self, name: &'static str) {
        self.trampolines.shift_remove(name);
    }
}
