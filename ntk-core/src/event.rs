//! Semantic events and listener tables.

use crate::widget::WidgetRef;
use bitflags::bitflags;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

/// The kind of a semantic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A close request (display or shell). Listeners may veto through [Event::doit].
    Close,
    /// The source is being disposed.
    Dispose,
    /// The source was activated.
    Activate,
    /// The source was deactivated.
    Deactivate,
    /// Keyboard focus was gained.
    FocusIn,
    /// Keyboard focus was lost.
    FocusOut,
    /// A key was pressed.
    KeyDown,
    /// A key was released.
    KeyUp,
    /// A mouse button was pressed.
    MouseDown,
    /// A mouse button was released.
    MouseUp,
    /// The pointer moved.
    MouseMove,
    /// The source was resized.
    Resize,
    /// The source was moved.
    Move,
    /// A selection occurred.
    Selection,
    /// A default selection occurred (e.g. double click, enter).
    DefaultSelection,
    /// The text or value of the source was modified.
    Modify,
    /// System settings changed.
    Settings,
    /// Application defined event.
    Custom(u32),
}

bitflags! {
    /// Keyboard and mouse button state carried by input events.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u32 {
        /// Shift key held.
        const SHIFT = 1 << 0;
        /// Control key held.
        const CTRL = 1 << 1;
        /// Alt key held.
        const ALT = 1 << 2;
        /// Command / super key held.
        const COMMAND = 1 << 3;
        /// Primary mouse button held.
        const BUTTON1 = 1 << 8;
        /// Middle mouse button held.
        const BUTTON2 = 1 << 9;
        /// Secondary mouse button held.
        const BUTTON3 = 1 << 10;
    }
}

/// A semantic event record.
///
/// Events are built by the widget layer and either dispatched immediately with
/// [Display::send_event_now](crate::display::Display::send_event_now) or
/// deferred with [Display::post_event](crate::display::Display::post_event).
#[derive(Clone)]
pub struct Event {
    /// The kind of this event.
    pub kind: EventKind,
    /// The widget the event is delivered to. `None` for display-level events.
    pub widget: Option<WidgetRef>,
    /// An optional item (e.g. a tree item) the event refers to.
    pub item: Option<WidgetRef>,
    /// Milliseconds since the process-wide toolkit epoch.
    pub time: u32,
    /// Kind-specific detail value.
    pub detail: i32,
    /// Pointer x or geometry x.
    pub x: i32,
    /// Pointer y or geometry y.
    pub y: i32,
    /// Geometry width.
    pub width: i32,
    /// Geometry height.
    pub height: i32,
    /// Mouse button number for mouse events.
    pub button: u32,
    /// Native key code for key events.
    pub key_code: u32,
    /// Character produced by key events.
    pub character: Option<char>,
    /// Modifier and button state.
    pub modifiers: Modifiers,
    /// Text payload.
    pub text: Option<String>,
    /// Set to `false` by a listener to veto the operation.
    pub doit: bool,
}

impl Event {
    /// Create an event of the given kind with every payload field zeroed.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            widget: None,
            item: None,
            time: 0,
            detail: 0,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            button: 0,
            key_code: 0,
            character: None,
            modifiers: Modifiers::empty(),
            text: None,
            doit: true,
        }
    }

    /// Create an event targeting `widget`.
    pub fn for_widget(kind: EventKind, widget: WidgetRef) -> Self {
        Self {
            widget: Some(widget),
            ..Self::new(kind)
        }
    }

    /// Set the item.
    pub fn with_item(mut self, item: WidgetRef) -> Self {
        self.item = Some(item);
        self
    }

    /// Set the detail value.
    pub fn with_detail(mut self, detail: i32) -> Self {
        self.detail = detail;
        self
    }

    /// Set the text payload.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Returns `true` if the target or the item has been disposed.
    pub fn is_stale(&self) -> bool {
        let widget_gone = self.widget.as_ref().is_some_and(|w| w.is_disposed());
        let item_gone = self.item.as_ref().is_some_and(|i| i.is_disposed());
        widget_gone || item_gone
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("widget", &self.widget.as_ref().map(|w| w.native_handle()))
            .field("item", &self.item.as_ref().map(|w| w.native_handle()))
            .field("time", &self.time)
            .field("detail", &self.detail)
            .field("doit", &self.doit)
            .finish_non_exhaustive()
    }
}

/// Milliseconds elapsed since the first call in this process, wrapping at `u32::MAX`.
pub fn event_time() -> u32 {
    static EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    (epoch.elapsed().as_millis() % (u32::MAX as u128 + 1)) as u32
}

/// An event listener.
pub type Listener = Rc<dyn Fn(&mut Event)>;

/// Identifies a hooked listener so it can be unhooked later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listeners keyed by event kind, delivered in the order they were hooked.
#[derive(Default)]
pub struct EventTable {
    listeners: IndexMap<EventKind, Vec<(ListenerId, Listener)>>,
    next_id: u64,
}

impl EventTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook `listener` for events of `kind`.
    pub fn hook(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.entry(kind).or_default().push((id, listener));
        id
    }

    /// Unhook a listener. Returns `true` if it was hooked.
    pub fn unhook(&mut self, id: ListenerId) -> bool {
        for list in self.listeners.values_mut() {
            if let Some(index) = list.iter().position(|(lid, _)| *lid == id) {
                list.remove(index);
                return true;
            }
        }
        false
    }

    /// Returns `true` if any listener is hooked for `kind`.
    pub fn hooks(&self, kind: EventKind) -> bool {
        self.listeners.get(&kind).is_some_and(|l| !l.is_empty())
    }

    /// Snapshot of the listeners hooked for `kind`.
    ///
    /// Callers deliver from the snapshot so listeners may hook or unhook while
    /// an event is being delivered.
    pub fn listeners(&self, kind: EventKind) -> Vec<Listener> {
        self.listeners
            .get(&kind)
            .map(|l| l.iter().map(|(_, listener)| listener.clone()).collect())
            .unwrap_or_default()
    }

    /// Remove every listener.
    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Returns `true` if nothing is hooked.
    pub fn is_empty(&self) -> bool {
        self.listeners.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_hook_and_deliver_in_order() {
        let mut table = EventTable::new();
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));

        let o1 = order.clone();
        table.hook(EventKind::Selection, Rc::new(move |_| o1.borrow_mut().push(1)));
        let o2 = order.clone();
        table.hook(EventKind::Selection, Rc::new(move |_| o2.borrow_mut().push(2)));

        let mut event = Event::new(EventKind::Selection);
        for listener in table.listeners(EventKind::Selection) {
            listener(&mut event);
        }
        assert_eq!(*order.borrow(), vec![1, 2]);
        assert!(table.listeners(EventKind::KeyDown).is_empty());
    }

    #[test]
    fn test_unhook() {
        let mut table = EventTable::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let id = table.hook(EventKind::Close, Rc::new(move |_| h.set(h.get() + 1)));
        assert!(table.hooks(EventKind::Close));
        assert!(table.unhook(id));
        assert!(!table.unhook(id));
        assert!(!table.hooks(EventKind::Close));
        assert!(table.is_empty());
    }

    #[test]
    fn test_new_event_defaults() {
        let event = Event::new(EventKind::Custom(7)).with_detail(3).with_text("x");
        assert!(event.doit);
        assert_eq!(event.detail, 3);
        assert_eq!(event.text.as_deref(), Some("x"));
        assert!(!event.is_stale());
    }
}
