//! Events posted for delivery after the current native dispatch.

use crate::event::Event;
use std::cell::RefCell;
use std::collections::VecDeque;

/// FIFO of posted semantic events.
#[derive(Default)]
pub struct DeferredEventQueue {
    events: VecDeque<Event>,
}

impl DeferredEventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn post(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// Remove the oldest event.
    pub fn pop(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop every queued event.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Deliver queued events in FIFO order until the queue is empty.
    ///
    /// The queue is only borrowed while popping, so `deliver` may post more
    /// events; those are delivered in the same run. Events whose widget or
    /// item has been disposed are dropped. Returns the number delivered.
    pub fn run(queue: &RefCell<Self>, mut deliver: impl FnMut(&mut Event)) -> usize {
        let mut delivered = 0;
        loop {
            let Some(mut event) = queue.borrow_mut().pop() else {
                break;
            };
            if event.is_stale() {
                log::trace!("Dropping {:?} for disposed target", event.kind);
                continue;
            }
            deliver(&mut event);
            delivered += 1;
        }
        delivered
    }
}
