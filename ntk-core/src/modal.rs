//! The modal shell stack.
//!
//! While the stack is non-empty only the topmost modal shell and its
//! ancestors accept input; every other top-level shell is blocked.

use crate::widget::{is_ancestor_or_self, Widget, WidgetRef};
use std::rc::{Rc, Weak};

/// Derived modality of a top-level shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalState {
    /// Not on the stack and not blocked.
    Unconstrained,
    /// Blocked by a modal shell it is not an ancestor of.
    ModalBlocked,
    /// On the stack and accepting input.
    ModalActive,
}

/// Ordered modal shells. The last pushed is innermost.
#[derive(Default)]
pub struct ModalStack {
    shells: Vec<Weak<dyn Widget>>,
}

impl ModalStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, shell: &WidgetRef) -> Option<usize> {
        let target = Rc::downgrade(shell);
        self.shells.iter().position(|w| Weak::ptr_eq(w, &target))
    }

    /// Push `shell` unless already present. Returns `true` if it was added.
    pub fn push(&mut self, shell: &WidgetRef) -> bool {
        if self.position(shell).is_some() {
            return false;
        }
        self.shells.push(Rc::downgrade(shell));
        true
    }

    /// Remove `shell`, keeping the order of the others. Returns `true` if it was present.
    pub fn pop(&mut self, shell: &WidgetRef) -> bool {
        match self.position(shell) {
            Some(index) => {
                self.shells.remove(index);
                true
            },
            None => false,
        }
    }

    /// Drop entries whose shell is gone or disposed. Returns `true` if any were removed.
    pub fn prune(&mut self) -> bool {
        let before = self.shells.len();
        self.shells
            .retain(|w| w.upgrade().is_some_and(|shell| !shell.is_disposed()));
        self.shells.len() != before
    }

    /// The innermost live modal shell.
    pub fn topmost(&mut self) -> Option<WidgetRef> {
        self.prune();
        self.shells.last().and_then(Weak::upgrade)
    }

    /// Returns `true` if `shell` is on the stack.
    pub fn contains(&self, shell: &WidgetRef) -> bool {
        self.position(shell).is_some()
    }

    /// Live modal shells, outermost first.
    pub fn shells(&mut self) -> Vec<WidgetRef> {
        self.prune();
        self.shells.iter().filter_map(Weak::upgrade).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.shells.len()
    }

    /// Returns `true` if the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.shells.is_empty()
    }

    /// Whether `shell` may receive input under the current stack.
    pub fn is_enabled(&mut self, shell: &WidgetRef) -> bool {
        match self.topmost() {
            None => true,
            Some(top) => is_ancestor_or_self(shell, &top),
        }
    }

    /// Returns `true` if `shell` is blocked by a modal shell.
    pub fn is_blocked(&mut self, shell: &WidgetRef) -> bool {
        !self.is_enabled(shell)
    }

    /// The derived state of `shell`.
    pub fn state_of(&mut self, shell: &WidgetRef) -> ModalState {
        if !self.is_enabled(shell) {
            ModalState::ModalBlocked
        } else if self.contains(shell) {
            ModalState::ModalActive
        } else {
            ModalState::Unconstrained
        }
    }

    /// Compute the state of every shell in `shells` against one snapshot of the stack.
    ///
    /// Nothing is notified here; the caller applies the result once the
    /// whole state is known.
    pub fn compute(&mut self, shells: &[WidgetRef]) -> Vec<(WidgetRef, ModalState)> {
        let top = self.topmost();
        shells
            .iter()
            .map(|shell| {
                let enabled = top.as_ref().map_or(true, |top| is_ancestor_or_self(shell, top));
                let state = if !enabled {
                    ModalState::ModalBlocked
                } else if self.contains(shell) {
                    ModalState::ModalActive
                } else {
                    ModalState::Unconstrained
                };
                (shell.clone(), state)
            })
            .collect()
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.shells.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::handle::NativeHandle;
    use crate::widget::{Disposable, EventSource, HasNativeHandle};
    use std::cell::Cell;

    struct Shell {
        parent: Option<WidgetRef>,
        disposed: Cell<bool>,
    }

    impl HasNativeHandle for Shell {
        fn native_handle(&self) -> NativeHandle {
            NativeHandle(1)
        }
    }

    impl Disposable for Shell {
        fn is_disposed(&self) -> bool {
            self.disposed.get()
        }

        fn dispose(&self) {
            self.disposed.set(true);
        }
    }

    impl EventSource for Shell {
        fn handle_event(&self, _event: &mut Event) {}
    }

    impl Widget for Shell {
        fn parent(&self) -> Option<WidgetRef> {
            self.parent.clone()
        }

        fn is_top_level(&self) -> bool {
            true
        }
    }

    fn shell(parent: Option<WidgetRef>) -> WidgetRef {
        Rc::new(Shell {
            parent,
            disposed: Cell::new(false),
        })
    }

    #[test]
    fn test_empty_stack_enables_everything() {
        let mut stack = ModalStack::new();
        let a = shell(None);
        assert!(stack.is_enabled(&a));
        assert_eq!(stack.state_of(&a), ModalState::Unconstrained);
    }

    #[test]
    fn test_push_pop_preserves_order() {
        let mut stack = ModalStack::new();
        let (a, b, c) = (shell(None), shell(None), shell(None));
        assert!(stack.push(&a));
        assert!(stack.push(&b));
        assert!(stack.push(&c));
        assert!(!stack.push(&b));

        assert!(stack.pop(&b));
        let order = stack.shells();
        assert_eq!(order.len(), 2);
        assert!(Rc::ptr_eq(&order[0], &a));
        assert!(Rc::ptr_eq(&order[1], &c));
        assert!(!stack.pop(&b));
    }

    #[test]
    fn test_modal_blocks_unrelated_but_not_ancestors() {
        let mut stack = ModalStack::new();
        let main = shell(None);
        let other = shell(None);
        let dialog = shell(Some(main.clone()));

        stack.push(&dialog);
        assert_eq!(stack.state_of(&dialog), ModalState::ModalActive);
        assert_eq!(stack.state_of(&main), ModalState::Unconstrained);
        assert_eq!(stack.state_of(&other), ModalState::ModalBlocked);

        stack.pop(&dialog);
        assert!(stack.is_enabled(&other));
    }

    #[test]
    fn test_nested_modals() {
        let mut stack = ModalStack::new();
        let main = shell(None);
        let first = shell(Some(main.clone()));
        let second = shell(None);

        stack.push(&first);
        stack.push(&second);
        let states = stack.compute(&[main.clone(), first.clone(), second.clone()]);
        let states: Vec<_> = states.into_iter().map(|(_, s)| s).collect();
        assert_eq!(
            states,
            vec![ModalState::ModalBlocked, ModalState::ModalBlocked, ModalState::ModalActive]
        );

        stack.pop(&second);
        assert!(Rc::ptr_eq(&stack.topmost().unwrap(), &first));
        assert!(stack.is_enabled(&main));
    }

    #[test]
    fn test_disposed_modal_is_pruned() {
        let mut stack = ModalStack::new();
        let main = shell(None);
        let dialog = shell(None);
        stack.push(&dialog);
        assert!(stack.is_blocked(&main));

        dialog.dispose();
        assert!(stack.prune());
        assert!(!stack.prune());
        assert!(stack.topmost().is_none());
        assert!(!stack.is_blocked(&main));
        assert!(stack.is_empty());
    }
}
