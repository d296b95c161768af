use crate::handle::NativeHandle;
use crate::platform::MessageKind;
use indexmap::IndexMap;
use std::rc::Rc;

/// What happens to a message after an interceptor saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Pass the message on to the next interceptor, then the widget.
    Continue,
    /// Consume the message. The value becomes the message result.
    Handled(isize),
}

/// A message interceptor for a single native handle.
///
/// Interceptors run in registration order before the widget's own
/// [handle_message](crate::widget::EventSource::handle_message), and can
/// consume a message so neither the widget nor the backend's default
/// procedure see it.
///
/// Interceptors are shared, so they take `&self`. Use interior mutability
/// for state.
pub trait Interceptor {
    /// The interceptor name.
    ///
    /// Unique per chain; registering a second interceptor with the same name
    /// replaces the first.
    fn name(&self) -> &'static str;

    /// Called when the interceptor is added to the chain of `handle`.
    fn on_register(&self, _handle: NativeHandle) {}

    /// Called when the interceptor is removed from the chain of `handle`.
    fn on_unregister(&self, _handle: NativeHandle) {}

    /// Inspect a message addressed to `handle`.
    fn intercept(&self, handle: NativeHandle, kind: &MessageKind) -> Flow;
}

/// An [Interceptor] built from a closure.
pub struct FnInterceptor<F> {
    name: &'static str,
    f: F,
}

impl<F> FnInterceptor<F>
where
    F: Fn(NativeHandle, &MessageKind) -> Flow,
{
    /// Wrap `f` under `name`.
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> Interceptor for FnInterceptor<F>
where
    F: Fn(NativeHandle, &MessageKind) -> Flow,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn intercept(&self, handle: NativeHandle, kind: &MessageKind) -> Flow {
        (self.f)(handle, kind)
    }
}

/// The ordered interceptors of one native handle.
pub struct InterceptorChain {
    handle: NativeHandle,
    interceptors: IndexMap<&'static str, Rc<dyn Interceptor>>,
}

impl InterceptorChain {
    /// Creates a new empty chain for `handle`.
    pub fn new(handle: NativeHandle) -> Self {
        Self {
            handle,
            interceptors: IndexMap::new(),
        }
    }

    /// Appends an interceptor, replacing one with the same name.
    pub fn register(&mut self, interceptor: Rc<dyn Interceptor>) {
        interceptor.on_register(self.handle);

        if let Some(old) = self.interceptors.insert(interceptor.name(), interceptor) {
            old.on_unregister(self.handle);
        }
    }

    /// Removes an interceptor. Returns `true` if it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        match self.interceptors.shift_remove(name) {
            Some(interceptor) => {
                interceptor.on_unregister(self.handle);
                true
            },
            None => false,
        }
    }

    /// Removes all interceptors.
    pub fn clear(&mut self) {
        for (_, interceptor) in self.interceptors.drain(..) {
            interceptor.on_unregister(self.handle);
        }
    }

    /// Returns `true` if no interceptor is registered.
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// The interceptors in order, detached from the chain so they can run
    /// while the chain itself is modified.
    pub fn snapshot(&self) -> Vec<Rc<dyn Interceptor>> {
        self.interceptors.values().cloned().collect()
    }
}

/// Run `interceptors` in order until one consumes the message.
pub fn run(interceptors: &[Rc<dyn Interceptor>], handle: NativeHandle, kind: &MessageKind) -> Flow {
    for interceptor in interceptors {
        if let Flow::Handled(result) = interceptor.intercept(handle, kind) {
            log::trace!("{} consumed {:?} for {}", interceptor.name(), kind, handle);
            return Flow::Handled(result);
        }
    }
    Flow::Continue
}
