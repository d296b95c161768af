use super::Display;
use crate::error::{Result, ToolkitError};
use crate::platform::Waker;
use crate::synchronizer::{run_caught, Synchronizer, Work};
use arc_swap::ArcSwap;
use futures::channel::oneshot;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

static NEXT_DISPLAY_ID: AtomicU64 = AtomicU64::new(1);

/// The part of a display other threads may touch.
pub(crate) struct Shared {
    pub(crate) id: u64,
    pub(crate) thread: ThreadId,
    pub(crate) disposed: AtomicBool,
    pub(crate) synchronizer: ArcSwap<Synchronizer>,
    pub(crate) waker: Arc<dyn Waker>,
}

impl Shared {
    pub(crate) fn new(synchronizer: Synchronizer, waker: Arc<dyn Waker>) -> Self {
        Self {
            id: NEXT_DISPLAY_ID.fetch_add(1, Ordering::Relaxed),
            thread: thread::current().id(),
            disposed: AtomicBool::new(false),
            synchronizer: ArcSwap::from_pointee(synchronizer),
            waker,
        }
    }
}

/// A thread-safe handle to a [Display].
///
/// The display itself never leaves its UI thread. Other threads hold a
/// proxy to marshal work onto the UI thread and to wake it.
#[derive(Clone)]
pub struct DisplayProxy {
    pub(crate) shared: Arc<Shared>,
}

impl DisplayProxy {
    /// Process-unique id of the display.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// The UI thread of the display.
    pub fn thread(&self) -> ThreadId {
        self.shared.thread
    }

    /// Returns `true` if called on the display's UI thread.
    pub fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.shared.thread
    }

    /// Returns `true` once the display has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Fails with [ToolkitError::ThreadAccessViolation] off the UI thread and
    /// with [ToolkitError::DeviceDisposed] once the display is disposed.
    pub fn check_device(&self) -> Result<()> {
        if !self.is_ui_thread() {
            return Err(ToolkitError::ThreadAccessViolation);
        }
        if self.is_disposed() {
            return Err(ToolkitError::DeviceDisposed);
        }
        Ok(())
    }

    pub(crate) fn synchronizer(&self) -> Arc<Synchronizer> {
        self.shared.synchronizer.load_full()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(ToolkitError::DeviceDisposed);
        }
        Ok(())
    }

    /// Wake the UI thread if it is sleeping. A no-op on the UI thread.
    pub fn wake(&self) -> Result<()> {
        self.ensure_alive()?;
        if !self.is_ui_thread() {
            self.shared.waker.wake();
        }
        Ok(())
    }

    /// The thread whose [DisplayProxy::sync_exec] is currently running on the UI thread.
    pub fn sync_thread(&self) -> Option<ThreadId> {
        self.synchronizer().sync_thread()
    }

    /// Queue `work` for the UI thread and return at once.
    pub fn async_exec<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.try_async_exec(move || {
            work();
            Ok(())
        })
    }

    /// Like [DisplayProxy::async_exec] with fallible work. Failures are logged.
    pub fn try_async_exec<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.ensure_alive()?;
        let waker = self.shared.waker.clone();
        self.synchronizer()
            .async_exec(Box::new(work), &|| waker.wake())
    }

    /// Run `work` on the UI thread and wait for its result.
    ///
    /// On the UI thread the work runs inline. A panic in the work is
    /// reported as [ToolkitError::ExecutionFailed] on the caller.
    pub fn sync_exec<F, R>(&self, work: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.try_sync_exec(move || Ok(work()))
    }

    /// Like [DisplayProxy::sync_exec] with fallible work. An error returned by
    /// the work is re-raised as [ToolkitError::ExecutionFailed].
    pub fn try_sync_exec<F, R>(&self, work: F) -> Result<R>
    where
        F: FnOnce() -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.sync_exec_inner(None, work)
    }

    /// Like [DisplayProxy::try_sync_exec] but waits at most `timeout`.
    ///
    /// On [ToolkitError::Timeout] the work stays queued and still runs later.
    pub fn sync_exec_timeout<F, R>(&self, timeout: Duration, work: F) -> Result<R>
    where
        F: FnOnce() -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.sync_exec_inner(Some(timeout), work)
    }

    fn sync_exec_inner<F, R>(&self, timeout: Option<Duration>, work: F) -> Result<R>
    where
        F: FnOnce() -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.ensure_alive()?;

        let slot = Arc::new(Mutex::new(None));
        let out = slot.clone();
        let work: Work = Box::new(move || {
            let value = work()?;
            *out.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
            Ok(())
        });

        if self.is_ui_thread() {
            run_caught(work).map_err(ToolkitError::ExecutionFailed)?;
        } else {
            let waker = self.shared.waker.clone();
            let wake = move || waker.wake();
            let synchronizer = self.synchronizer();
            match timeout {
                None => synchronizer.sync_exec(work, &wake)?,
                Some(timeout) => synchronizer.sync_exec_timeout(timeout, work, &wake)?,
            }
        }

        let value = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        value.ok_or(ToolkitError::DeviceDisposed)
    }

    /// Run `f` against the display, which is only possible on its UI thread.
    ///
    /// Off the UI thread this fails with [ToolkitError::ThreadAccessViolation]
    /// without calling `f`.
    pub fn with_display<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Display) -> R,
    {
        self.check_device()?;
        let display = Display::current()
            .filter(|d| Arc::ptr_eq(&d.inner.shared, &self.shared))
            .ok_or(ToolkitError::DeviceDisposed)?;
        Ok(f(&display))
    }

    /// Run `f` on the UI thread and resolve with its result.
    ///
    /// The future resolves with [ToolkitError::DeviceDisposed] if the display
    /// goes away before `f` ran.
    pub fn run_on_ui<F, R>(&self, f: F) -> impl Future<Output = Result<R>>
    where
        F: FnOnce(&Display) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let submitted = self.async_exec(move || {
            if let Some(display) = Display::current() {
                let _ = tx.send(f(&display));
            }
        });

        async move {
            submitted?;
            rx.await.map_err(|_| ToolkitError::DeviceDisposed)
        }
    }

    /// Run `fut` on the background task runner and hand its output to
    /// `on_ui` on the UI thread.
    pub fn spawn_then<Fut, T, F>(&self, fut: Fut, on_ui: F)
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        F: FnOnce(&Display, T) + Send + 'static,
    {
        let proxy = self.clone();
        crate::tasks::spawn(async move {
            let value = fut.await;
            let delivered = proxy.async_exec(move || {
                if let Some(display) = Display::current() {
                    on_ui(&display, value);
                }
            });
            if let Err(err) = delivered {
                log::debug!("Dropping background result: {}", err);
            }
        });
    }
}

impl fmt::Debug for DisplayProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayProxy")
            .field("id", &self.shared.id)
            .field("thread", &self.shared.thread)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
