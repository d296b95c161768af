//! Cross-thread work marshaling onto the UI thread.
//!
//! The [Synchronizer] is the only queue of the display that other threads
//! touch. Work submitted with [Synchronizer::async_exec] returns at once;
//! work submitted with [Synchronizer::sync_exec] blocks the submitter until
//! the UI thread has run it (or the synchronizer is released).

use crate::config::{DrainPolicy, SynchronizerConfig};
use crate::error::{Result, ToolkitError};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

/// A unit of work run on the UI thread.
pub type Work = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

enum CompletionState {
    Pending,
    Done,
    Failed(anyhow::Error),
    Cancelled,
}

struct Completion {
    state: Mutex<CompletionState>,
    cond: Condvar,
}

impl Completion {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CompletionState::Pending),
            cond: Condvar::new(),
        })
    }

    fn finish(&self, state: CompletionState) {
        *lock(&self.state) = state;
        self.cond.notify_all();
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        let guard = lock(&self.state);
        let pending = |s: &mut CompletionState| matches!(s, CompletionState::Pending);
        let mut guard = match timeout {
            None => self
                .cond
                .wait_while(guard, pending)
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                let (guard, result) = self
                    .cond
                    .wait_timeout_while(guard, timeout, pending)
                    .unwrap_or_else(PoisonError::into_inner);
                if result.timed_out() {
                    return Err(ToolkitError::Timeout);
                }
                guard
            },
        };

        match std::mem::replace(&mut *guard, CompletionState::Done) {
            CompletionState::Done => Ok(()),
            CompletionState::Failed(err) => Err(ToolkitError::ExecutionFailed(err)),
            CompletionState::Cancelled | CompletionState::Pending => {
                Err(ToolkitError::DeviceDisposed)
            },
        }
    }
}

struct WorkItem {
    thread: ThreadId,
    work: Work,
    completion: Option<Arc<Completion>>,
}

#[derive(Default)]
struct Queue {
    items: VecDeque<WorkItem>,
    released: bool,
    /// Set when released by a transfer; late submissions go here.
    successor: Option<Arc<Synchronizer>>,
}

/// FIFO of work items waiting for the UI thread.
pub struct Synchronizer {
    queue: Mutex<Queue>,
    sync_thread: Mutex<Option<ThreadId>>,
    drain: DrainPolicy,
}

impl Synchronizer {
    /// Create a synchronizer with the given configuration.
    pub fn new(config: SynchronizerConfig) -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            sync_thread: Mutex::new(None),
            drain: config.drain,
        }
    }

    /// The configured drain policy.
    pub fn drain_policy(&self) -> DrainPolicy {
        self.drain
    }

    /// Queue `work` and call `wake`. Returns without waiting.
    pub fn async_exec(&self, work: Work, wake: &dyn Fn()) -> Result<()> {
        self.push(work, None)?;
        wake();
        Ok(())
    }

    /// Queue `work`, call `wake` and block until the UI thread has run it.
    ///
    /// Must not be called on the UI thread, which would deadlock. The
    /// display runs such work inline instead.
    pub fn sync_exec(&self, work: Work, wake: &dyn Fn()) -> Result<()> {
        let completion = Completion::new();
        self.push(work, Some(completion.clone()))?;
        wake();
        completion.wait(None)
    }

    /// Like [Synchronizer::sync_exec] but gives up after `timeout`.
    ///
    /// On [ToolkitError::Timeout] the work stays queued and still runs.
    pub fn sync_exec_timeout(&self, timeout: Duration, work: Work, wake: &dyn Fn()) -> Result<()> {
        let completion = Completion::new();
        self.push(work, Some(completion.clone()))?;
        wake();
        completion.wait(Some(timeout))
    }

    fn push(&self, work: Work, completion: Option<Arc<Completion>>) -> Result<()> {
        let mut queue = lock(&self.queue);
        if queue.released {
            let successor = queue.successor.clone();
            drop(queue);
            return match successor {
                Some(next) => next.push(work, completion),
                None => Err(ToolkitError::DeviceDisposed),
            };
        }
        queue.items.push_back(WorkItem {
            thread: thread::current().id(),
            work,
            completion,
        });
        log::trace!("Queued work item ({} pending)", queue.items.len());
        Ok(())
    }

    /// Run queued work on the calling (UI) thread according to the drain
    /// policy. Returns `true` if at least one item ran.
    pub fn run_async_messages(&self) -> bool {
        let budget = match self.drain {
            DrainPolicy::Snapshot => lock(&self.queue).items.len(),
            DrainPolicy::Single => 1,
        };

        let mut ran = false;
        for _ in 0..budget {
            let Some(item) = lock(&self.queue).items.pop_front() else {
                break;
            };
            self.run_item(item);
            ran = true;
        }
        ran
    }

    fn run_item(&self, item: WorkItem) {
        let WorkItem {
            thread,
            work,
            completion,
        } = item;

        match completion {
            Some(completion) => {
                *lock(&self.sync_thread) = Some(thread);
                let outcome = run_caught(work);
                *lock(&self.sync_thread) = None;
                completion.finish(match outcome {
                    Ok(()) => CompletionState::Done,
                    Err(err) => CompletionState::Failed(err),
                });
            },
            None => {
                if let Err(err) = run_caught(work) {
                    log::error!("Async work item from {:?} failed: {:#}", thread, err);
                }
            },
        }
    }

    /// The thread whose blocking submission is currently running, if any.
    pub fn sync_thread(&self) -> Option<ThreadId> {
        *lock(&self.sync_thread)
    }

    /// Returns `true` if work is waiting.
    pub fn has_pending(&self) -> bool {
        !lock(&self.queue).items.is_empty()
    }

    /// Number of waiting items.
    pub fn pending(&self) -> usize {
        lock(&self.queue).items.len()
    }

    /// Returns `true` once [Synchronizer::release] has run.
    pub fn is_released(&self) -> bool {
        lock(&self.queue).released
    }

    /// Stop accepting work. Pending async items are dropped; blocked
    /// submitters are woken with [ToolkitError::DeviceDisposed].
    pub fn release(&self) {
        let items = {
            let mut queue = lock(&self.queue);
            if queue.released {
                return;
            }
            queue.released = true;
            std::mem::take(&mut queue.items)
        };

        if !items.is_empty() {
            log::debug!("Discarding {} pending work item(s)", items.len());
        }
        for item in items {
            if let Some(completion) = item.completion {
                completion.finish(CompletionState::Cancelled);
            }
        }
    }

    /// Move every pending item into `other` and release this synchronizer.
    ///
    /// Used when the display's synchronizer is replaced. Items keep their
    /// submitting thread and blocked submitters keep waiting on `other`.
    /// Work submitted here afterwards is forwarded to `other`, behind the
    /// transferred items.
    pub fn transfer_to(&self, other: &Arc<Synchronizer>) {
        let mut queue = lock(&self.queue);
        queue.released = true;
        let items = std::mem::take(&mut queue.items);

        let mut target = lock(&other.queue);
        if target.released {
            drop(target);
            drop(queue);
            for item in items {
                if let Some(completion) = item.completion {
                    completion.finish(CompletionState::Cancelled);
                }
            }
            return;
        }
        target.items.extend(items);
        queue.successor = Some(other.clone());
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new(SynchronizerConfig::default())
    }
}

/// Run `work`, turning both error returns and panics into an error.
pub(crate) fn run_caught<F>(work: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!("work panicked: {}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    fn noop() {}

    fn pump_until(sync: &Synchronizer, done: &AtomicBool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "pump timed out");
            if !sync.run_async_messages() {
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    #[test]
    fn test_async_items_run_in_order() {
        let sync = Synchronizer::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            sync.async_exec(
                Box::new(move || {
                    log.lock().unwrap().push(i);
                    Ok(())
                }),
                &noop,
            )
            .unwrap();
        }

        assert!(sync.run_async_messages());
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert!(!sync.run_async_messages());
    }

    #[test]
    fn test_snapshot_defers_items_queued_while_draining() {
        let sync = Arc::new(Synchronizer::default());
        let ran = Arc::new(AtomicUsize::new(0));

        let inner_sync = sync.clone();
        let inner_ran = ran.clone();
        sync.async_exec(
            Box::new(move || {
                let ran = inner_ran.clone();
                inner_sync.async_exec(
                    Box::new(move || {
                        ran.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                    &noop,
                )?;
                inner_ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            &noop,
        )
        .unwrap();

        assert!(sync.run_async_messages());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(sync.has_pending());
        assert!(sync.run_async_messages());
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_single_policy_runs_one_item() {
        let sync = Synchronizer::new(SynchronizerConfig {
            drain: DrainPolicy::Single,
        });
        for _ in 0..2 {
            sync.async_exec(Box::new(|| Ok(())), &noop).unwrap();
        }
        assert!(sync.run_async_messages());
        assert_eq!(sync.pending(), 1);
    }

    #[test]
    fn test_async_failure_is_swallowed() {
        let sync = Synchronizer::default();
        let after = Arc::new(AtomicBool::new(false));
        sync.async_exec(Box::new(|| anyhow::bail!("boom")), &noop).unwrap();
        sync.async_exec(Box::new(|| -> anyhow::Result<()> { panic!("kaboom") }), &noop)
            .unwrap();
        let flag = after.clone();
        sync.async_exec(
            Box::new(move || {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }),
            &noop,
        )
        .unwrap();

        assert!(sync.run_async_messages());
        assert!(after.load(Ordering::SeqCst));
    }

    #[test]
    fn test_sync_exec_blocks_until_run() {
        let sync = Arc::new(Synchronizer::default());
        let done = Arc::new(AtomicBool::new(false));
        let observed = Arc::new(Mutex::new(None));

        let worker = {
            let sync = sync.clone();
            let done = done.clone();
            let observed = observed.clone();
            let probe = sync.clone();
            thread::spawn(move || {
                let me = thread::current().id();
                let result = sync.sync_exec(
                    Box::new(move || {
                        *observed.lock().unwrap() = probe.sync_thread();
                        Ok(())
                    }),
                    &noop,
                );
                done.store(true, Ordering::SeqCst);
                (me, result)
            })
        };

        pump_until(&sync, &done);
        let (worker_id, result) = worker.join().unwrap();
        assert!(result.is_ok());
        assert_eq!(*observed.lock().unwrap(), Some(worker_id));
        assert_eq!(sync.sync_thread(), None);
    }

    #[test]
    fn test_sync_exec_failure_is_reraised() {
        let sync = Arc::new(Synchronizer::default());
        let done = Arc::new(AtomicBool::new(false));

        let worker = {
            let sync = sync.clone();
            let done = done.clone();
            thread::spawn(move || {
                let result = sync.sync_exec(Box::new(|| anyhow::bail!("bad input")), &noop);
                done.store(true, Ordering::SeqCst);
                result
            })
        };

        pump_until(&sync, &done);
        match worker.join().unwrap() {
            Err(ToolkitError::ExecutionFailed(err)) => assert!(err.to_string().contains("bad input")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_release_unblocks_waiters() {
        let sync = Arc::new(Synchronizer::default());
        let worker = {
            let sync = sync.clone();
            thread::spawn(move || sync.sync_exec(Box::new(|| Ok(())), &noop))
        };

        while !sync.has_pending() {
            thread::sleep(Duration::from_millis(1));
        }
        sync.release();

        assert!(matches!(worker.join().unwrap(), Err(ToolkitError::DeviceDisposed)));
        assert!(matches!(
            sync.async_exec(Box::new(|| Ok(())), &noop),
            Err(ToolkitError::DeviceDisposed)
        ));
        assert!(sync.is_released());
    }

    #[test]
    fn test_sync_exec_timeout_leaves_item_queued() {
        let sync = Synchronizer::default();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        let result = sync.sync_exec_timeout(
            Duration::from_millis(10),
            Box::new(move || {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }),
            &noop,
        );
        assert!(matches!(result, Err(ToolkitError::Timeout)));
        assert!(sync.run_async_messages());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_transfer_keeps_items() {
        let old = Synchronizer::default();
        let new = Arc::new(Synchronizer::default());
        old.async_exec(Box::new(|| Ok(())), &noop).unwrap();

        old.transfer_to(&new);
        assert!(old.is_released());
        assert_eq!(new.pending(), 1);
    }

    #[test]
    fn test_late_submissions_follow_transfer() {
        let old = Synchronizer::default();
        let middle = Arc::new(Synchronizer::default());
        let last = Arc::new(Synchronizer::default());
        let order = Arc::new(Mutex::new(Vec::new()));

        let log = order.clone();
        old.async_exec(
            Box::new(move || {
                lock(&log).push(1);
                Ok(())
            }),
            &noop,
        )
        .unwrap();
        old.transfer_to(&middle);
        middle.transfer_to(&last);

        let log = order.clone();
        old.async_exec(
            Box::new(move || {
                lock(&log).push(2);
                Ok(())
            }),
            &noop,
        )
        .unwrap();
        assert_eq!(last.pending(), 2);
        assert!(last.run_async_messages());
        assert_eq!(*lock(&order), vec![1, 2]);

        last.release();
        let result = old.async_exec(Box::new(|| Ok(())), &noop);
        assert!(matches!(result, Err(ToolkitError::DeviceDisposed)));
    }

    #[test]
    fn test_transfer_to_released_target_cancels() {
        let old = Synchronizer::default();
        let new = Arc::new(Synchronizer::default());
        new.release();
        old.async_exec(Box::new(|| Ok(())), &noop).unwrap();

        old.transfer_to(&new);
        assert_eq!(new.pending(), 0);
        assert!(old.async_exec(Box::new(|| Ok(())), &noop).is_err());
    }

    #[test]
    fn test_wake_called_on_submit() {
        let sync = Synchronizer::default();
        let woken = AtomicUsize::new(0);
        let wake = || {
            woken.fetch_add(1, Ordering::SeqCst);
        };
        sync.async_exec(Box::new(|| Ok(())), &wake).unwrap();
        assert_eq!(woken.load(Ordering::SeqCst), 1);
    }
}
