//! Deferred execution for unhandled failures.
//!
//! A failure nobody handled must become visible, but never on the call stack
//! of the `dispatch`/`dispatch_error` call that found it. The target hands
//! such work to a [`Defer`] implementation, which runs it on a later turn.
//!
//! | Implementation | Later turn means |
//! |---|---|
//! | [`TokioDefer`] | a task spawned on the current tokio runtime (after a yield); a detached thread when no runtime is running, or when the runtime drops the task unrun |
//! | [`ThreadDefer`] | a detached, named OS thread |
//! | [`DeferQueue`] | whenever the host calls [`DeferQueue::run_pending`] |
//!
//! Deferred work is fire-and-forget: there is no handle and no cancellation.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use tracing::{error, trace, warn};

/// A unit of deferred work.
pub type Deferred = Box<dyn FnOnce() + Send + 'static>;

/// Name given to threads spawned for deferred work.
const THREAD_NAME: &str = "beacon-deferred";

/// A host facility that runs work on a later turn of execution.
///
/// Implementations must not run `task` before `defer` returns.
pub trait Defer: Send + Sync {
    /// Schedule `task` to run later.
    fn defer(&self, task: Deferred);
}

/// Runs deferred work on the ambient tokio runtime.
///
/// Falls back to [`ThreadDefer`] when called outside a runtime. Work whose
/// task is dropped before it runs (the runtime shut down first) is handed
/// to [`ThreadDefer`] as well, so it is never lost silently.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDefer;

impl Defer for TokioDefer {
    fn defer(&self, task: Deferred) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                trace!("deferring onto tokio runtime");
                let guard = RunOnDrop(Some(task));
                // Detached: the join handle is dropped on purpose.
                drop(handle.spawn(async move {
                    tokio::task::yield_now().await;
                    guard.run();
                }));
            }
            Err(_) => ThreadDefer.defer(task),
        }
    }
}

/// Deferred work owned by a tokio task.
///
/// Dropped without having run, it moves the work to a detached thread.
struct RunOnDrop(Option<Deferred>);

impl RunOnDrop {
    fn run(mut self) {
        if let Some(task) = self.0.take() {
            task();
        }
    }
}

impl Drop for RunOnDrop {
    fn drop(&mut self) {
        if let Some(task) = self.0.take() {
            warn!("tokio runtime dropped deferred work, moving it to a thread");
            ThreadDefer.defer(task);
        }
    }
}

/// Runs deferred work on a detached OS thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDefer;

impl Defer for ThreadDefer {
    fn defer(&self, task: Deferred) {
        trace!("deferring onto a detached thread");
        if let Err(e) = std::thread::Builder::new()
            .name(THREAD_NAME.to_owned())
            .spawn(task)
        {
            error!(error = %e, "failed to spawn thread for deferred work");
        }
    }
}

/// An explicit queue of deferred work.
///
/// Nothing runs until the owner calls [`run_pending`](Self::run_pending),
/// which makes each drain one observable "later turn". Suited to
/// single-threaded hosts with their own loop, and to tests.
#[derive(Default)]
pub struct DeferQueue {
    tasks: Mutex<VecDeque<Deferred>>,
}

impl DeferQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Run queued tasks in FIFO order until the queue is empty, including
    /// tasks queued by the tasks themselves. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran: usize = 0;
        loop {
            // The lock is released before the task runs.
            let next = self.tasks.lock().pop_front();
            let Some(task) = next else {
                return ran;
            };
            task();
            ran = ran.saturating_add(1);
        }
    }
}

impl Defer for DeferQueue {
    fn defer(&self, task: Deferred) {
        self.tasks.lock().push_back(task);
    }
}

impl fmt::Debug for DeferQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferQueue")
            .field("pending", &self.pending())
            .finish()
    }
}
