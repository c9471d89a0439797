// ForegroundExecutor - submit-and-block dispatch onto the foreground thread
//
// The foreground thread owns the UI and drives the render loop. Other threads that need
// something done there (most importantly a wait on background saves) push a boxed closure
// onto a queue and block on a oneshot completion; the foreground thread drains the queue
// once per tick.

use crate::ui::host::ForegroundHost;
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Unit of work queued for the foreground thread.
pub type ForegroundTask = Box<dyn FnOnce() + Send + 'static>;

/// The foreground thread dropped a task before running it to completion.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Foreground task was dropped before it completed")]
pub struct TaskDropped;

/// Completion handle for a task submitted to the foreground thread.
pub struct TaskHandle<R> {
    result_rx: oneshot::Receiver<R>,
}

impl<R> TaskHandle<R> {
    /// Block the calling thread until the task has run.
    ///
    /// Must not be called from the foreground thread itself (the task would never run),
    /// nor from inside a tokio runtime.
    pub fn join(self) -> Result<R, TaskDropped> {
        self.result_rx.blocking_recv().map_err(|_| TaskDropped)
    }
}

/// Wrap `task` so its result is delivered through a [`TaskHandle`].
fn wrap<F, R>(task: F) -> (ForegroundTask, TaskHandle<R>)
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (result_tx, result_rx) = oneshot::channel();
    let wrapped: ForegroundTask = Box::new(move || {
        // The submitter may have given up waiting, that's fine
        let _ = result_tx.send(task());
    });
    (wrapped, TaskHandle { result_rx })
}

/// Submit `task` to `host`'s foreground thread and return its completion handle.
///
/// If the task panics or is dropped unrun, [`TaskHandle::join`] reports [`TaskDropped`].
pub fn dispatch<H, F, R>(host: &H, task: F) -> TaskHandle<R>
where
    H: ForegroundHost + ?Sized,
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (wrapped, handle) = wrap(task);
    host.submit(wrapped);
    handle
}

/// Task queue bound to the thread that created it.
///
/// # Example
/// ```ignore
/// let executor = ForegroundExecutor::for_current_thread();
/// let handle = executor.submit(|| 21 * 2);
///
/// // Foreground side, once per frame:
/// executor.run_pending();
/// ```
pub struct ForegroundExecutor {
    foreground: ThreadId,

    task_tx: mpsc::UnboundedSender<ForegroundTask>,

    /// Only ever drained by the foreground thread; the lock is held just long enough to
    /// pop one task so that tasks may themselves drain the queue again.
    task_rx: Mutex<mpsc::UnboundedReceiver<ForegroundTask>>,
}

impl ForegroundExecutor {
    /// Create an executor whose foreground thread is the calling thread.
    pub fn for_current_thread() -> Self {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        Self {
            foreground: thread::current().id(),
            task_tx,
            task_rx: Mutex::new(task_rx),
        }
    }

    pub fn is_on_foreground_thread(&self) -> bool {
        thread::current().id() == self.foreground
    }

    /// Queue a raw task.
    pub fn submit_task(&self, task: ForegroundTask) {
        if self.task_tx.send(task).is_err() {
            tracing::warn!("Foreground queue is closed, dropping task");
        }
    }

    /// Queue `task` and return its completion handle.
    pub fn submit<F, R>(&self, task: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (wrapped, handle) = wrap(task);
        self.submit_task(wrapped);
        handle
    }

    /// Run every queued task. Called by the foreground thread once per tick.
    ///
    /// # Returns
    /// The number of tasks that ran
    pub fn run_pending(&self) -> usize {
        debug_assert!(self.is_on_foreground_thread());

        let mut ran = 0;
        loop {
            let next = self
                .task_rx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .try_recv();

            match next {
                Ok(task) => {
                    task();
                    ran += 1;
                }
                Err(_) => break,
            }
        }

        if ran > 0 {
            tracing::trace!("Ran {} foreground task(s)", ran);
        }
        ran
    }
}
