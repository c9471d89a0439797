// Wait Coordinator - blocks logical progress of the foreground thread on background saves
//
// The foreground thread cannot simply join the save threads: the render loop has to keep
// running so the "still saving" view stays responsive and cancellable. Instead the
// coordinator spins the host's loop one tick at a time and re-checks completion in between.
//
// Calls from other threads are delegated to the foreground thread (submit-and-block), so
// all view and priority mutation happens on one thread.

use crate::config::ConfigManager;
use crate::models::{OperationHandle, PriorityControl};
use crate::ui::bridge::dispatch;
use crate::ui::host::{ForegroundHost, View};
use crate::ui::waiting::WaitingView;
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors raised while waiting for background saves.
#[derive(Error, Debug)]
pub enum WaitError {
    /// The caller is the worker thread of one of the saves it wants to wait for.
    #[error("Tried to wait for \"{level_name}\" from its own save thread")]
    SelfWaitDeadlock { level_name: String },

    #[error("Foreground thread dropped the delegated wait before it completed")]
    ForegroundUnavailable,

    #[error("Foreground tick failed while waiting")]
    Tick(#[source] anyhow::Error),
}

/// States of a single wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Waiting,
    /// The user gave up waiting; the saves may still be running.
    Cancelled,
    /// Every awaited save has finished.
    Done,
}

/// The saves to wait for, plus an optional caller-owned cancellation token.
#[derive(Clone, Default)]
pub struct WaitRequest {
    pub operations: Vec<OperationHandle>,
    pub cancellable: Option<CancellationToken>,
}

impl WaitRequest {
    pub fn new(operations: Vec<OperationHandle>) -> Self {
        Self {
            operations,
            cancellable: None,
        }
    }

    /// Let the user cancel the wait through `token`.
    pub fn cancellable(mut self, token: CancellationToken) -> Self {
        self.cancellable = Some(token);
        self
    }
}

/// `"A" & "B"` style label of the awaited worlds.
pub fn joined_label(operations: &[OperationHandle]) -> String {
    let names: Vec<String> = operations.iter().map(|op| op.level_name()).collect();
    names.join("\" & \"")
}

/// One running wait, advanced one step at a time.
///
/// Each [`advance`](Self::advance) either observes completion, observes cancellation,
/// or drives exactly one host tick.
pub struct WaitSession<'a> {
    operations: &'a [OperationHandle],
    cancellable: Option<&'a CancellationToken>,
    background_priority: u8,
    state: WaitState,
    ticks: usize,
}

impl<'a> WaitSession<'a> {
    pub fn new(
        operations: &'a [OperationHandle],
        cancellable: Option<&'a CancellationToken>,
        background_priority: u8,
    ) -> Self {
        Self {
            operations,
            cancellable,
            background_priority,
            state: WaitState::Waiting,
            ticks: 0,
        }
    }

    pub fn state(&self) -> WaitState {
        self.state
    }

    /// Number of host ticks driven so far.
    pub fn ticks(&self) -> usize {
        self.ticks
    }

    pub fn advance(&mut self, host: &dyn ForegroundHost) -> Result<WaitState, WaitError> {
        if self.state != WaitState::Waiting {
            return Ok(self.state);
        }

        if self.operations.iter().all(|op| op.is_finished()) {
            self.state = WaitState::Done;
        } else if self.cancellable.is_some_and(CancellationToken::is_cancelled) {
            self.restore_background_priority();
            self.state = WaitState::Cancelled;
        } else {
            host.tick().map_err(WaitError::Tick)?;
            self.ticks += 1;
        }

        Ok(self.state)
    }

    fn restore_background_priority(&self) {
        if self.background_priority == 0 {
            return;
        }

        for op in self.operations.iter().filter(|op| !op.is_finished()) {
            op.thread_priority().set_priority(self.background_priority);
        }
    }
}

/// Restores the previously displayed view when dropped.
struct ViewRestore<'a> {
    host: &'a dyn ForegroundHost,
    previous: Option<Option<View>>,
}

impl Drop for ViewRestore<'_> {
    fn drop(&mut self) {
        let Some(previous) = self.previous.take() else {
            return;
        };

        if previous.as_ref().is_some_and(View::requires_direct_assignment) {
            self.host.assign_view(previous);
        } else {
            self.host.set_view(previous);
        }
    }
}

/// Makes the foreground thread wait on background saves without freezing it.
///
/// # Example
/// ```ignore
/// let coordinator = WaitCoordinator::new(host, config);
/// let token = CancellationToken::new();
/// let state = coordinator.wait(WaitRequest::new(saves).cancellable(token))?;
/// ```
#[derive(Clone)]
pub struct WaitCoordinator {
    host: Arc<dyn ForegroundHost>,
    config: Arc<ConfigManager>,
}

impl WaitCoordinator {
    pub fn new(host: Arc<dyn ForegroundHost>, config: Arc<ConfigManager>) -> Self {
        Self { host, config }
    }

    /// Wait for every operation, without cancellation.
    pub fn wait_all(&self, operations: Vec<OperationHandle>) -> Result<WaitState, WaitError> {
        self.wait(WaitRequest::new(operations))
    }

    /// Wait until every operation in `request` has finished or the wait is cancelled.
    ///
    /// An empty request returns [`WaitState::Done`] immediately. Called off the foreground
    /// thread, the wait is submitted to the foreground thread and the caller blocks on it.
    ///
    /// # Errors
    /// - [`WaitError::SelfWaitDeadlock`] if called from one of the awaited worker threads
    /// - [`WaitError::ForegroundUnavailable`] if a delegated wait never ran
    /// - [`WaitError::Tick`] if the host's loop failed; the previous view is still restored
    pub fn wait(&self, request: WaitRequest) -> Result<WaitState, WaitError> {
        if request.operations.is_empty() {
            return Ok(WaitState::Done);
        }

        let current = thread::current().id();
        if let Some(op) = request
            .operations
            .iter()
            .find(|op| op.worker_thread() == current)
        {
            return Err(WaitError::SelfWaitDeadlock {
                level_name: op.level_name(),
            });
        }

        if !self.host.is_on_foreground_thread() {
            tracing::debug!("Delegating wait to the foreground thread");
            let coordinator = self.clone();
            return dispatch(self.host.as_ref(), move || coordinator.wait(request))
                .join()
                .map_err(|_| WaitError::ForegroundUnavailable)?;
        }

        self.wait_on_foreground(request)
    }

    fn wait_on_foreground(&self, request: WaitRequest) -> Result<WaitState, WaitError> {
        let WaitRequest {
            operations,
            cancellable,
        } = request;
        let host = self.host.as_ref();

        let old_view = host.current_view();
        let message = format!("Still saving \"{}\"...", joined_label(&operations));
        tracing::info!("{}", message);

        for op in &operations {
            let priority = op.thread_priority();
            let target = priority.default_priority();
            tracing::debug!(
                "Raising priority of \"{}\" from {} to {}",
                op.level_name(),
                priority.priority(),
                target
            );
            priority.set_priority(target);
        }

        let _restore = ViewRestore {
            host,
            previous: Some(old_view),
        };
        host.set_view(Some(View::Waiting(WaitingView::new(
            message,
            cancellable.clone(),
        ))));

        let background_priority = self.config.settings().background_priority;
        let mut session = WaitSession::new(&operations, cancellable.as_ref(), background_priority);
        loop {
            match session.advance(host)? {
                WaitState::Waiting => continue,
                finished => {
                    tracing::info!(
                        "Wait for {} world(s) ended as {:?} after {} tick(s)",
                        operations.len(),
                        finished,
                        session.ticks()
                    );
                    return Ok(finished);
                }
            }
        }
    }
}
