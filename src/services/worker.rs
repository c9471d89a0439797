use crate::models::{
    BackgroundOperation, MAX_PRIORITY, MIN_PRIORITY, NORM_PRIORITY, OperationId, PriorityControl,
};
use crate::services::panic_message;
use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tokio::sync::oneshot;

/// Priority of a [`ThreadedSave`]'s worker.
///
/// std threads have no portable priority API, so the value is advisory: the save closure
/// reads it through [`SaveContext::pace`] and yields accordingly.
#[derive(Debug)]
pub struct AtomicPriority(AtomicU8);

impl AtomicPriority {
    pub fn new(priority: u8) -> Self {
        Self(AtomicU8::new(priority))
    }
}

impl PriorityControl for AtomicPriority {
    fn priority(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }

    /// Out-of-range values are clamped into `MIN_PRIORITY..=MAX_PRIORITY`.
    fn set_priority(&self, priority: u8) {
        self.0
            .store(priority.clamp(MIN_PRIORITY, MAX_PRIORITY), Ordering::Relaxed);
    }
}

/// What a save closure gets to see of its own operation.
pub struct SaveContext {
    id: OperationId,
    level_name: String,
    priority: Arc<AtomicPriority>,
}

impl SaveContext {
    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn level_name(&self) -> &str {
        &self.level_name
    }

    pub fn priority(&self) -> u8 {
        self.priority.priority()
    }

    /// Cooperative throttle, called between units of save work. Below normal priority
    /// the worker backs off one millisecond per missing priority step.
    pub fn pace(&self) {
        let priority = self.priority();
        if priority < NORM_PRIORITY {
            thread::sleep(Duration::from_millis(u64::from(NORM_PRIORITY - priority)));
        } else {
            thread::yield_now();
        }
    }
}

/// A background save running on its own named thread.
///
/// The worker blocks on a start gate until [`start`](Self::start) is called, so the
/// owner can register the save before it can possibly finish. On completion the worker
/// runs the finish callback *before* flipping [`is_finished`](BackgroundOperation::is_finished),
/// so bookkeeping done in the callback is visible to anyone observing completion.
pub struct ThreadedSave {
    id: OperationId,
    level_name: String,
    storage_path: Utf8PathBuf,
    worker: ThreadId,
    finished: Arc<AtomicBool>,
    priority: Arc<AtomicPriority>,
    start_gate: Mutex<Option<oneshot::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl ThreadedSave {
    /// Spawn a gated save thread.
    ///
    /// # Arguments
    /// * `level_name` - World name, used for the thread name and logging
    /// * `storage_path` - Directory the world lives in
    /// * `save` - The save itself; panics are caught and reported as errors
    /// * `on_finished` - Runs on the worker once `save` returns, before completion is visible.
    ///   A panic here is logged and does not keep the save from finishing
    pub fn spawn<S, C>(
        level_name: impl Into<String>,
        storage_path: impl Into<Utf8PathBuf>,
        save: S,
        on_finished: C,
    ) -> Result<Arc<Self>>
    where
        S: FnOnce(&SaveContext) -> Result<()> + Send + 'static,
        C: FnOnce(OperationId) + Send + 'static,
    {
        let id = OperationId::next();
        let level_name = level_name.into();
        let finished = Arc::new(AtomicBool::new(false));
        let priority = Arc::new(AtomicPriority::new(NORM_PRIORITY));
        let (gate_tx, gate_rx) = oneshot::channel::<()>();

        let context = SaveContext {
            id,
            level_name: level_name.clone(),
            priority: priority.clone(),
        };
        let worker_finished = finished.clone();

        let handle = thread::Builder::new()
            .name(format!("save-{level_name}"))
            .spawn(move || {
                // A dropped gate means the owner went away; save anyway
                let _ = gate_rx.blocking_recv();
                tracing::debug!("Saving \"{}\" ({})", context.level_name, context.id);

                let result = panic::catch_unwind(AssertUnwindSafe(|| save(&context)))
                    .unwrap_or_else(|payload| {
                        Err(anyhow!("save panicked: {}", panic_message(payload.as_ref())))
                    });
                if let Err(e) = &result {
                    tracing::error!("Saving \"{}\" failed: {:#}", context.level_name, e);
                }

                // Completion must become visible even if the callback panics
                if let Err(payload) =
                    panic::catch_unwind(AssertUnwindSafe(|| on_finished(context.id)))
                {
                    tracing::error!(
                        "Finish callback for \"{}\" panicked: {}",
                        context.level_name,
                        panic_message(payload.as_ref())
                    );
                }
                worker_finished.store(true, Ordering::SeqCst);
                result
            })
            .with_context(|| format!("Failed to spawn save thread for \"{level_name}\""))?;

        Ok(Arc::new(Self {
            id,
            level_name,
            storage_path: storage_path.into(),
            worker: handle.thread().id(),
            finished,
            priority,
            start_gate: Mutex::new(Some(gate_tx)),
            handle: Mutex::new(Some(handle)),
        }))
    }

    /// Open the start gate. Calling it again is a no-op.
    pub fn start(&self) {
        let gate = self
            .start_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(gate) = gate {
            let _ = gate.send(());
        }
    }
}

impl BackgroundOperation for ThreadedSave {
    fn id(&self) -> OperationId {
        self.id
    }

    fn level_name(&self) -> String {
        self.level_name.clone()
    }

    fn storage_path(&self) -> &Utf8Path {
        &self.storage_path
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn worker_thread(&self) -> ThreadId {
        self.worker
    }

    fn thread_priority(&self) -> &dyn PriorityControl {
        self.priority.as_ref()
    }

    /// Block until the worker exits. Opens the start gate first so a never-started
    /// save cannot hang the join. Joining twice returns `Ok` the second time.
    fn join(&self) -> Result<()> {
        self.start();

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => handle.join().map_err(|payload| {
                anyhow!("save thread panicked: {}", panic_message(payload.as_ref()))
            })?,
            None => Ok(()),
        }
    }
}
