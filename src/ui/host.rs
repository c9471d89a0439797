use crate::ui::bridge::{ForegroundExecutor, ForegroundTask};
use crate::ui::waiting::WaitingView;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Host view kind that must be reassigned directly instead of through
/// [`ForegroundHost::set_view`]: the WorldGen config overlay re-runs its own
/// initialization whenever it is shown again.
pub const WORLDGEN_CONFIG_VIEW: &str = "caeruleusTait.WorldGen.gui.screens.WGConfigScreen";

/// A view owned by the host application (menu, overlay, pause screen, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostView {
    /// Host-side type name of the view.
    pub kind: String,
    pub title: String,
}

impl HostView {
    pub fn new(kind: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
        }
    }
}

/// Whatever is currently displayed by the foreground thread.
#[derive(Debug, Clone)]
pub enum View {
    Host(HostView),
    Waiting(WaitingView),
}

impl View {
    /// Whether restoring this view has to bypass the host's normal "set view" path.
    pub fn requires_direct_assignment(&self) -> bool {
        matches!(self, View::Host(view) if view.kind == WORLDGEN_CONFIG_VIEW)
    }

    pub fn as_waiting(&self) -> Option<&WaitingView> {
        match self {
            View::Waiting(waiting) => Some(waiting),
            View::Host(_) => None,
        }
    }
}

/// Services the host application provides to FastQuit.
///
/// Everything except [`is_on_foreground_thread`](Self::is_on_foreground_thread) and
/// [`submit`](Self::submit) is only ever called on the foreground thread.
pub trait ForegroundHost: Send + Sync {
    fn is_on_foreground_thread(&self) -> bool;

    /// Queue a task to run on the foreground thread.
    fn submit(&self, task: ForegroundTask);

    /// Drive exactly one non-blocking iteration of the render/event loop.
    fn tick(&self) -> anyhow::Result<()>;

    fn current_view(&self) -> Option<View>;

    /// Show `view` through the host's normal pathway, with all its side effects.
    fn set_view(&self, view: Option<View>);

    /// Reassign the current view without any side effects.
    fn assign_view(&self, view: Option<View>);

    /// Show a short notification. Hosts without toasts ignore it.
    fn show_toast(&self, _title: &str, _description: &str) {}
}

/// Minimal host without a window: a frame-paced loop that drains foreground tasks.
///
/// Used by the `fastquit` binary and by tests that need a real foreground thread.
pub struct HeadlessHost {
    executor: ForegroundExecutor,
    view: Mutex<Option<View>>,
    frame_time: Duration,
    frames: AtomicU64,
}

impl HeadlessHost {
    /// Create a host whose foreground thread is the calling thread.
    pub fn new(frame_time: Duration) -> Self {
        Self {
            executor: ForegroundExecutor::for_current_thread(),
            view: Mutex::new(None),
            frame_time,
            frames: AtomicU64::new(0),
        }
    }

    fn view(&self) -> MutexGuard<'_, Option<View>> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run queued foreground tasks without rendering a frame.
    pub fn run_pending(&self) -> usize {
        self.executor.run_pending()
    }

    /// Number of frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl ForegroundHost for HeadlessHost {
    fn is_on_foreground_thread(&self) -> bool {
        self.executor.is_on_foreground_thread()
    }

    fn submit(&self, task: ForegroundTask) {
        self.executor.submit_task(task);
    }

    fn tick(&self) -> anyhow::Result<()> {
        self.executor.run_pending();

        let frame = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if frame % 60 == 0 {
            if let Some(waiting) = self.view().as_ref().and_then(View::as_waiting) {
                tracing::info!("{} ({:.0?})", waiting.message(), waiting.elapsed());
            }
        }

        std::thread::sleep(self.frame_time);
        Ok(())
    }

    fn current_view(&self) -> Option<View> {
        self.view().clone()
    }

    fn set_view(&self, view: Option<View>) {
        match &view {
            Some(View::Host(host_view)) => tracing::debug!("Showing view {}", host_view.title),
            Some(View::Waiting(waiting)) => tracing::debug!("Showing view {}", waiting.title()),
            None => tracing::debug!("Clearing view"),
        }
        *self.view() = view;
    }

    fn assign_view(&self, view: Option<View>) {
        *self.view() = view;
    }

    fn show_toast(&self, title: &str, description: &str) {
        tracing::info!("[toast] {}: {}", title, description);
    }
}
