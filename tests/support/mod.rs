//! Shared fakes for the integration tests.
#![allow(dead_code)]

use anyhow::bail;
use camino::{Utf8Path, Utf8PathBuf};
use fastquit::models::{
    BackgroundOperation, NORM_PRIORITY, OperationId, PriorityControl, StorageSession,
};
use fastquit::ui::{ForegroundHost, ForegroundTask, View};
use fastquit::ConfigManager;
use semver::Version;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use tempfile::TempDir;

/// Config manager in a fresh temp directory. Keep the `TempDir` alive.
pub fn temp_config() -> (Arc<ConfigManager>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let config = ConfigManager::with_version(dir, Version::new(3, 0, 0)).unwrap();
    (Arc::new(config), temp_dir)
}

/// Priority that remembers every write.
#[derive(Default)]
pub struct RecordingPriority {
    current: AtomicU8,
    pub writes: Mutex<Vec<u8>>,
}

impl RecordingPriority {
    pub fn writes(&self) -> Vec<u8> {
        self.writes.lock().unwrap().clone()
    }
}

impl PriorityControl for RecordingPriority {
    fn priority(&self) -> u8 {
        self.current.load(Ordering::SeqCst)
    }

    fn set_priority(&self, priority: u8) {
        self.current.store(priority, Ordering::SeqCst);
        self.writes.lock().unwrap().push(priority);
    }
}

/// Operation finished by the test, never by a real thread.
pub struct FakeOperation {
    id: OperationId,
    level_name: String,
    path: Utf8PathBuf,
    worker: ThreadId,
    finished: AtomicBool,
    pub priority: RecordingPriority,
    pub joins: AtomicUsize,
}

impl FakeOperation {
    pub fn new(level_name: &str) -> Arc<Self> {
        Self::on_thread(level_name, worker_thread_id())
    }

    pub fn on_thread(level_name: &str, worker: ThreadId) -> Arc<Self> {
        Arc::new(Self {
            id: OperationId::next(),
            level_name: level_name.to_string(),
            path: Utf8PathBuf::from(format!("saves/{level_name}")),
            worker,
            finished: AtomicBool::new(false),
            priority: RecordingPriority::default(),
            joins: AtomicUsize::new(0),
        })
    }

    pub fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

/// Id of a thread that is guaranteed not to be the caller.
fn worker_thread_id() -> ThreadId {
    thread::spawn(|| thread::current().id()).join().unwrap()
}

impl BackgroundOperation for FakeOperation {
    fn id(&self) -> OperationId {
        self.id
    }

    fn level_name(&self) -> String {
        self.level_name.clone()
    }

    fn storage_path(&self) -> &Utf8Path {
        &self.path
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn worker_thread(&self) -> ThreadId {
        self.worker
    }

    fn thread_priority(&self) -> &dyn PriorityControl {
        &self.priority
    }

    fn join(&self) -> anyhow::Result<()> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        self.finish();
        Ok(())
    }
}

/// Session that counts how often it gets closed.
pub struct FakeSession {
    path: Utf8PathBuf,
    pub closes: AtomicUsize,
    fail_close: bool,
}

impl FakeSession {
    pub fn new(path: &str) -> Arc<Self> {
        Arc::new(Self {
            path: Utf8PathBuf::from(path),
            closes: AtomicUsize::new(0),
            fail_close: false,
        })
    }

    pub fn failing(path: &str) -> Arc<Self> {
        Arc::new(Self {
            path: Utf8PathBuf::from(path),
            closes: AtomicUsize::new(0),
            fail_close: true,
        })
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl StorageSession for FakeSession {
    fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn close(&self) -> anyhow::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            bail!("file lock is held by another process");
        }
        Ok(())
    }
}

type TickHook = Box<dyn FnMut(usize) + Send>;

/// Foreground host driven entirely by the test through per-tick hooks.
///
/// Every `set_view`/`assign_view` call is recorded as a short description.
pub struct FakeHost {
    foreground: ThreadId,
    ticks: AtomicUsize,
    hooks: Mutex<Vec<TickHook>>,
    fail_on_tick: Option<usize>,
    view: Mutex<Option<View>>,
    pub view_log: Mutex<Vec<String>>,
    pub toasts: Mutex<Vec<String>>,
}

impl FakeHost {
    pub fn new(initial: Option<View>) -> Self {
        Self {
            foreground: thread::current().id(),
            ticks: AtomicUsize::new(0),
            hooks: Mutex::new(Vec::new()),
            fail_on_tick: None,
            view: Mutex::new(initial),
            view_log: Mutex::new(Vec::new()),
            toasts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on_tick(mut self, tick: usize) -> Self {
        self.fail_on_tick = Some(tick);
        self
    }

    /// Run `hook` with the 1-based tick number on every tick.
    pub fn on_tick(&self, hook: impl FnMut(usize) + Send + 'static) {
        self.hooks.lock().unwrap().push(Box::new(hook));
    }

    pub fn ticks(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn view_log(&self) -> Vec<String> {
        self.view_log.lock().unwrap().clone()
    }

    pub fn toasts(&self) -> Vec<String> {
        self.toasts.lock().unwrap().clone()
    }

    fn record(&self, how: &str, view: &Option<View>) {
        let what = match view {
            Some(View::Host(v)) => v.title.clone(),
            Some(View::Waiting(w)) => format!("waiting: {}", w.message()),
            None => "none".to_string(),
        };
        self.view_log.lock().unwrap().push(format!("{how} {what}"));
    }
}

impl ForegroundHost for FakeHost {
    fn is_on_foreground_thread(&self) -> bool {
        thread::current().id() == self.foreground
    }

    fn submit(&self, task: ForegroundTask) {
        task();
    }

    fn tick(&self) -> anyhow::Result<()> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_tick == Some(tick) {
            bail!("render loop crashed on tick {tick}");
        }
        for hook in self.hooks.lock().unwrap().iter_mut() {
            hook(tick);
        }
        Ok(())
    }

    fn current_view(&self) -> Option<View> {
        self.view.lock().unwrap().clone()
    }

    fn set_view(&self, view: Option<View>) {
        self.record("set", &view);
        *self.view.lock().unwrap() = view;
    }

    fn assign_view(&self, view: Option<View>) {
        self.record("assign", &view);
        *self.view.lock().unwrap() = view;
    }

    fn show_toast(&self, title: &str, description: &str) {
        self.toasts
            .lock()
            .unwrap()
            .push(format!("{title}: {description}"));
    }
}

/// Default priority a fake operation reports before anyone writes to it.
pub const UNTOUCHED_PRIORITY: u8 = 0;

/// Priority a wait raises every operation to.
pub const WAITING_PRIORITY: u8 = NORM_PRIORITY;

/// Type-erased handle to a fake operation.
pub fn handle(op: &Arc<FakeOperation>) -> fastquit::OperationHandle {
    op.clone()
}

/// Session whose `close` panics, like a host that throws from its storage layer.
pub struct PanickingSession {
    path: Utf8PathBuf,
}

impl PanickingSession {
    pub fn new(path: &str) -> Arc<Self> {
        Arc::new(Self {
            path: Utf8PathBuf::from(path),
        })
    }
}

impl StorageSession for PanickingSession {
    fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn close(&self) -> anyhow::Result<()> {
        panic!("host close blew up");
    }
}

/// [`HeadlessHost`](fastquit::HeadlessHost) that records the thread every toast is shown on.
pub struct ThreadCheckingHost {
    inner: fastquit::HeadlessHost,
    /// `(toast, shown on the foreground thread)`
    pub toasts: Mutex<Vec<(String, bool)>>,
}

impl ThreadCheckingHost {
    pub fn new() -> Self {
        Self {
            inner: fastquit::HeadlessHost::new(std::time::Duration::from_millis(1)),
            toasts: Mutex::new(Vec::new()),
        }
    }

    pub fn run_pending(&self) -> usize {
        self.inner.run_pending()
    }

    pub fn toasts(&self) -> Vec<(String, bool)> {
        self.toasts.lock().unwrap().clone()
    }
}

impl ForegroundHost for ThreadCheckingHost {
    fn is_on_foreground_thread(&self) -> bool {
        self.inner.is_on_foreground_thread()
    }

    fn submit(&self, task: ForegroundTask) {
        self.inner.submit(task);
    }

    fn tick(&self) -> anyhow::Result<()> {
        self.inner.tick()
    }

    fn current_view(&self) -> Option<View> {
        self.inner.current_view()
    }

    fn set_view(&self, view: Option<View>) {
        self.inner.set_view(view);
    }

    fn assign_view(&self, view: Option<View>) {
        self.inner.assign_view(view);
    }

    fn show_toast(&self, title: &str, description: &str) {
        let on_foreground = self.is_on_foreground_thread();
        self.toasts
            .lock()
            .unwrap()
            .push((format!("{title}: {description}"), on_foreground));
    }
}
