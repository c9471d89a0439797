use camino::Utf8Path;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;
use std::time::Instant;

/// Lowest scheduling priority a worker thread can be given.
pub const MIN_PRIORITY: u8 = 1;

/// Priority a worker runs at while the user is actively waiting for it.
pub const NORM_PRIORITY: u8 = 5;

/// Highest scheduling priority a worker thread can be given.
///
/// `backgroundPriority` in the config file is clamped into `0..=MAX_PRIORITY`,
/// where 0 means "leave the priority unchanged".
pub const MAX_PRIORITY: u8 = 10;

/// Process-unique identity of a background operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Scheduling priority of the thread behind a background operation.
///
/// Real thread priorities are platform specific, so the coordinator only ever talks to
/// this capability. Tests substitute a mock.
#[cfg_attr(test, mockall::automock)]
pub trait PriorityControl: Send + Sync {
    /// Current priority of the worker thread.
    fn priority(&self) -> u8;

    /// Change the priority of the worker thread.
    fn set_priority(&self, priority: u8);

    /// Priority used while the foreground is waiting on the worker.
    fn default_priority(&self) -> u8 {
        NORM_PRIORITY
    }
}

/// Opaque handle to a long-running save.
///
/// The save itself is not this crate's business: all the coordinator needs is a way to
/// observe completion, name the world, steer the worker's priority and, as a last
/// resort, block on the worker thread.
pub trait BackgroundOperation: Send + Sync {
    fn id(&self) -> OperationId;

    /// Name of the world (level) being saved.
    fn level_name(&self) -> String;

    /// Directory the world is stored in.
    fn storage_path(&self) -> &Utf8Path;

    /// Completion predicate.
    fn is_finished(&self) -> bool;

    /// Thread performing the save. Waiting on the operation from this thread deadlocks.
    fn worker_thread(&self) -> ThreadId;

    fn thread_priority(&self) -> &dyn PriorityControl;

    /// Raw blocking join on the worker thread.
    fn join(&self) -> anyhow::Result<()>;
}

/// Shared handle to a background operation.
pub type OperationHandle = Arc<dyn BackgroundOperation>;

/// Exclusive-use handle over a storage location.
pub trait StorageSession: Send + Sync {
    fn path(&self) -> &Utf8Path;

    /// Physically release the underlying storage handle.
    fn close(&self) -> anyhow::Result<()>;
}

/// Shared handle to a storage session.
pub type SessionHandle = Arc<dyn StorageSession>;

/// Pointer identity of two sessions, ignoring vtables.
pub fn same_session(a: &SessionHandle, b: &SessionHandle) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Metadata tracked for every world that is currently saving.
#[derive(Clone)]
pub struct SavingWorldEntry {
    /// Set once the world's data is scheduled for deletion, so the post-save cleanup
    /// knows not to touch it again.
    pub deleted: bool,
    /// Session borrowed by the save, released when the save completes.
    pub session: Option<SessionHandle>,
    pub started_at: Instant,
}

impl SavingWorldEntry {
    pub fn new(session: Option<SessionHandle>) -> Self {
        Self {
            deleted: false,
            session,
            started_at: Instant::now(),
        }
    }
}

impl Default for SavingWorldEntry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for SavingWorldEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavingWorldEntry")
            .field("deleted", &self.deleted)
            .field("session", &self.session.as_ref().map(|s| s.path().to_owned()))
            .field("started_at", &self.started_at)
            .finish()
    }
}
