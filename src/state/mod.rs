// Saving-world registry
//
// Tracks every world currently saving in the background. The registry is shared between
// the foreground thread (which iterates snapshots while waiting) and worker threads (whose
// completion callbacks unregister their saves), so all access goes through one coarse lock.

pub mod sessions;

use crate::models::{OperationHandle, OperationId, SavingWorldEntry};
use camino::Utf8Path;
use indexmap::IndexMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::broadcast;

pub use sessions::{SessionRegistry, SessionRelease};

/// Change events emitted by [`SavingWorldRegistry`].
#[derive(Clone, Debug, PartialEq)]
pub enum RegistryChange {
    /// A save started and is now tracked
    Registered {
        id: OperationId,
        level_name: String,
    },

    /// The world behind a running save was scheduled for deletion
    MarkedDeleted { id: OperationId },

    /// A save completed and is no longer tracked
    Unregistered { id: OperationId, deleted: bool },

    /// The registry went from empty to non-empty
    SavingStarted,

    /// The registry became empty again
    AllSaved,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Operation {0} is already registered")]
    DuplicateOperation(OperationId),
}

/// A tracked save: the operation handle plus its registry metadata.
#[derive(Clone)]
pub struct TrackedSave {
    pub operation: OperationHandle,
    pub entry: SavingWorldEntry,
}

impl fmt::Debug for TrackedSave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedSave")
            .field("id", &self.operation.id())
            .field("level_name", &self.operation.level_name())
            .field("entry", &self.entry)
            .finish()
    }
}

/// Thread-safe map from running saves to their [`SavingWorldEntry`].
///
/// Entries keep insertion order, so snapshots (and the labels built from them) are
/// deterministic. Iteration never happens under the lock: callers take a
/// [`snapshot_keys`](Self::snapshot_keys) copy and work on that.
pub struct SavingWorldRegistry {
    worlds: RwLock<IndexMap<OperationId, TrackedSave>>,

    /// Broadcast channel for registry change events
    change_tx: broadcast::Sender<RegistryChange>,
}

impl SavingWorldRegistry {
    /// Create an empty registry with a change buffer of 100 events
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(100);
        Self {
            worlds: RwLock::new(IndexMap::new()),
            change_tx,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<OperationId, TrackedSave>> {
        self.worlds.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<OperationId, TrackedSave>> {
        self.worlds.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, change: RegistryChange) {
        // Nobody listening is fine
        let _ = self.change_tx.send(change);
    }

    /// Start tracking `operation`.
    ///
    /// # Errors
    /// [`RegistryError::DuplicateOperation`] if the operation is already tracked; the
    /// existing entry is left untouched.
    pub fn register(
        &self,
        operation: OperationHandle,
        entry: SavingWorldEntry,
    ) -> Result<(), RegistryError> {
        let id = operation.id();
        let mut worlds = self.write();

        if worlds.contains_key(&id) {
            return Err(RegistryError::DuplicateOperation(id));
        }

        let level_name = operation.level_name();
        worlds.insert(id, TrackedSave { operation, entry });
        tracing::debug!("Registered saving world \"{}\" ({})", level_name, id);

        self.emit(RegistryChange::Registered { id, level_name });
        if worlds.len() == 1 {
            self.emit(RegistryChange::SavingStarted);
        }
        Ok(())
    }

    /// Flag the world behind `id` as deleted. No-op if the save is not tracked.
    pub fn mark_deleted(&self, id: OperationId) -> bool {
        let mut worlds = self.write();
        match worlds.get_mut(&id) {
            Some(tracked) => {
                tracked.entry.deleted = true;
                self.emit(RegistryChange::MarkedDeleted { id });
                true
            }
            None => false,
        }
    }

    /// Stop tracking `id`. Absence is expected when completions race.
    pub fn unregister(&self, id: OperationId) -> Option<SavingWorldEntry> {
        self.unregister_with(id, |_| {})
    }

    /// Stop tracking `id`, running `reconcile` on the entry before it is removed.
    ///
    /// `reconcile` runs under the registry's write lock, so nobody can observe the entry
    /// gone while its session is still unreconciled. It must not call back into the
    /// registry.
    pub fn unregister_with<F>(&self, id: OperationId, reconcile: F) -> Option<SavingWorldEntry>
    where
        F: FnOnce(&SavingWorldEntry),
    {
        let mut worlds = self.write();
        let tracked = worlds.get(&id)?;
        reconcile(&tracked.entry);

        let tracked = worlds.shift_remove(&id)?;
        self.emit(RegistryChange::Unregistered {
            id,
            deleted: tracked.entry.deleted,
        });
        if worlds.is_empty() {
            self.emit(RegistryChange::AllSaved);
        }
        Some(tracked.entry)
    }

    /// Point-in-time copy of all tracked operation handles.
    pub fn snapshot_keys(&self) -> Vec<OperationHandle> {
        self.read()
            .values()
            .map(|tracked| tracked.operation.clone())
            .collect()
    }

    pub fn get(&self, id: OperationId) -> Option<TrackedSave> {
        self.read().get(&id).cloned()
    }

    /// Find the save writing to `path`.
    pub fn find_by_path(&self, path: &Utf8Path) -> Option<OperationHandle> {
        self.snapshot_keys()
            .into_iter()
            .find(|operation| operation.storage_path() == path)
    }

    pub fn contains(&self, id: OperationId) -> bool {
        self.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether nothing is saving right now.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Subscribe to registry change events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryChange> {
        self.change_tx.subscribe()
    }
}

impl Default for SavingWorldRegistry {
    fn default() -> Self {
        Self::new()
    }
}
