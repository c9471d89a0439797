use crate::config::ConfigManager;
use crate::models::{OperationHandle, OperationId, SavingWorldEntry, SessionHandle};
use crate::services::shutdown::{ShutdownOutcome, ShutdownSequencer};
use crate::services::worker::{SaveContext, ThreadedSave};
use crate::state::{RegistryError, SavingWorldRegistry, SessionRegistry, SessionRelease};
use crate::ui::{ForegroundHost, WaitCoordinator, WaitError, WaitRequest, WaitState};
use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What happened to a save once it completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub id: OperationId,
    pub level_name: String,
    /// The world was deleted while saving; the host must not touch it again.
    pub deleted: bool,
    pub elapsed: Duration,
    /// What happened to the session the save borrowed, if it had one.
    pub session: Option<SessionRelease>,
}

/// Entry point for host callbacks around background world saves.
///
/// Owns the saving-world and session registries and wires them to the wait coordinator
/// and the shutdown sequencer. The host calls:
/// - [`begin_save`](Self::begin_save) / [`start_save`](Self::start_save) when a world starts saving in the background
/// - [`delete_world`](Self::delete_world) when the user deletes a world
/// - [`finish_save`](Self::finish_save) when a save completes
/// - [`quit`](Self::quit) when the application closes
pub struct SaveService {
    registry: Arc<SavingWorldRegistry>,
    sessions: Arc<SessionRegistry>,
    config: Arc<ConfigManager>,
    host: Arc<dyn ForegroundHost>,
    coordinator: WaitCoordinator,
    shutdown: ShutdownSequencer,
}

impl SaveService {
    pub fn new(host: Arc<dyn ForegroundHost>, config: Arc<ConfigManager>) -> Self {
        let registry = Arc::new(SavingWorldRegistry::new());
        let coordinator = WaitCoordinator::new(host.clone(), config.clone());
        let shutdown = ShutdownSequencer::new(registry.clone(), coordinator.clone());

        Self {
            registry,
            sessions: Arc::new(SessionRegistry::new()),
            config,
            host,
            coordinator,
            shutdown,
        }
    }

    /// Track a save that has just moved to the background.
    ///
    /// The session (if any) is marked occupied and the worker is dropped to the
    /// configured background priority.
    pub fn begin_save(
        &self,
        operation: OperationHandle,
        session: Option<SessionHandle>,
    ) -> Result<(), RegistryError> {
        let level_name = operation.level_name();
        self.registry
            .register(operation.clone(), SavingWorldEntry::new(session.clone()))?;

        if let Some(session) = session {
            self.sessions.acquire(session);
        }

        let settings = self.config.settings();
        if settings.adjusts_priority() {
            operation
                .thread_priority()
                .set_priority(settings.background_priority);
        }

        tracing::info!("Saving \"{}\" in the background", level_name);
        Ok(())
    }

    /// Spawn `save` on its own thread and track it.
    ///
    /// The save only starts once it is registered, and it reports back to
    /// [`finish_save`](Self::finish_save) when done.
    pub fn start_save<S>(
        self: &Arc<Self>,
        level_name: impl Into<String>,
        storage_path: impl Into<Utf8PathBuf>,
        session: Option<SessionHandle>,
        save: S,
    ) -> Result<OperationHandle>
    where
        S: FnOnce(&SaveContext) -> Result<()> + Send + 'static,
    {
        let service: Weak<Self> = Arc::downgrade(self);
        let worker = ThreadedSave::spawn(level_name, storage_path, save, move |id| {
            if let Some(service) = service.upgrade() {
                service.finish_save(id);
            }
        })?;

        let operation: OperationHandle = worker.clone();
        let registered = self.begin_save(operation.clone(), session);
        worker.start();
        registered?;

        Ok(operation)
    }

    /// Mark the world stored at `path` as deleted if it is still saving.
    ///
    /// # Returns
    /// Whether a saving world was found at `path`
    pub fn delete_world(&self, path: &Utf8Path) -> bool {
        match self.registry.find_by_path(path) {
            Some(operation) => {
                tracing::info!("\"{}\" was deleted while saving", operation.level_name());
                self.registry.mark_deleted(operation.id())
            }
            None => false,
        }
    }

    /// A save completed: release its session and stop tracking it.
    ///
    /// Returns `None` if the save wasn't tracked, e.g. because another completion
    /// notification got there first.
    pub fn finish_save(&self, id: OperationId) -> Option<SaveOutcome> {
        let tracked = self.registry.get(id)?;
        let level_name = tracked.operation.level_name();

        let mut session_release = None;
        let entry = self.registry.unregister_with(id, |entry| {
            session_release = entry
                .session
                .as_ref()
                .map(|session| self.sessions.release(session));
        })?;

        let elapsed = entry.started_at.elapsed();
        if entry.deleted {
            tracing::info!("Deleted \"{}\" after it finished saving", level_name);
        } else {
            tracing::info!("Finished saving \"{}\" in {:.1?}", level_name, elapsed);
        }

        if self.config.settings().show_toasts {
            // Usually called from the save thread; toasts belong to the foreground
            let host = self.host.clone();
            let title = if entry.deleted { "World deleted" } else { "World saved" };
            let description = format!("\"{level_name}\" finished saving");
            self.host
                .submit(Box::new(move || host.show_toast(title, &description)));
        }

        Some(SaveOutcome {
            id,
            level_name,
            deleted: entry.deleted,
            elapsed,
            session: session_release,
        })
    }

    /// The save currently writing to `path`, if any.
    pub fn saving_world(&self, path: &Utf8Path) -> Option<OperationHandle> {
        self.registry.find_by_path(path)
    }

    /// Wait for the world at `path` to finish saving, e.g. before opening it again.
    pub fn wait_for_world(
        &self,
        path: &Utf8Path,
        cancellable: Option<CancellationToken>,
    ) -> Result<WaitState, WaitError> {
        let Some(operation) = self.registry.find_by_path(path) else {
            return Ok(WaitState::Done);
        };

        let mut request = WaitRequest::new(vec![operation]);
        request.cancellable = cancellable;
        self.coordinator.wait(request)
    }

    /// Whether any world is still saving.
    pub fn is_saving(&self) -> bool {
        !self.registry.is_empty()
    }

    pub fn should_render_saving_screen(&self) -> bool {
        self.config.settings().render_saving_screen
    }

    /// The application is closing: wait for every save.
    pub fn quit(&self) -> ShutdownOutcome {
        let outcome = self.shutdown.exit();
        tracing::info!("Exit finished: {:?}", outcome);
        outcome
    }

    pub fn registry(&self) -> &Arc<SavingWorldRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn coordinator(&self) -> &WaitCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &Arc<ConfigManager> {
        &self.config
    }
}
