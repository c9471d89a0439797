use crate::services::panic_message;
use crate::state::SavingWorldRegistry;
use crate::ui::{WaitCoordinator, WaitState};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

/// How [`ShutdownSequencer::exit`] got every save out of the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The wait coordinator handled it.
    Coordinated(WaitState),
    /// The coordinator failed; worker threads were joined directly.
    Fallback { joined: usize, failed: usize },
}

/// Last safety net before the process exits.
pub struct ShutdownSequencer {
    registry: Arc<SavingWorldRegistry>,
    coordinator: WaitCoordinator,
}

impl ShutdownSequencer {
    pub fn new(registry: Arc<SavingWorldRegistry>, coordinator: WaitCoordinator) -> Self {
        Self {
            registry,
            coordinator,
        }
    }

    /// Wait for every world that is still saving. Never panics, never fails.
    ///
    /// The coordinator gets the first go. If it errors or panics, every save thread in
    /// the registry is joined instead, one at a time, so that one bad join can't keep
    /// the others from being attempted.
    pub fn exit(&self) -> ShutdownOutcome {
        let operations = self.registry.snapshot_keys();
        if !operations.is_empty() {
            tracing::info!("Waiting for {} world(s) before exiting", operations.len());
        }

        let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
            self.coordinator.wait_all(operations)
        }));

        match attempt {
            Ok(Ok(state)) => ShutdownOutcome::Coordinated(state),
            Ok(Err(e)) => {
                tracing::error!(
                    "Something went horribly wrong when exiting: {:#}",
                    anyhow::Error::new(e)
                );
                self.join_all()
            }
            Err(payload) => {
                tracing::error!(
                    "Something went horribly wrong when exiting: {}",
                    panic_message(payload.as_ref())
                );
                self.join_all()
            }
        }
    }

    fn join_all(&self) -> ShutdownOutcome {
        let current = thread::current().id();
        let mut joined = 0;
        let mut failed = 0;

        for operation in self.registry.snapshot_keys() {
            let level_name = operation.level_name();

            if operation.worker_thread() == current {
                tracing::error!("Not joining \"{}\" from its own save thread", level_name);
                failed += 1;
                continue;
            }

            match panic::catch_unwind(AssertUnwindSafe(|| operation.join())) {
                Ok(Ok(())) => joined += 1,
                Ok(Err(e)) => {
                    tracing::error!("Failed to wait for \"{}\": {:#}", level_name, e);
                    failed += 1;
                }
                Err(payload) => {
                    tracing::error!(
                        "Failed to wait for \"{}\": {}",
                        level_name,
                        panic_message(payload.as_ref())
                    );
                    failed += 1;
                }
            }
        }

        tracing::warn!("Fallback shutdown joined {} save(s), {} failed", joined, failed);
        ShutdownOutcome::Fallback { joined, failed }
    }
}
