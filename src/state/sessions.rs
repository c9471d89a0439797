use crate::models::{SessionHandle, same_session};
use camino::Utf8Path;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// What [`SessionRegistry::release`] did with the underlying storage handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRelease {
    /// No other occupied session uses the path; the session was closed.
    Closed,
    /// Another occupied session still uses the same path; nothing was closed.
    StillShared,
    /// The session was unreferenced but closing it failed or panicked. The failure has
    /// been logged.
    CloseFailed,
}

/// Storage sessions currently borrowed by background saves.
///
/// A session is only closed once no occupied session resolves to the same storage
/// path. Removal and the "still referenced" check happen under one lock.
pub struct SessionRegistry {
    occupied: Mutex<Vec<SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            occupied: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SessionHandle>> {
        self.occupied.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `session` as occupied.
    ///
    /// # Returns
    /// `false` if the session was already occupied
    pub fn acquire(&self, session: SessionHandle) -> bool {
        let mut occupied = self.lock();
        if occupied.iter().any(|s| same_session(s, &session)) {
            return false;
        }

        tracing::debug!("Occupying session for {}", session.path());
        occupied.push(session);
        true
    }

    /// Give `session` back and close it if nothing else uses its path.
    ///
    /// Closing failures (errors and panics alike) are logged, never propagated:
    /// releasing a session must not abort shutdown.
    pub fn release(&self, session: &SessionHandle) -> SessionRelease {
        let mut occupied = self.lock();
        occupied.retain(|s| !same_session(s, session));

        if occupied.iter().any(|s| s.path() == session.path()) {
            tracing::debug!("Session for {} is still in use", session.path());
            return SessionRelease::StillShared;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| session.close())) {
            Ok(Ok(())) => {
                tracing::debug!("Closed session for {}", session.path());
                SessionRelease::Closed
            }
            Ok(Err(e)) => {
                tracing::error!("Failed to close session for {}: {:#}", session.path(), e);
                SessionRelease::CloseFailed
            }
            Err(_) => {
                tracing::error!("Closing the session for {} panicked", session.path());
                SessionRelease::CloseFailed
            }
        }
    }

    /// Whether any occupied session uses `path`.
    pub fn is_occupied(&self, path: &Utf8Path) -> bool {
        self.lock().iter().any(|s| s.path() == path)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
