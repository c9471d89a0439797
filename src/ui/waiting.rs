use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// The "still saving" view shown while the foreground waits on background saves.
///
/// When created with a cancellation token the view offers a cancel button. Cancelling
/// only stops the *wait*; the saves keep running in the background.
#[derive(Debug, Clone)]
pub struct WaitingView {
    message: String,
    cancellable: Option<CancellationToken>,
    shown_at: Instant,
}

impl WaitingView {
    pub fn new(message: impl Into<String>, cancellable: Option<CancellationToken>) -> Self {
        Self {
            message: message.into(),
            cancellable,
            shown_at: Instant::now(),
        }
    }

    pub fn title(&self) -> &'static str {
        "Saving world"
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_cancellable(&self) -> bool {
        self.cancellable.is_some()
    }

    /// User pressed cancel. No-op on a view that can't be cancelled.
    ///
    /// # Returns
    /// Whether a cancellation was requested
    pub fn cancel(&self) -> bool {
        match &self.cancellable {
            Some(token) => {
                tracing::info!("Waiting cancelled by user");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellable
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    pub fn elapsed(&self) -> Duration {
        self.shown_at.elapsed()
    }
}
