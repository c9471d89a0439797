//! Services module - background save lifecycle and shutdown.
//!
//! # Components
//!
//! - [`SaveService`]: the host's entry point. Tracks saves as they move to the
//!   background, marks deleted worlds, reconciles storage sessions when saves finish
//!   and quits through the shutdown sequencer.
//! - [`ThreadedSave`]: a [`BackgroundOperation`](crate::models::BackgroundOperation)
//!   running a save closure on its own thread, gated so it can be registered before it
//!   starts.
//! - [`ShutdownSequencer`]: waits for every saving world on exit and falls back to raw
//!   thread joins if the wait coordinator fails. Never panics.
//!
//! # Usage Example
//!
//! ```ignore
//! use fastquit::services::SaveService;
//!
//! let service = Arc::new(SaveService::new(host, config));
//!
//! service.start_save("New World", "saves/New World", None, |ctx| {
//!     for chunk in chunks {
//!         ctx.pace();
//!         write_chunk(chunk)?;
//!     }
//!     Ok(())
//! })?;
//!
//! // On quit
//! service.quit();
//! ```

pub mod lifecycle;
pub mod shutdown;
pub mod worker;

pub use lifecycle::{SaveOutcome, SaveService};
pub use shutdown::{ShutdownOutcome, ShutdownSequencer};
pub use worker::{AtomicPriority, SaveContext, ThreadedSave};

use std::any::Any;

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
