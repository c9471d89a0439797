//! Data models for FastQuit.
//!
//! - [`FastQuitConfig`]: options persisted in `fastquit-config.txt`
//! - [`BackgroundOperation`]: opaque handle to a running world save
//! - [`PriorityControl`]: worker thread priority capability
//! - [`StorageSession`]: exclusive-use handle over a world's storage directory
//! - [`SavingWorldEntry`]: metadata kept per saving world by
//!   [`SavingWorldRegistry`](crate::state::SavingWorldRegistry)

pub mod config;
pub mod operation;

pub use config::FastQuitConfig;
pub use operation::{
    BackgroundOperation, MAX_PRIORITY, MIN_PRIORITY, NORM_PRIORITY, OperationHandle, OperationId,
    PriorityControl, SavingWorldEntry, SessionHandle, StorageSession, same_session,
};
