// FastQuit - quit and leave worlds without waiting on their saves
//
// This is the library crate with the save tracking, wait and shutdown logic.
// The binary crate (main.rs) runs it against a headless host.

pub mod config;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use models::{BackgroundOperation, FastQuitConfig, OperationHandle, StorageSession};
pub use services::{SaveService, ShutdownOutcome};
pub use state::{RegistryChange, SavingWorldRegistry, SessionRegistry};
pub use ui::{ForegroundHost, HeadlessHost, WaitCoordinator, WaitState};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
