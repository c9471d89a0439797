//! FastQuit - headless demonstration host.
//!
//! # Overview
//!
//! Runs the save tracking and shutdown machinery without a game attached. It initializes:
//! - Logging infrastructure (file rotation + console output)
//! - Configuration loading ([`ConfigManager`])
//! - A [`HeadlessHost`] whose foreground thread is the main thread
//! - The [`SaveService`] the host reports background saves to
//!
//! # Execution Flow
//!
//! 1. Initialize logging → logs/fastquit.<date>
//! 2. Load or create `config/fastquit-config.txt`
//! 3. Start two simulated world saves in the background
//! 4. Quit, which waits for both saves while the host keeps ticking
//!
//! Set `RUST_LOG=debug` to see priority changes and tick counts.

use anyhow::{Context, Result};
use fastquit::services::SaveContext;
use fastquit::{APP_NAME, ConfigManager, HeadlessHost, SaveService, ShutdownOutcome, VERSION};
use std::sync::Arc;
use std::time::Duration;

/// Roughly one 60 Hz frame.
const FRAME_TIME: Duration = Duration::from_millis(16);

/// Pretend to write `chunks` region chunks, pacing between each.
fn simulated_save(chunks: u32) -> impl FnOnce(&SaveContext) -> Result<()> + Send + 'static {
    move |ctx| {
        for _ in 0..chunks {
            ctx.pace();
            std::thread::sleep(Duration::from_millis(5));
        }
        tracing::debug!("{} wrote {} chunks", ctx.level_name(), chunks);
        Ok(())
    }
}

fn main() -> Result<()> {
    let _log_guard = fastquit::logging::setup_logging("logs", "fastquit", false, true)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let config = Arc::new(ConfigManager::new("config")?);
    config.initialize();
    let settings = config.settings();
    tracing::info!(
        "Loaded {} - toasts: {}, saving screen: {}, background priority: {}",
        config.config_path(),
        settings.show_toasts,
        settings.render_saving_screen,
        settings.background_priority
    );

    let host = Arc::new(HeadlessHost::new(FRAME_TIME));
    let service = Arc::new(SaveService::new(host.clone(), config));

    service
        .start_save("New World", "saves/New World", None, simulated_save(40))
        .context("Failed to start saving \"New World\"")?;
    service
        .start_save("Skyblock", "saves/Skyblock", None, simulated_save(120))
        .context("Failed to start saving \"Skyblock\"")?;

    match service.quit() {
        ShutdownOutcome::Coordinated(state) => {
            tracing::info!("All worlds saved ({:?}) after {} frames", state, host.frames());
        }
        ShutdownOutcome::Fallback { joined, failed } => {
            tracing::warn!("Exited via fallback: {} joined, {} failed", joined, failed);
        }
    }

    Ok(())
}
