// Main entry point for the YouTube background player
// Sets up logging and audio, then hands over to the TUI

mod api;
mod config;
mod error;
mod player;
mod ui;
mod youtube;

use anyhow::Context;
use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use config::Config;
use ui::app::MusicPlayerApp;

// The TUI owns stdout, so logs go to a file instead
fn init_logging() -> anyhow::Result<()> {
    let path = Config::log_path();
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Suppress ALSA error messages that pollute TUI
    std::env::set_var("ALSA_PCM_NO_MMAP", "1");

    init_logging()?;

    let config = Config::load().context("Failed to load configuration")?;
    tracing::info!(backend = %config.backend_url, "starting");

    // The stream must outlive every sink, so it stays here until exit
    let (_stream, handle) = match rodio::OutputStream::try_default() {
        Ok((stream, handle)) => (Some(stream), Some(handle)),
        Err(e) => {
            tracing::warn!("No audio output device, playback will be silent: {}", e);
            (None, None)
        }
    };

    let mut app = MusicPlayerApp::new(config, handle).context("Failed to start the player")?;
    app.run().await?;

    tracing::info!("exiting");
    Ok(())
}
