//! gige-preview binary: pylon cameras shown in an OpenCV window.

use anyhow::Context;
use clap::Parser;
use gige_preview::cli::Args;
use gige_preview::highgui::HighGuiWindow;
use gige_preview::pylon::PylonTransport;
use gige_preview::run_preview;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let config = Args::parse().into_config().context("invalid arguments")?;

    let transport = PylonTransport::new();
    let stats = run_preview(&transport, &config, |config| {
        HighGuiWindow::create(&config.window_title)
    })
    .context("preview failed")?;

    info!(frames = stats.frames_displayed, "exiting");
    Ok(())
}
