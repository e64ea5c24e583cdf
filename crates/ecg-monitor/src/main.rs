//! ECG Monitor desktop application
//!
//! Signal flow: acquisition stream → processing service → panel and plots.

mod app;
mod processing_service;
mod render;
mod ui;

use anyhow::Context;
use app::MonitorApp;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app = MonitorApp::new().context("failed to create ECG monitor")?;
    let config = app
        .pipeline_config()
        .to_json()
        .context("failed to serialize pipeline configuration")?;
    info!(%config, "starting ECG monitor");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 900.0])
            .with_min_inner_size([1000.0, 700.0]),
        ..Default::default()
    };

    eframe::run_native(
        "ECG Monitor - Real-time Heart Rate",
        options,
        Box::new(|_cc| Ok(Box::new(app))),
    )
    .map_err(|e| anyhow::anyhow!("failed to run native app: {}", e))?;

    Ok(())
}
