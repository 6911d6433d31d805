mod actions;
mod animation;
mod app;
mod clock;
mod config;
mod input;
mod loader;
mod model;
mod render;
mod sprite;
mod storage;
mod sync;
mod vitals;
mod window;

use anyhow::{Context, Result};
use clap::Parser;
use std::{fs::OpenOptions, path::Path, sync::Mutex};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = config::Cli::parse();
    let paths = config::project_paths()?;
    init_logging(&paths.log_path)?;
    app::run(&cli, paths).await
}

// The TUI owns stdout, so logs go to a file.
fn init_logging(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}
