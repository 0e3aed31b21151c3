pub mod check;
pub mod info;
pub mod install;
pub mod update;

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};

use deltaroot_core::{config, Settings};
use deltaroot_sync::{UpdateEngine, UpdateStatus};

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Globals {
    pub config: Option<PathBuf>,
}

impl Globals {
    /// Load settings and open the engine over HTTP.
    pub fn open_engine(&self) -> Result<UpdateEngine> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let path = self
            .config
            .clone()
            .unwrap_or_else(|| config::config_path_at(&home));
        let settings = Settings::load_from(&path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        let layout = settings.layout_at(&home);
        UpdateEngine::open_http(settings, layout).context("failed to open update engine")
    }
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

pub fn paint_status(status: UpdateStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        UpdateStatus::Installed | UpdateStatus::Success => label.green().bold(),
        UpdateStatus::Fail => label.red().bold(),
        UpdateStatus::Processing | UpdateStatus::Installing => label.yellow(),
        UpdateStatus::None => label.dimmed(),
    }
}
