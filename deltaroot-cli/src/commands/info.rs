//! `deltaroot info`: persisted version pointers.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use deltaroot_core::Version;

use super::Globals;

/// Arguments for `deltaroot info`.
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl InfoArgs {
    pub fn run(self, globals: &Globals) -> Result<()> {
        let engine = globals.open_engine()?;
        let info = engine.version_info();

        if self.json {
            let json = serde_json::to_string_pretty(&info).context("failed to encode JSON")?;
            println!("{json}");
            return Ok(());
        }

        println!("{:<16} {}", "current".bold(), show(&info.current_version));
        println!("{:<16} {}", "previous".bold(), show(&info.previous_version));
        println!("{:<16} {}", "ready to install".bold(), show(&info.ready_install_version));
        println!("{:<16} {}", "update policy".bold(), info.update_policy);
        println!("{:<16} {}", "install policy".bold(), info.install_policy);
        println!("{:<16} {}", "content root".bold(), info.content_root.display());
        Ok(())
    }
}

fn show(version: &Option<Version>) -> String {
    version
        .as_ref()
        .map(Version::to_string)
        .unwrap_or_else(|| "-".to_string())
}
