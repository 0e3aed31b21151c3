//! `deltaroot check`: is a newer content version published?

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use deltaroot_core::Version;

use super::{runtime, Globals};

/// Arguments for `deltaroot check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct CheckJson {
    available: bool,
    local_version: Option<Version>,
    remote_version: Option<Version>,
}

impl CheckArgs {
    pub fn run(self, globals: &Globals) -> Result<()> {
        let engine = globals.open_engine()?;
        let local = engine.local_descriptor().ok().map(|d| d.version);
        let check = runtime()?.block_on(engine.check_for_update());
        let remote = check.session.as_ref().map(|s| s.remote().version.clone());

        if self.json {
            let report = CheckJson {
                available: check.available,
                local_version: local,
                remote_version: remote,
            };
            let json = serde_json::to_string_pretty(&report).context("failed to encode JSON")?;
            println!("{json}");
            return Ok(());
        }

        match (remote, local) {
            (Some(remote), local) => {
                let local = local.map(|v| v.to_string()).unwrap_or_else(|| "unknown".into());
                println!("{} {local} -> {remote}", "Update available:".green().bold());
            }
            (None, Some(local)) => println!("Up to date ({local})."),
            (None, None) => println!("No local version found."),
        }
        Ok(())
    }
}
