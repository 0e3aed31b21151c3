//! `deltaroot install`: install a previously downloaded version.

use anyhow::{Context, Result};
use clap::Args;

use super::{update::print_install, Globals};

/// Arguments for `deltaroot install`.
#[derive(Args, Debug)]
pub struct InstallArgs {}

impl InstallArgs {
    pub fn run(self, globals: &Globals) -> Result<()> {
        let mut engine = globals.open_engine()?;
        let outcome = engine.install_now().context("install failed")?;
        print_install(&outcome);
        Ok(())
    }
}
