//! deltaroot: delta content updates for a locally hosted web bundle.
//!
//! # Usage
//!
//! ```text
//! deltaroot [--config <path>] [--verbose] check [--json]
//! deltaroot [--config <path>] [--verbose] update [--force-update <bool>] [--force-install <bool>] [--json]
//! deltaroot [--config <path>] [--verbose] install
//! deltaroot [--config <path>] [--verbose] info [--json]
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{check::CheckArgs, info::InfoArgs, install::InstallArgs, update::UpdateArgs, Globals};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "deltaroot",
    version,
    about = "Check for, download and install new versions of local web content",
    long_about = None,
)]
struct Cli {
    /// Settings file (default: ~/.deltaroot/config.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask the remote whether a newer content version exists.
    Check(CheckArgs),

    /// Check, download and (per policy) install a newer version.
    Update(UpdateArgs),

    /// Install a version that was downloaded earlier.
    Install(InstallArgs),

    /// Show installed, previous and pending versions.
    Info(InfoArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let globals = Globals {
        config: cli.config,
    };
    match cli.command {
        Commands::Check(args) => args.run(&globals),
        Commands::Update(args) => args.run(&globals),
        Commands::Install(args) => args.run(&globals),
        Commands::Info(args) => args.run(&globals),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
