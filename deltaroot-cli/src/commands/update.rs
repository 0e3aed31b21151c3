//! `deltaroot update`: check, sync and install per policy.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tokio::sync::mpsc;

use deltaroot_sync::{
    CancellationToken, InstallOutcome, RunOptions, UpdateEvent, UpdateOutcome,
};

use super::{paint_status, runtime, Globals};

/// Arguments for `deltaroot update`.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Override the remote update policy (`true` syncs regardless).
    #[arg(long, value_name = "BOOL")]
    pub force_update: Option<bool>,

    /// Override the remote install policy (`true` installs right after sync).
    #[arg(long, value_name = "BOOL")]
    pub force_install: Option<bool>,

    /// Emit one JSON object per event.
    #[arg(long)]
    pub json: bool,
}

impl UpdateArgs {
    pub fn run(self, globals: &Globals) -> Result<()> {
        let mut engine = globals.open_engine()?;
        let options = RunOptions {
            force_update: self.force_update,
            force_install: self.force_install,
        };
        let json = self.json;

        let outcome = runtime()?.block_on(async {
            let check = engine.check_for_update().await;
            if !check.available && !json {
                println!("No update available.");
            }

            let cancel = CancellationToken::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::info!("received ctrl-c, cancelling pending downloads");
                        cancel.cancel();
                    }
                });
            }

            let (event_tx, mut event_rx) = mpsc::unbounded_channel::<UpdateEvent>();
            let printer = tokio::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    print_event(&event, json);
                }
            });

            let outcome = engine
                .run_update(check.session, options, &cancel, &event_tx)
                .await;
            drop(event_tx);
            if let Err(err) = printer.await {
                tracing::warn!(error = %err, "event printer stopped early");
            }
            outcome
        });
        let outcome = outcome.context("update failed")?;

        if json {
            println!(
                "{}",
                serde_json::to_string(&outcome).context("failed to encode JSON")?
            );
        } else {
            print_outcome(&outcome);
        }
        Ok(())
    }
}

fn print_event(event: &UpdateEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::warn!(error = %err, "failed to encode event"),
        }
        return;
    }

    match event {
        UpdateEvent::Progress { snapshot, report } => {
            let mark = if report.succeeded() {
                "ok".green()
            } else {
                "failed".red()
            };
            println!(
                "  [{:>6.2}%] {:<9} {} {}",
                snapshot.progress,
                format!("{:?}", report.kind).to_lowercase(),
                report.entry.path,
                mark,
            );
            if let Some(failure) = &report.failure {
                println!("             {}", failure.to_string().dimmed());
            }
        }
        UpdateEvent::Status { status, .. } => {
            println!("Status: {}", paint_status(*status));
        }
        UpdateEvent::Install { outcome, .. } => print_install(outcome),
    }
}

fn print_outcome(outcome: &UpdateOutcome) {
    match outcome {
        UpdateOutcome::Synced { snapshot, .. } => println!(
            "{} {} -> {}: {} ({}/{} tasks, {} failed)",
            "Update".bold(),
            snapshot.local_version,
            snapshot.remote_version,
            paint_status(snapshot.status),
            snapshot.completed,
            snapshot.task_count,
            snapshot.failed,
        ),
        UpdateOutcome::Installed { .. } => {}
        UpdateOutcome::Deferred { status } => {
            println!("Nothing to do (status: {}).", paint_status(*status));
        }
    }
}

pub(crate) fn print_install(outcome: &InstallOutcome) {
    match outcome {
        InstallOutcome::Installed {
            version,
            content_root,
        } => println!(
            "{} {version} ({})",
            "Installed".green().bold(),
            content_root.display()
        ),
        InstallOutcome::NothingToInstall => println!("Nothing to install."),
        InstallOutcome::Aborted {
            version,
            start_page,
        } => println!(
            "{} {version}: start page {} is missing",
            "Install aborted".red().bold(),
            start_page.display()
        ),
    }
}
