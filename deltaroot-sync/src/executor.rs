//! File sync executor.
//!
//! Populates a staging directory from a [`SyncPlan`]:
//!
//! 1. Reusable entries are copied from the local content root on a blocking
//!    worker. Entries whose source file is missing are re-routed to the
//!    download phase.
//! 2. Fetch entries already present in staging are reported `Satisfied`
//!    (bookkeeping entries are always downloaded).
//! 3. Remaining entries are downloaded into the temp dir, at most
//!    `download_limit` at a time, then renamed into staging. A second entry
//!    for an already claimed path waits for the next wave.
//!
//! Every entry yields exactly one [`TaskReport`] on the report channel.
//! The executor never touches the session itself.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use deltaroot_core::types::join_url;
use deltaroot_core::{Manifest, ManifestEntry};

use crate::cancel::CancellationToken;
use crate::error::SyncError;
use crate::session::{TaskFailure, TaskKind, TaskReport};
use crate::source::RemoteSource;

/// Everything one sync run needs to know about where files come from and go.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub reuse: Manifest,
    pub fetch: Manifest,
    /// Current content root reusable files are copied from.
    pub local_root: PathBuf,
    pub staging_dir: PathBuf,
    pub temp_dir: PathBuf,
    /// Remote content root fetch entries are resolved against.
    pub content_url: String,
}

pub struct FileSyncExecutor {
    source: Arc<dyn RemoteSource>,
    download_limit: usize,
}

impl FileSyncExecutor {
    pub fn new(source: Arc<dyn RemoteSource>, download_limit: usize) -> Self {
        Self {
            source,
            download_limit: download_limit.max(1),
        }
    }

    /// Run every task in `plan`, sending one report per entry.
    ///
    /// Returns once all reports are sent. Errors are reserved for the
    /// executor's own machinery; file problems are reported, not returned.
    pub async fn execute(
        &self,
        plan: SyncPlan,
        cancel: &CancellationToken,
        reports: mpsc::UnboundedSender<TaskReport>,
    ) -> Result<(), SyncError> {
        let SyncPlan {
            reuse,
            fetch,
            local_root,
            staging_dir,
            temp_dir,
            content_url,
        } = plan;

        // -- Copy phase ------------------------------------------------------
        let rerouted = {
            let reports = reports.clone();
            let cancel = cancel.clone();
            let staging_dir = staging_dir.clone();
            tokio::task::spawn_blocking(move || {
                copy_reused(&reuse, &local_root, &staging_dir, &cancel, &reports)
            })
            .await
            .map_err(|e| SyncError::TaskJoin(e.to_string()))?
        };

        // -- Download phase --------------------------------------------------
        // A path is claimed at most once per wave.
        let ctx = DownloadContext {
            semaphore: Arc::new(Semaphore::new(self.download_limit)),
            reports,
            content_url,
            staging_dir,
            temp_dir,
        };
        let mut wave: Vec<ManifestEntry> = fetch.into_iter().chain(rerouted).collect();
        while !wave.is_empty() {
            let mut claimed = HashSet::new();
            let mut next = Vec::new();
            let mut tasks = JoinSet::new();

            for entry in wave {
                if !claimed.insert(entry.path.trim_start_matches('/').to_string()) {
                    tracing::debug!(entry = %entry, "path already being downloaded, deferring");
                    next.push(entry);
                    continue;
                }
                self.dispatch(&ctx, entry, cancel, &mut tasks).await?;
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined {
                    tracing::error!(error = %err, "download task did not complete");
                }
            }
            wave = next;
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        ctx: &DownloadContext,
        entry: ManifestEntry,
        cancel: &CancellationToken,
        tasks: &mut JoinSet<()>,
    ) -> Result<(), SyncError> {
        if cancel.is_cancelled() {
            send(&ctx.reports, cancelled(&ctx.content_url, entry));
            return Ok(());
        }
        let permit = Arc::clone(&ctx.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| SyncError::TaskJoin(e.to_string()))?;
        // Cancellation may have arrived while waiting for a slot.
        if cancel.is_cancelled() {
            send(&ctx.reports, cancelled(&ctx.content_url, entry));
            return Ok(());
        }

        let source = Arc::clone(&self.source);
        let reports = ctx.reports.clone();
        let content_url = ctx.content_url.clone();
        let staging_dir = ctx.staging_dir.clone();
        let temp_dir = ctx.temp_dir.clone();
        tasks.spawn(async move {
            let report =
                download_entry(source.as_ref(), entry, &content_url, &staging_dir, &temp_dir)
                    .await;
            send(&reports, report);
            drop(permit);
        });
        Ok(())
    }
}

struct DownloadContext {
    semaphore: Arc<Semaphore>,
    reports: mpsc::UnboundedSender<TaskReport>,
    content_url: String,
    staging_dir: PathBuf,
    temp_dir: PathBuf,
}

fn send(reports: &mpsc::UnboundedSender<TaskReport>, report: TaskReport) {
    if reports.send(report).is_err() {
        tracing::debug!("report receiver dropped");
    }
}

fn cancelled(content_url: &str, entry: ManifestEntry) -> TaskReport {
    let url = join_url(content_url, &entry.path);
    TaskReport::failure(TaskKind::Download, url, entry, TaskFailure::Cancelled)
}

// ---------------------------------------------------------------------------
// Copy
// ---------------------------------------------------------------------------

/// Copy reusable files into staging. Returns the entries to download instead.
fn copy_reused(
    reuse: &Manifest,
    local_root: &Path,
    staging_dir: &Path,
    cancel: &CancellationToken,
    reports: &mpsc::UnboundedSender<TaskReport>,
) -> Vec<ManifestEntry> {
    let mut rerouted = Vec::new();

    for entry in reuse {
        let (Some(from), Some(to)) = (
            entry.resolve_under(local_root),
            entry.resolve_under(staging_dir),
        ) else {
            send(reports, unsafe_path(TaskKind::Copy, entry.clone()));
            continue;
        };
        let origin = from.display().to_string();

        if cancel.is_cancelled() {
            send(
                reports,
                TaskReport::failure(TaskKind::Copy, origin, entry.clone(), TaskFailure::Cancelled),
            );
            continue;
        }

        if !from.is_file() {
            tracing::warn!(entry = %entry, path = %from.display(), "reusable file missing locally, downloading instead");
            rerouted.push(entry.clone());
            continue;
        }

        let report = match copy_file(&from, &to) {
            Ok(()) => TaskReport::success(TaskKind::Copy, origin, entry.clone()),
            Err(failure) => TaskReport::failure(TaskKind::Copy, origin, entry.clone(), failure),
        };
        send(reports, report);
    }

    rerouted
}

fn copy_file(from: &Path, to: &Path) -> Result<(), TaskFailure> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_failure(parent, e))?;
    }
    std::fs::copy(from, to).map_err(|e| io_failure(to, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

async fn download_entry(
    source: &dyn RemoteSource,
    entry: ManifestEntry,
    content_url: &str,
    staging_dir: &Path,
    temp_dir: &Path,
) -> TaskReport {
    let (Some(dest), Some(tmp)) = (entry.resolve_under(staging_dir), entry.resolve_under(temp_dir))
    else {
        return unsafe_path(TaskKind::Download, entry);
    };

    if !entry.is_bookkeeping() && dest.exists() {
        return TaskReport::success(TaskKind::Satisfied, dest.display().to_string(), entry);
    }

    let url = join_url(content_url, &entry.path);
    match fetch_into_place(source, &url, &dest, &tmp).await {
        Ok(()) => TaskReport::success(TaskKind::Download, url, entry),
        Err(failure) => TaskReport::failure(TaskKind::Download, url, entry, failure),
    }
}

/// GET into `tmp`, then replace `dest` with it.
async fn fetch_into_place(
    source: &dyn RemoteSource,
    url: &str,
    dest: &Path,
    tmp: &Path,
) -> Result<(), TaskFailure> {
    ensure_parent(dest).await?;
    ensure_parent(tmp).await?;

    if let Err(err) = source.download(url, tmp).await {
        return Err(match err {
            SyncError::Io { path, source } => TaskFailure::Io {
                path,
                message: source.to_string(),
            },
            other => TaskFailure::Http {
                url: url.to_string(),
                message: other.to_string(),
            },
        });
    }

    if !tokio::fs::try_exists(tmp).await.unwrap_or(false) {
        return Err(TaskFailure::MissingTempFile {
            url: url.to_string(),
        });
    }
    if tokio::fs::try_exists(dest).await.unwrap_or(false) {
        tokio::fs::remove_file(dest)
            .await
            .map_err(|e| io_failure(dest, e))?;
    }
    tokio::fs::rename(tmp, dest)
        .await
        .map_err(|e| io_failure(dest, e))
}

async fn ensure_parent(path: &Path) -> Result<(), TaskFailure> {
    match path.parent() {
        Some(parent) => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_failure(parent, e)),
        None => Ok(()),
    }
}

fn io_failure(path: &Path, err: std::io::Error) -> TaskFailure {
    TaskFailure::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn unsafe_path(kind: TaskKind, entry: ManifestEntry) -> TaskReport {
    let path = entry.path.clone();
    TaskReport::failure(kind, path.clone(), entry, TaskFailure::UnsafePath { path })
}
