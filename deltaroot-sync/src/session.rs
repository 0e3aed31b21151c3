//! Update session state machine.
//!
//! ```text
//! None → Processing → { Success | Fail } → Installing → Installed
//! ```
//!
//! Transitions only move forward. A session is mutated by a single owner
//! (the driver loop in [`crate::engine`]); file tasks only send
//! [`TaskReport`]s.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use deltaroot_core::{ContentLayout, ManifestEntry, Version, VersionDescriptor};

use crate::error::SyncError;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle of a session. Variant order is the lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    None,
    Processing,
    Fail,
    Success,
    Installing,
    Installed,
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UpdateStatus::None => "none",
            UpdateStatus::Processing => "processing",
            UpdateStatus::Fail => "fail",
            UpdateStatus::Success => "success",
            UpdateStatus::Installing => "installing",
            UpdateStatus::Installed => "installed",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Task reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Reused from the current content root.
    Copy,
    /// Already present in the staging directory; nothing to do.
    Satisfied,
    /// Fetched from the remote content root.
    Download,
}

/// Why a single file task failed. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TaskFailure {
    #[error("request for {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("download of {url} left no file behind")]
    MissingTempFile { url: String },

    #[error("I/O error at {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("entry path '{path}' escapes the content root")]
    UnsafePath { path: String },

    #[error("cancelled before dispatch")]
    Cancelled,
}

/// Completion of one file task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskReport {
    pub kind: TaskKind,
    /// Where the content came from: a URL or a local path.
    pub source: String,
    pub entry: ManifestEntry,
    pub failure: Option<TaskFailure>,
}

impl TaskReport {
    pub fn success(kind: TaskKind, source: impl Into<String>, entry: ManifestEntry) -> Self {
        Self {
            kind,
            source: source.into(),
            entry,
            failure: None,
        }
    }

    pub fn failure(
        kind: TaskKind,
        source: impl Into<String>,
        entry: ManifestEntry,
        failure: TaskFailure,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
            entry,
            failure: Some(failure),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Point-in-time copy of a session's counters, safe to hand to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub status: UpdateStatus,
    pub local_version: Version,
    pub remote_version: Version,
    pub task_count: usize,
    pub completed: usize,
    pub failed: usize,
    pub progress: f64,
}

/// One attempt to move from the local version to a newer remote version.
#[derive(Debug, Clone)]
pub struct UpdateSession {
    local: VersionDescriptor,
    remote: VersionDescriptor,
    status: UpdateStatus,
    task_count: usize,
    completed: usize,
    failed: usize,
    progress: f64,
    staging_dir: PathBuf,
    temp_dir: PathBuf,
}

impl UpdateSession {
    pub fn new(local: VersionDescriptor, remote: VersionDescriptor, layout: &ContentLayout) -> Self {
        let staging_dir = layout.content_dir(&remote.version);
        let temp_dir = layout.temp_dir(&remote.version);
        Self {
            local,
            remote,
            status: UpdateStatus::None,
            task_count: 0,
            completed: 0,
            failed: 0,
            progress: 0.0,
            staging_dir,
            temp_dir,
        }
    }

    pub fn local(&self) -> &VersionDescriptor {
        &self.local
    }

    pub fn remote(&self) -> &VersionDescriptor {
        &self.remote
    }

    pub fn status(&self) -> UpdateStatus {
        self.status
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Percentage of successful work, two decimals. Frozen after a failure.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// The new version's `www`, being populated.
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            local_version: self.local.version.clone(),
            remote_version: self.remote.version.clone(),
            task_count: self.task_count,
            completed: self.completed,
            failed: self.failed,
            progress: self.progress,
        }
    }

    /// `None → Processing`, fixing the task count.
    pub fn begin(&mut self, task_count: usize) -> Result<(), SyncError> {
        self.transition(UpdateStatus::None, UpdateStatus::Processing)?;
        self.task_count = task_count;
        if task_count == 0 {
            self.progress = 100.0;
            self.status = UpdateStatus::Success;
        }
        Ok(())
    }

    /// Count one task completion.
    ///
    /// Returns the new status when this report moved the session to
    /// `Success` or `Fail`. Reports outside `Processing`/`Fail` are ignored.
    pub fn record(&mut self, report: &TaskReport) -> Option<UpdateStatus> {
        if !matches!(self.status, UpdateStatus::Processing | UpdateStatus::Fail) {
            tracing::debug!(entry = %report.entry, status = %self.status, "ignoring late task report");
            return None;
        }

        self.completed += 1;

        if let Some(failure) = &report.failure {
            self.failed += 1;
            tracing::warn!(entry = %report.entry, error = %failure, "file task failed");
            if self.status == UpdateStatus::Processing {
                self.status = UpdateStatus::Fail;
                return Some(UpdateStatus::Fail);
            }
            return None;
        }

        if self.status != UpdateStatus::Processing {
            return None;
        }

        if self.completed >= self.task_count {
            self.progress = 100.0;
            self.status = UpdateStatus::Success;
            return Some(UpdateStatus::Success);
        }
        // Rounding must not reach 100 before the last task.
        let ratio = self.completed as f64 / self.task_count as f64;
        self.progress = round2(ratio * 100.0).min(99.99);
        None
    }

    /// Fail a session whose report stream ended before every task reported.
    pub fn fail_incomplete(&mut self) -> Option<UpdateStatus> {
        if self.status == UpdateStatus::Processing && self.completed < self.task_count {
            tracing::warn!(
                completed = self.completed,
                task_count = self.task_count,
                "task reports ended early",
            );
            self.status = UpdateStatus::Fail;
            return Some(UpdateStatus::Fail);
        }
        None
    }

    /// `Success → Installing`.
    pub fn mark_installing(&mut self) -> Result<(), SyncError> {
        self.transition(UpdateStatus::Success, UpdateStatus::Installing)
    }

    /// `Installing → Installed`.
    pub fn mark_installed(&mut self) -> Result<(), SyncError> {
        self.transition(UpdateStatus::Installing, UpdateStatus::Installed)
    }

    fn transition(&mut self, expected: UpdateStatus, to: UpdateStatus) -> Result<(), SyncError> {
        if self.status != expected {
            return Err(SyncError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
