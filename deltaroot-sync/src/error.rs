//! Error types for deltaroot-sync.

use std::path::PathBuf;

use thiserror::Error;

use deltaroot_core::CoreError;

use crate::session::UpdateStatus;

/// All errors that can arise from checking, syncing and promoting content.
///
/// Per-file failures are not errors: they travel as
/// [`TaskFailure`](crate::session::TaskFailure) values inside task reports.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from descriptor, manifest, settings or state handling.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A GET failed: transport error or non-success status.
    #[error("request for {url} failed: {message}")]
    Http { url: String, message: String },

    /// A configured request header name or value is not valid HTTP.
    #[error("invalid request header '{name}'")]
    InvalidHeader { name: String },

    /// The local or remote manifest could not be obtained or decoded.
    /// Nothing has been written when this is returned.
    #[error("manifest unavailable from {origin}: {reason}")]
    ManifestUnavailable { origin: String, reason: String },

    /// The new content root has no start page; the previous root stays active.
    #[error("cutover aborted: start page {start_page} does not exist")]
    CutoverAborted { start_page: PathBuf },

    /// A session was asked to move somewhere its state machine forbids.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition { from: UpdateStatus, to: UpdateStatus },

    /// A blocking or spawned worker panicked or was aborted.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
