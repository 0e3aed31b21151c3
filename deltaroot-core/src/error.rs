//! Error types for deltaroot-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from descriptor, manifest, settings and state
/// handling.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (state write path).
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A version-configuration document lacked a required key or was not a
    /// JSON object.
    #[error("malformed version descriptor: {reason}")]
    MalformedVersionDescriptor { reason: String },

    /// A manifest document could not be decoded into `{file, hash}` entries.
    #[error("invalid manifest: {source}")]
    InvalidManifest {
        #[source]
        source: serde_json::Error,
    },

    /// `state.json` exists but cannot be decoded.
    #[error("failed to parse application state at {path}: {source}")]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// YAML parse error on settings load, with the file path.
    #[error("failed to parse settings at {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
