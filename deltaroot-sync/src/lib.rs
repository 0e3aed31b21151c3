//! # deltaroot-sync
//!
//! Delta content updates: check for a newer version, fetch only what changed
//! into a versioned staging directory, then promote it to the active
//! content root.
//!
//! [`UpdateEngine`] is the entrypoint; the modules below are its parts.

pub mod baseline;
pub mod cancel;
pub mod diff;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod promoter;
pub mod session;
pub mod source;

pub use cancel::CancellationToken;
pub use diff::{diff, ManifestDiff};
pub use engine::{Lifecycle, RunOptions, UpdateCheck, UpdateEngine, UpdateOutcome, VersionInfo};
pub use error::SyncError;
pub use events::UpdateEvent;
pub use executor::{FileSyncExecutor, SyncPlan};
pub use promoter::{InstallOutcome, VersionPromoter};
pub use session::{
    SessionSnapshot, TaskFailure, TaskKind, TaskReport, UpdateSession, UpdateStatus,
};
pub use source::{HttpSource, RemoteSource};
