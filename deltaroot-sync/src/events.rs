//! Observer events emitted while an update runs.

use serde::Serialize;

use crate::promoter::InstallOutcome;
use crate::session::{SessionSnapshot, TaskReport, UpdateStatus};

/// Ordered stream of what happened during [`crate::UpdateEngine::run_update`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum UpdateEvent {
    /// One file task finished.
    Progress {
        snapshot: SessionSnapshot,
        report: TaskReport,
    },
    /// The session reached a new status, or a status was requested.
    Status {
        status: UpdateStatus,
        snapshot: Option<SessionSnapshot>,
    },
    /// An install attempt finished.
    Install {
        status: UpdateStatus,
        snapshot: Option<SessionSnapshot>,
        outcome: InstallOutcome,
    },
}

/// Send `event`, tolerating a dropped receiver.
pub(crate) fn emit(events: &tokio::sync::mpsc::UnboundedSender<UpdateEvent>, event: UpdateEvent) {
    if events.send(event).is_err() {
        tracing::debug!("update event receiver dropped");
    }
}
