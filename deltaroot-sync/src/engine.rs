//! Update engine: the entrypoint shared by the CLI and embedding hosts.
//!
//! ```text
//! check_for_update ──► UpdateSession
//!                          │
//! run_update ──► diff ──► FileSyncExecutor ──► session driver ──► VersionPromoter
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use deltaroot_core::layout::descriptor_path_in;
use deltaroot_core::{ContentLayout, Policy, Settings, StateStore, Version, VersionDescriptor};

use crate::baseline;
use crate::cancel::CancellationToken;
use crate::diff::{diff, fetch_remote_manifest, load_local_manifest, local_content_root};
use crate::error::{io_err, SyncError};
use crate::events::{emit, UpdateEvent};
use crate::executor::{FileSyncExecutor, SyncPlan};
use crate::promoter::{InstallOutcome, VersionPromoter};
use crate::session::{SessionSnapshot, UpdateSession, UpdateStatus};
use crate::source::{HttpSource, RemoteSource};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of [`UpdateEngine::check_for_update`].
#[derive(Debug)]
pub struct UpdateCheck {
    pub available: bool,
    /// A fresh session when an update is available.
    pub session: Option<UpdateSession>,
}

/// Tri-state overrides for the remote policies. `None` defers to the policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub force_update: Option<bool>,
    pub force_install: Option<bool>,
}

/// Host lifecycle points at which a deferred install may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Start,
    Resume,
}

/// What [`UpdateEngine::run_update`] did.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// Files were synchronized; `install` is set when an install was attempted.
    Synced {
        snapshot: SessionSnapshot,
        install: Option<InstallOutcome>,
    },
    /// No update was available but an install was forced.
    Installed { install: InstallOutcome },
    /// Nothing was touched.
    Deferred { status: UpdateStatus },
}

impl UpdateOutcome {
    pub fn status(&self) -> UpdateStatus {
        match self {
            UpdateOutcome::Synced { snapshot, .. } => snapshot.status,
            UpdateOutcome::Installed { install } => install_status(install),
            UpdateOutcome::Deferred { status } => *status,
        }
    }
}

/// Snapshot of the persisted pointers and the active content root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub current_version: Option<Version>,
    pub previous_version: Option<Version>,
    pub ready_install_version: Option<Version>,
    pub update_policy: Policy,
    pub install_policy: Policy,
    pub content_root: PathBuf,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct UpdateEngine {
    settings: Settings,
    source: Arc<dyn RemoteSource>,
    promoter: VersionPromoter,
}

impl UpdateEngine {
    /// Load state, install the bundled baseline on first run and resolve the
    /// content root to serve.
    pub fn open(
        settings: Settings,
        layout: ContentLayout,
        source: Arc<dyn RemoteSource>,
    ) -> Result<Self, SyncError> {
        let bundle = match VersionDescriptor::read_from(&layout.bundle_descriptor_path()) {
            Ok(descriptor) => Some(descriptor),
            Err(err) => {
                tracing::warn!(
                    path = %layout.bundle_descriptor_path().display(),
                    error = %err,
                    "bundled version descriptor unavailable",
                );
                None
            }
        };

        let store = StateStore::load_at(layout.state_path(), bundle.as_ref().map(|b| &b.version))?;
        if let Some(bundle) = &bundle {
            if store.state().current_version.as_ref() == Some(&bundle.version) {
                baseline::install_if_missing(&layout, &bundle.version)?;
            }
        }

        let promoter = VersionPromoter::new(layout, store);
        tracing::info!(
            content_root = %promoter.active_root().display(),
            current = ?promoter.state().current_version,
            "update engine ready",
        );
        Ok(Self {
            settings,
            source,
            promoter,
        })
    }

    /// [`UpdateEngine::open`] with an [`HttpSource`] built from `settings`.
    pub fn open_http(settings: Settings, layout: ContentLayout) -> Result<Self, SyncError> {
        let source: Arc<dyn RemoteSource> = Arc::new(HttpSource::from_settings(&settings)?);
        Self::open(settings, layout, source)
    }

    pub fn layout(&self) -> &ContentLayout {
        self.promoter.layout()
    }

    /// Directory currently served as content.
    pub fn active_root(&self) -> &Path {
        self.promoter.active_root()
    }

    /// Descriptor of the current local content root.
    pub fn local_descriptor(&self) -> Result<VersionDescriptor, SyncError> {
        let root = self.local_root();
        Ok(VersionDescriptor::read_from(&descriptor_path_in(&root))?)
    }

    fn local_root(&self) -> PathBuf {
        local_content_root(
            self.promoter.layout(),
            self.promoter.state().current_version.as_ref(),
        )
    }

    // -- Check ---------------------------------------------------------------

    /// Fetch the remote descriptor and compare release timestamps.
    ///
    /// Any failure along the way (unreadable local descriptor, network error,
    /// malformed remote document) is logged and reported as "no update".
    pub async fn check_for_update(&self) -> UpdateCheck {
        let none = UpdateCheck {
            available: false,
            session: None,
        };

        let local = match self.local_descriptor() {
            Ok(local) => local,
            Err(err) => {
                tracing::warn!(error = %err, "local version descriptor unavailable");
                return none;
            }
        };
        let url = self
            .settings
            .config_url
            .clone()
            .unwrap_or_else(|| local.config_url());

        let remote = match self.source.fetch_text(&url).await {
            Ok(document) => VersionDescriptor::parse(&document).map_err(SyncError::from),
            Err(err) => Err(err),
        };
        let remote = match remote {
            Ok(remote) => remote,
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "no update information");
                return none;
            }
        };

        let available = remote.version.is_newer_than(&local.version);
        tracing::info!(
            local = %local.version,
            remote = %remote.version,
            available,
            "update check complete",
        );

        if !available {
            return none;
        }
        let session = UpdateSession::new(local, remote, self.promoter.layout());
        UpdateCheck {
            available,
            session: Some(session),
        }
    }

    // -- Run -----------------------------------------------------------------

    /// Apply the remote policies (or the overrides in `options`) to a checked
    /// session: sync, record and optionally install the new version.
    ///
    /// Per-file failures end in a `Fail` session inside `Ok`; only
    /// [`SyncError::ManifestUnavailable`] and infrastructure errors are `Err`.
    pub async fn run_update(
        &mut self,
        session: Option<UpdateSession>,
        options: RunOptions,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<UpdateEvent>,
    ) -> Result<UpdateOutcome, SyncError> {
        let mut session = match session {
            Some(session) if wants_update(session.remote().update_policy, options) => session,
            other => return self.skip_update(other, options, events),
        };

        self.sync(&mut session, cancel, events).await?;

        let mut install = None;
        if session.status() == UpdateStatus::Success {
            self.promoter.finalize(&session)?;
            if wants_install(session.remote().install_policy, options.force_install) {
                let outcome = self.promoter.install(Some(&mut session))?;
                emit(
                    events,
                    UpdateEvent::Install {
                        status: session.status(),
                        snapshot: Some(session.snapshot()),
                        outcome: outcome.clone(),
                    },
                );
                install = Some(outcome);
            }
        }

        Ok(UpdateOutcome::Synced {
            snapshot: session.snapshot(),
            install,
        })
    }

    fn skip_update(
        &mut self,
        session: Option<UpdateSession>,
        options: RunOptions,
        events: &mpsc::UnboundedSender<UpdateEvent>,
    ) -> Result<UpdateOutcome, SyncError> {
        let status = session
            .as_ref()
            .map(UpdateSession::status)
            .unwrap_or(UpdateStatus::None);

        if session.is_none() && options.force_install == Some(true) {
            let install = self.install_now()?;
            emit(
                events,
                UpdateEvent::Install {
                    status: install_status(&install),
                    snapshot: None,
                    outcome: install.clone(),
                },
            );
            return Ok(UpdateOutcome::Installed { install });
        }

        if options.force_update == Some(true) {
            emit(
                events,
                UpdateEvent::Status {
                    status,
                    snapshot: session.as_ref().map(UpdateSession::snapshot),
                },
            );
        }
        tracing::debug!(status = %status, "update deferred");
        Ok(UpdateOutcome::Deferred { status })
    }

    /// Diff, then drive the executor to a terminal session status.
    async fn sync(
        &self,
        session: &mut UpdateSession,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<UpdateEvent>,
    ) -> Result<(), SyncError> {
        let layout = self.promoter.layout();
        let local_root = self.local_root();

        let local_manifest = load_local_manifest(&local_root)?;
        let remote_manifest =
            fetch_remote_manifest(self.source.as_ref(), &session.remote().manifest_url()).await?;
        let plan_diff = diff(&local_manifest, &remote_manifest);
        tracing::info!(
            version = %session.remote().version,
            reuse = plan_diff.reuse.len(),
            fetch = plan_diff.fetch.len(),
            "manifest diff computed",
        );

        session.begin(plan_diff.task_count())?;
        let plan = SyncPlan {
            reuse: plan_diff.reuse,
            fetch: plan_diff.fetch,
            local_root,
            staging_dir: session.staging_dir().to_path_buf(),
            temp_dir: session.temp_dir().to_path_buf(),
            content_url: session.remote().content_url.clone(),
        };

        let executor = FileSyncExecutor::new(Arc::clone(&self.source), self.settings.download_limit());
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();

        let drive = async {
            while let Some(report) = report_rx.recv().await {
                let transition = session.record(&report);
                emit(
                    events,
                    UpdateEvent::Progress {
                        snapshot: session.snapshot(),
                        report,
                    },
                );
                if let Some(status) = transition {
                    emit(
                        events,
                        UpdateEvent::Status {
                            status,
                            snapshot: Some(session.snapshot()),
                        },
                    );
                }
            }
        };
        let (executed, ()) = tokio::join!(executor.execute(plan, cancel, report_tx), drive);
        executed?;

        if let Some(status) = session.fail_incomplete() {
            emit(
                events,
                UpdateEvent::Status {
                    status,
                    snapshot: Some(session.snapshot()),
                },
            );
        }

        tracing::info!(
            version = %session.remote().version,
            status = %session.status(),
            completed = session.completed(),
            failed = session.failed(),
            "sync finished",
        );

        if session.status() == UpdateStatus::Success {
            remove_dir_if_exists(session.temp_dir())?;
            let bundle_dir = layout.bundle_dir.clone();
            let staging_dir = session.staging_dir().to_path_buf();
            tokio::task::spawn_blocking(move || baseline::merge_base_files(&bundle_dir, &staging_dir))
                .await
                .map_err(|e| SyncError::TaskJoin(e.to_string()))??;
        }
        Ok(())
    }

    // -- Install -------------------------------------------------------------

    /// Install the version persisted as ready, if any.
    pub fn install_now(&mut self) -> Result<InstallOutcome, SyncError> {
        self.promoter.install(None)
    }

    /// Run a deferred install when the persisted install policy names this
    /// lifecycle point.
    pub fn apply_lifecycle(&mut self, point: Lifecycle) -> Result<InstallOutcome, SyncError> {
        let state = self.promoter.state();
        let due = match point {
            Lifecycle::Start => state.install_policy == Policy::Start,
            Lifecycle::Resume => state.install_policy == Policy::Resume,
        };
        if !due || state.ready_install_version.is_none() {
            return Ok(InstallOutcome::NothingToInstall);
        }
        tracing::info!(point = ?point, "running deferred install");
        self.install_now()
    }

    pub fn version_info(&self) -> VersionInfo {
        let state = self.promoter.state();
        VersionInfo {
            current_version: state.current_version.clone(),
            previous_version: state.previous_version.clone(),
            ready_install_version: state.ready_install_version.clone(),
            update_policy: state.update_policy,
            install_policy: state.install_policy,
            content_root: self.promoter.active_root().to_path_buf(),
        }
    }
}

fn wants_update(policy: Policy, options: RunOptions) -> bool {
    options.force_update == Some(true)
        || options.force_install == Some(true)
        || (options.force_update.is_none() && policy == Policy::Now)
}

fn wants_install(policy: Policy, force_install: Option<bool>) -> bool {
    force_install.unwrap_or(policy == Policy::Now)
}

/// Status of the ready version after an install attempt. An aborted cutover
/// leaves it downloaded and waiting, which is `Success`.
fn install_status(outcome: &InstallOutcome) -> UpdateStatus {
    match outcome {
        InstallOutcome::Installed { .. } => UpdateStatus::Installed,
        InstallOutcome::Aborted { .. } => UpdateStatus::Success,
        InstallOutcome::NothingToInstall => UpdateStatus::None,
    }
}

fn remove_dir_if_exists(dir: &Path) -> Result<(), SyncError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(dir, err)),
    }
}
