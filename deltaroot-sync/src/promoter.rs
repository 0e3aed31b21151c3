//! Version promotion: persisted pointers, cutover and cleanup.
//!
//! The promoter is the only writer of the application state. After a
//! successful sync it records the new version ([`VersionPromoter::finalize`]);
//! installing it ([`VersionPromoter::install`]) redirects the active content
//! root and purges the previous version directory.

use std::path::{Path, PathBuf};

use serde::Serialize;

use deltaroot_core::{ApplicationState, ContentLayout, StateStore, Version};

use crate::error::SyncError;
use crate::session::{UpdateSession, UpdateStatus};

/// Result of an install attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum InstallOutcome {
    /// The version is now the active content root.
    Installed { version: Version, content_root: PathBuf },
    /// No version is waiting to be installed.
    NothingToInstall,
    /// The version's start page is missing; the previous root stays active
    /// and the version stays ready for a later attempt.
    Aborted { version: Version, start_page: PathBuf },
}

pub struct VersionPromoter {
    layout: ContentLayout,
    store: StateStore,
    active_root: PathBuf,
}

impl VersionPromoter {
    pub fn new(layout: ContentLayout, store: StateStore) -> Self {
        let active_root = resolve_active_root(&layout, store.state());
        Self {
            layout,
            store,
            active_root,
        }
    }

    pub fn layout(&self) -> &ContentLayout {
        &self.layout
    }

    pub fn state(&self) -> &ApplicationState {
        self.store.state()
    }

    /// Directory currently served as content.
    pub fn active_root(&self) -> &Path {
        &self.active_root
    }

    /// Record a successful sync: `previous := local`, `current := remote`,
    /// `ready_install := remote`, and adopt the remote policies.
    ///
    /// When the local version was itself still waiting to be installed, it
    /// was never served: `previous` keeps pointing at the served version and
    /// the superseded directory is purged.
    pub fn finalize(&mut self, session: &UpdateSession) -> Result<(), SyncError> {
        if session.status() != UpdateStatus::Success {
            return Err(SyncError::InvalidTransition {
                from: session.status(),
                to: UpdateStatus::Success,
            });
        }

        let remote = session.remote();
        let state = self.store.state();
        let superseded = state
            .ready_install_version
            .clone()
            .filter(|ready| state.current_version.as_ref() == Some(ready))
            .filter(|ready| *ready != remote.version);
        let previous = match &superseded {
            Some(_) => state.previous_version.clone(),
            None => Some(session.local().version.clone()),
        };

        self.store.update(|state| {
            state.previous_version = previous;
            state.current_version = Some(remote.version.clone());
            state.ready_install_version = Some(remote.version.clone());
            state.update_policy = remote.update_policy;
            state.install_policy = remote.install_policy;
        })?;

        if let Some(pending) = superseded {
            tracing::info!(
                version = %pending,
                replaced_by = %remote.version,
                "pending version superseded before install",
            );
            self.purge(&pending, &remote.version);
        }

        tracing::info!(
            version = %remote.version,
            install_policy = %remote.install_policy,
            "new version ready to install",
        );
        Ok(())
    }

    /// Install the persisted ready version.
    ///
    /// When `session` is given it is moved `Success → Installing → Installed`
    /// around the cutover. A missing start page is checked before that, so an
    /// aborted cutover leaves the session at `Success`.
    pub fn install(
        &mut self,
        mut session: Option<&mut UpdateSession>,
    ) -> Result<InstallOutcome, SyncError> {
        let Some(version) = self.store.state().ready_install_version.clone() else {
            tracing::debug!("nothing waiting to be installed");
            return Ok(InstallOutcome::NothingToInstall);
        };

        if let Err(err) = self.verify_start_page(&version) {
            return match err {
                SyncError::CutoverAborted { start_page } => {
                    tracing::warn!(
                        version = %version,
                        start_page = %start_page.display(),
                        "cutover aborted, keeping previous content root",
                    );
                    Ok(InstallOutcome::Aborted {
                        version,
                        start_page,
                    })
                }
                other => Err(other),
            };
        }

        if let Some(session) = session.as_deref_mut() {
            session.mark_installing()?;
        }

        let content_root = self.redirect(&version)?.to_path_buf();
        self.store.update(|state| {
            if state.current_version.as_ref() != Some(&version) {
                state.previous_version = state.current_version.take();
                state.current_version = Some(version.clone());
            }
            state.ready_install_version = None;
        })?;

        if let Some(previous) = self.store.state().previous_version.clone() {
            self.purge(&previous, &version);
        }

        if let Some(session) = session {
            session.mark_installed()?;
        }

        Ok(InstallOutcome::Installed {
            version,
            content_root,
        })
    }

    /// Point the active content root at `version`'s `www`.
    ///
    /// Fails with [`SyncError::CutoverAborted`] and leaves the pointer
    /// unchanged when the start page is missing.
    pub fn redirect(&mut self, version: &Version) -> Result<&Path, SyncError> {
        let root = self.verify_start_page(version)?;
        tracing::info!(version = %version, root = %root.display(), "content root redirected");
        self.active_root = root;
        Ok(&self.active_root)
    }

    fn verify_start_page(&self, version: &Version) -> Result<PathBuf, SyncError> {
        let root = self.layout.content_dir(version);
        let start_page = self.layout.start_page_in(&root);
        if !version.is_path_safe() || !start_page.is_file() {
            return Err(SyncError::CutoverAborted { start_page });
        }
        Ok(root)
    }

    /// Remove `<storage_root>/<previous>` unless it holds the active root.
    /// Failures are logged, not returned.
    fn purge(&self, previous: &Version, current: &Version) {
        if previous == current || !previous.is_path_safe() {
            return;
        }
        let dir = self.layout.version_dir(previous);
        if !dir.exists() || self.active_root.starts_with(&dir) {
            return;
        }
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => tracing::info!(version = %previous, "removed previous version"),
            Err(err) => tracing::warn!(
                version = %previous,
                path = %dir.display(),
                error = %err,
                "failed to remove previous version",
            ),
        }
    }
}

/// Content root to serve for a persisted state.
///
/// A version that is current but still waiting to be installed is not served
/// yet; its predecessor is. Falls back to the bundle when the chosen version
/// has no start page.
pub fn resolve_active_root(layout: &ContentLayout, state: &ApplicationState) -> PathBuf {
    let pending = state.ready_install_version.is_some()
        && state.ready_install_version == state.current_version;
    let candidate = if pending {
        state.previous_version.as_ref()
    } else {
        state.current_version.as_ref()
    };

    candidate
        .filter(|version| version.is_path_safe())
        .map(|version| layout.content_dir(version))
        .filter(|root| layout.start_page_in(root).is_file())
        .unwrap_or_else(|| layout.bundle_dir.clone())
}
