//! Manifest diff: which files of the new version can be reused from the
//! current content root and which must be fetched.

use std::path::{Path, PathBuf};

use deltaroot_core::layout::manifest_path_in;
use deltaroot_core::{ContentLayout, Manifest, ManifestEntry, Version};

use crate::error::SyncError;
use crate::source::RemoteSource;

/// Result of [`diff`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    /// Present in both manifests with the same hash.
    pub reuse: Manifest,
    /// New or changed in the remote manifest, plus the bookkeeping entries.
    pub fetch: Manifest,
}

impl ManifestDiff {
    /// Number of tasks a session built from this diff will run.
    pub fn task_count(&self) -> usize {
        self.reuse.len() + self.fetch.len()
    }
}

/// Split `remote` into reusable and fetch-required entries.
///
/// `chcp.json` and `chcp.manifest` always land in `fetch` exactly once, with
/// empty hashes, and never in `reuse`. Entries the remote manifest lists for
/// those paths are replaced.
pub fn diff(local: &Manifest, remote: &Manifest) -> ManifestDiff {
    let reuse: Manifest = local
        .intersection(remote)
        .into_iter()
        .filter(|entry| !entry.is_bookkeeping())
        .collect();

    let mut fetch: Manifest = remote
        .difference(local)
        .into_iter()
        .filter(|entry| !entry.is_bookkeeping())
        .collect();
    for entry in ManifestEntry::bookkeeping() {
        fetch.insert(entry);
    }

    ManifestDiff { reuse, fetch }
}

/// Directory the local manifest and reusable files come from.
///
/// The current version's `www` when it exists, otherwise the bundle.
pub fn local_content_root(layout: &ContentLayout, current: Option<&Version>) -> PathBuf {
    current
        .filter(|version| version.is_path_safe())
        .map(|version| layout.content_dir(version))
        .filter(|dir| dir.is_dir())
        .unwrap_or_else(|| layout.bundle_dir.clone())
}

/// Read `<root>/chcp.manifest`.
pub fn load_local_manifest(root: &Path) -> Result<Manifest, SyncError> {
    let path = manifest_path_in(root);
    Manifest::read_from(&path).map_err(|err| SyncError::ManifestUnavailable {
        origin: path.display().to_string(),
        reason: err.to_string(),
    })
}

/// GET and decode the manifest at `url`.
pub async fn fetch_remote_manifest(
    source: &dyn RemoteSource,
    url: &str,
) -> Result<Manifest, SyncError> {
    let unavailable = |reason: String| SyncError::ManifestUnavailable {
        origin: url.to_string(),
        reason,
    };
    let document = source
        .fetch_text(url)
        .await
        .map_err(|err| unavailable(err.to_string()))?;
    Manifest::parse(&document).map_err(|err| unavailable(err.to_string()))
}
