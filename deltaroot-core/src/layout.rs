//! On-disk layout of versioned content.
//!
//! ```text
//! <storage_root>/
//!   state.json
//!   <version>/
//!     www/      staging dir while syncing, content root once promoted
//!     _temp/    download temp dir, removed on success
//! <bundle_dir>/
//!   chcp.json
//!   chcp.manifest
//!   <start_page> ...
//! ```
//!
//! Everything here is pure path arithmetic; nothing touches the filesystem.

use std::path::{Path, PathBuf};

use crate::types::{Version, CONFIG_FILE_NAME, MANIFEST_FILE_NAME};

const STATE_FILE_NAME: &str = "state.json";
const CONTENT_DIR_NAME: &str = "www";
const TEMP_DIR_NAME: &str = "_temp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLayout {
    pub storage_root: PathBuf,
    pub bundle_dir: PathBuf,
    /// Entry file, relative to a content root.
    pub start_page: String,
}

impl ContentLayout {
    pub fn new(storage_root: PathBuf, bundle_dir: PathBuf, start_page: String) -> Self {
        Self {
            storage_root,
            bundle_dir,
            start_page,
        }
    }

    /// `<storage_root>/state.json`
    pub fn state_path(&self) -> PathBuf {
        self.storage_root.join(STATE_FILE_NAME)
    }

    /// `<storage_root>/<version>`
    ///
    /// Callers that delete this directory must check
    /// [`Version::is_path_safe`] first.
    pub fn version_dir(&self, version: &Version) -> PathBuf {
        self.storage_root.join(version.as_str())
    }

    /// `<storage_root>/<version>/www`
    pub fn content_dir(&self, version: &Version) -> PathBuf {
        self.version_dir(version).join(CONTENT_DIR_NAME)
    }

    /// `<storage_root>/<version>/_temp`
    pub fn temp_dir(&self, version: &Version) -> PathBuf {
        self.version_dir(version).join(TEMP_DIR_NAME)
    }

    /// The start page inside an arbitrary content root.
    pub fn start_page_in(&self, root: &Path) -> PathBuf {
        root.join(self.start_page.trim_start_matches('/'))
    }

    pub fn bundle_descriptor_path(&self) -> PathBuf {
        descriptor_path_in(&self.bundle_dir)
    }

    pub fn bundle_manifest_path(&self) -> PathBuf {
        manifest_path_in(&self.bundle_dir)
    }
}

/// `<root>/chcp.json`
pub fn descriptor_path_in(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

/// `<root>/chcp.manifest`
pub fn manifest_path_in(root: &Path) -> PathBuf {
    root.join(MANIFEST_FILE_NAME)
}
