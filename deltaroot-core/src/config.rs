//! YAML settings.
//!
//! ```text
//! ~/.deltaroot/
//!   config.yaml     (optional; every key has a default)
//!   content/        (default storage_root)
//!   bundle/         (default bundle_dir)
//! ```
//!
//! Follows the `fn_at(home: &Path, …)` + `fn(…)` pattern: tests always call
//! the `_at` form with a `TempDir`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::layout::ContentLayout;

const DEFAULT_START_PAGE: &str = "index.html";
const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 8;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Contents of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Remote `chcp.json` URL. When unset the local descriptor's own
    /// `config_url` is used.
    pub config_url: Option<String>,
    /// Extra headers sent with every GET.
    pub request_headers: BTreeMap<String, String>,
    pub storage_root: Option<PathBuf>,
    pub bundle_dir: Option<PathBuf>,
    pub start_page: String,
    pub max_concurrent_downloads: usize,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_url: None,
            request_headers: BTreeMap::new(),
            storage_root: None,
            bundle_dir: None,
            start_page: DEFAULT_START_PAGE.to_string(),
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Load settings from an explicit file.
    ///
    /// A missing file yields [`Settings::default`]. Relative `storage_root` /
    /// `bundle_dir` values are resolved against the file's directory.
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let mut settings: Settings = if contents.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(&contents).map_err(|source| CoreError::Settings {
                path: path.to_path_buf(),
                source,
            })?
        };

        if let Some(base) = path.parent() {
            settings.storage_root = settings.storage_root.map(|p| absolutize(base, p));
            settings.bundle_dir = settings.bundle_dir.map(|p| absolutize(base, p));
        }
        Ok(settings)
    }

    /// Load `<home>/.deltaroot/config.yaml`.
    pub fn load_at(home: &Path) -> Result<Self, CoreError> {
        Self::load_from(&config_path_at(home))
    }

    /// `load_at` convenience wrapper.
    pub fn load() -> Result<Self, CoreError> {
        Self::load_at(&home()?)
    }

    /// Resolve the on-disk layout, filling unset directories from `home`.
    pub fn layout_at(&self, home: &Path) -> ContentLayout {
        let base = home.join(".deltaroot");
        ContentLayout::new(
            self.storage_root
                .clone()
                .unwrap_or_else(|| base.join("content")),
            self.bundle_dir.clone().unwrap_or_else(|| base.join("bundle")),
            self.start_page.clone(),
        )
    }

    /// `layout_at` convenience wrapper.
    pub fn layout(&self) -> Result<ContentLayout, CoreError> {
        Ok(self.layout_at(&home()?))
    }

    /// Download concurrency, never below one.
    pub fn download_limit(&self) -> usize {
        self.max_concurrent_downloads.max(1)
    }
}

/// `<home>/.deltaroot/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".deltaroot").join("config.yaml")
}

/// `config_path_at` convenience wrapper.
pub fn config_path() -> Result<PathBuf, CoreError> {
    Ok(config_path_at(&home()?))
}

fn absolutize(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

fn home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}
