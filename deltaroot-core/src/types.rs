//! Domain types for deltaroot.
//!
//! A content version is described by a `chcp.json` version descriptor and a
//! `chcp.manifest` file inventory. Both live at the root of every content
//! directory, remote or local.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{io_err, CoreError};

/// File name of the version descriptor inside a content root.
pub const CONFIG_FILE_NAME: &str = "chcp.json";

/// File name of the manifest inside a content root.
pub const MANIFEST_FILE_NAME: &str = "chcp.manifest";

/// `chrono` pattern for release strings (`yyyy.MM.dd-HH.mm.ss`).
pub const VERSION_FORMAT: &str = "%Y.%m.%d-%H.%M.%S";

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// When an update or install action should happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Policy {
    /// On the next application start.
    Start,
    /// When the application returns to the foreground.
    Resume,
    /// Immediately.
    Now,
    /// Never, or not configured.
    #[default]
    None,
}

impl Policy {
    /// Case-insensitive parse; anything unrecognised is [`Policy::None`].
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "start" => Policy::Start,
            "resume" => Policy::Resume,
            "now" => Policy::Now,
            _ => Policy::None,
        }
    }
}

impl From<&str> for Policy {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for Policy {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Start => write!(f, "start"),
            Policy::Resume => write!(f, "resume"),
            Policy::Now => write!(f, "now"),
            Policy::None => write!(f, "none"),
        }
    }
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// A release string such as `2024.01.02-09.00.00`.
///
/// Versions are compared as timestamps, never as raw strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub String);

impl Version {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The release timestamp, or `None` if the string does not follow
    /// [`VERSION_FORMAT`].
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(self.0.trim(), VERSION_FORMAT).ok()
    }

    /// Usable as a single directory name below the storage root.
    pub fn is_path_safe(&self) -> bool {
        let name = self.0.as_str();
        !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
    }

    /// `true` when `self` is strictly newer than `other`.
    ///
    /// Identical strings are never newer. A string that cannot be parsed as a
    /// release timestamp never counts as newer either.
    pub fn is_newer_than(&self, other: &Version) -> bool {
        if self == other {
            return false;
        }
        match (self.timestamp(), other.timestamp()) {
            (Some(new), Some(old)) => new > old,
            _ => {
                tracing::warn!(
                    new = %self,
                    old = %other,
                    "release string does not match {VERSION_FORMAT}; treating as not newer",
                );
                false
            }
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// VersionDescriptor
// ---------------------------------------------------------------------------

/// Parsed `chcp.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionDescriptor {
    pub content_url: String,
    pub version: Version,
    pub update_policy: Policy,
    pub install_policy: Policy,
}

impl VersionDescriptor {
    /// Parse a version-configuration document.
    ///
    /// `content_url` and `release` must both be present (an empty string is
    /// accepted). `update` and `install` are optional and default to
    /// [`Policy::None`].
    pub fn parse(document: &str) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_str(document.trim()).map_err(|err| {
            CoreError::MalformedVersionDescriptor {
                reason: format!("not a JSON document: {err}"),
            }
        })?;
        Self::from_value(&value)
    }

    /// Build a descriptor from an already-decoded JSON value.
    pub fn from_value(value: &Value) -> Result<Self, CoreError> {
        let Some(object) = value.as_object() else {
            return Err(CoreError::MalformedVersionDescriptor {
                reason: "expected a JSON object".to_string(),
            });
        };

        let content_url = required_text(object, "content_url")?;
        let release = required_text(object, "release")?;

        Ok(Self {
            content_url,
            version: Version(release),
            update_policy: optional_policy(object, "update"),
            install_policy: optional_policy(object, "install"),
        })
    }

    /// Read and parse a descriptor file.
    pub fn read_from(path: &Path) -> Result<Self, CoreError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        Self::parse(&contents)
    }

    /// `<content_url>/chcp.json`
    pub fn config_url(&self) -> String {
        join_url(&self.content_url, CONFIG_FILE_NAME)
    }

    /// `<content_url>/chcp.manifest`
    pub fn manifest_url(&self) -> String {
        join_url(&self.content_url, MANIFEST_FILE_NAME)
    }

    /// URL of a manifest entry below this descriptor's content root.
    pub fn file_url(&self, relative_path: &str) -> String {
        join_url(&self.content_url, relative_path)
    }
}

fn required_text(object: &Map<String, Value>, key: &str) -> Result<String, CoreError> {
    match object.get(key) {
        None => Err(CoreError::MalformedVersionDescriptor {
            reason: format!("missing required key '{key}'"),
        }),
        Some(value) => scalar_text(value).ok_or_else(|| CoreError::MalformedVersionDescriptor {
            reason: format!("key '{key}' must be a string"),
        }),
    }
}

fn optional_policy(object: &Map<String, Value>, key: &str) -> Policy {
    object
        .get(key)
        .and_then(scalar_text)
        .map(|text| Policy::parse(&text))
        .unwrap_or_default()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Join a URL root and a relative path with exactly one `/` between them.
pub fn join_url(root: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        root.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// One `(path, hash)` pair of a manifest.
///
/// Equality is by the pair: the same path with a different hash is a
/// different entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(rename = "file")]
    pub path: String,
    pub hash: String,
}

impl ManifestEntry {
    pub fn new(path: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            hash: hash.into(),
        }
    }

    /// The two entries every update re-downloads: `chcp.json` and
    /// `chcp.manifest`, with empty hashes.
    pub fn bookkeeping() -> [ManifestEntry; 2] {
        [
            ManifestEntry::new(CONFIG_FILE_NAME, ""),
            ManifestEntry::new(MANIFEST_FILE_NAME, ""),
        ]
    }

    /// `true` for `chcp.json` / `chcp.manifest`, whatever the hash.
    pub fn is_bookkeeping(&self) -> bool {
        let path = self.path.trim_start_matches('/');
        path == CONFIG_FILE_NAME || path == MANIFEST_FILE_NAME
    }

    /// Resolve the entry below `root`.
    ///
    /// Returns `None` for paths that are empty or would leave `root`
    /// (`..`, drive prefixes). A single leading `/` is tolerated.
    pub fn resolve_under(&self, root: &Path) -> Option<PathBuf> {
        let relative = Path::new(self.path.trim_start_matches('/'));
        let mut resolved = root.to_path_buf();
        let mut pushed = false;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    pushed = true;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        pushed.then_some(resolved)
    }
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hash.is_empty() {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{} ({})", self.path, self.hash)
        }
    }
}

/// A version's file inventory: an unordered set of [`ManifestEntry`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest(BTreeSet<ManifestEntry>);

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a `chcp.manifest` document: a JSON array of
    /// `{"file": ..., "hash": ...}` objects. Duplicate pairs collapse.
    pub fn parse(document: &str) -> Result<Self, CoreError> {
        let entries: Vec<ManifestEntry> = serde_json::from_str(document.trim())
            .map_err(|source| CoreError::InvalidManifest { source })?;
        Ok(entries.into_iter().collect())
    }

    /// Read and decode a manifest file.
    pub fn read_from(path: &Path) -> Result<Self, CoreError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        Self::parse(&contents)
    }

    pub fn insert(&mut self, entry: ManifestEntry) -> bool {
        self.0.insert(entry)
    }

    pub fn contains(&self, entry: &ManifestEntry) -> bool {
        self.0.contains(entry)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.0.iter()
    }

    /// Entries present in both manifests (same path and hash).
    pub fn intersection(&self, other: &Manifest) -> Manifest {
        self.0.intersection(&other.0).cloned().collect()
    }

    /// Entries of `self` with no identical pair in `other`.
    pub fn difference(&self, other: &Manifest) -> Manifest {
        self.0.difference(&other.0).cloned().collect()
    }
}

impl FromIterator<ManifestEntry> for Manifest {
    fn from_iter<I: IntoIterator<Item = ManifestEntry>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Manifest {
    type Item = ManifestEntry;
    type IntoIter = std::collections::btree_set::IntoIter<ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestEntry;
    type IntoIter = std::collections::btree_set::Iter<'a, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
