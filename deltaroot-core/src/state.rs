//! Persisted application state.
//!
//! One pretty-printed JSON document at `<storage_root>/state.json`, owned by
//! a single [`StateStore`]. Every mutation goes through [`StateStore::update`]
//! which flushes before the in-memory copy changes.
//!
//! Write flow: serialize → `state.json.tmp` sibling → `rename`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::{Policy, Version};

/// Version pointers and the policies of the last installed descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationState {
    #[serde(deserialize_with = "empty_as_none")]
    pub current_version: Option<Version>,
    #[serde(deserialize_with = "empty_as_none")]
    pub previous_version: Option<Version>,
    /// Downloaded but not yet promoted.
    #[serde(deserialize_with = "empty_as_none")]
    pub ready_install_version: Option<Version>,
    pub update_policy: Policy,
    pub install_policy: Policy,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<Version>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()).map(Version))
}

/// Owner of `state.json`.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: ApplicationState,
}

impl StateStore {
    /// Load the state document at `path`.
    ///
    /// When no current version is recorded (file absent, or the key empty)
    /// it is initialised from `baseline` and persisted straight away.
    pub fn load_at(path: impl Into<PathBuf>, baseline: Option<&Version>) -> Result<Self, CoreError> {
        let path = path.into();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            if contents.trim().is_empty() {
                ApplicationState::default()
            } else {
                serde_json::from_str(&contents).map_err(|source| CoreError::CorruptState {
                    path: path.clone(),
                    source,
                })?
            }
        } else {
            ApplicationState::default()
        };

        let mut store = Self { path, state };
        if store.state.current_version.is_none() {
            if let Some(baseline) = baseline {
                tracing::info!(version = %baseline, "initialising application state from baseline");
                store.update(|s| s.current_version = Some(baseline.clone()))?;
            }
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &ApplicationState {
        &self.state
    }

    /// Apply `mutate` to a copy of the state, persist it, then adopt it.
    ///
    /// On a write failure the in-memory state is left unchanged.
    pub fn update<F>(&mut self, mutate: F) -> Result<(), CoreError>
    where
        F: FnOnce(&mut ApplicationState),
    {
        let mut next = self.state.clone();
        mutate(&mut next);
        write_atomic(&self.path, &next)?;
        self.state = next;
        Ok(())
    }

    /// Flush the current state unchanged.
    pub fn save(&self) -> Result<(), CoreError> {
        write_atomic(&self.path, &self.state)
    }
}

fn write_atomic(path: &Path, state: &ApplicationState) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(&tmp_path, json).map_err(|e| io_err(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| io_err(path, e))?;
    tracing::debug!(path = %path.display(), "application state saved");
    Ok(())
}
