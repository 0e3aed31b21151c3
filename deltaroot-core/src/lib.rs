//! deltaroot core library: version descriptors, manifests, settings,
//! on-disk layout and the persisted application state.
//!
//! - [`types`]: [`Policy`], [`Version`], [`VersionDescriptor`], [`Manifest`]
//! - [`config`]: YAML [`Settings`]
//! - [`layout`]: [`ContentLayout`] path derivation
//! - [`state`]: [`ApplicationState`] and its atomic [`StateStore`]
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod error;
pub mod layout;
pub mod state;
pub mod types;

pub use config::Settings;
pub use error::CoreError;
pub use layout::ContentLayout;
pub use state::{ApplicationState, StateStore};
pub use types::{
    Manifest, ManifestEntry, Policy, Version, VersionDescriptor, CONFIG_FILE_NAME,
    MANIFEST_FILE_NAME,
};
