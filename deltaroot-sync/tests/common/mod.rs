//! Shared fixtures: an on-disk bundle plus an in-memory remote.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use deltaroot_core::{ContentLayout, Settings};
use deltaroot_sync::{RemoteSource, SyncError, UpdateEngine, UpdateEvent};
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const CONTENT_URL: &str = "https://cdn.test/app";
pub const V1: &str = "2024.01.01-10.00.00";
pub const V2: &str = "2024.01.02-09.00.00";

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

/// URL → body map with failure injection.
#[derive(Default)]
pub struct FakeSource {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    /// Downloads of these URLs report success but write nothing.
    ghosts: Mutex<HashSet<String>>,
    requests: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, path: &str, body: impl Into<Vec<u8>>) {
        self.bodies
            .lock()
            .expect("lock")
            .insert(format!("{CONTENT_URL}/{path}"), body.into());
    }

    pub fn remove(&self, path: &str) {
        self.bodies
            .lock()
            .expect("lock")
            .remove(&format!("{CONTENT_URL}/{path}"));
    }

    pub fn ghost(&self, path: &str) {
        self.ghosts
            .lock()
            .expect("lock")
            .insert(format!("{CONTENT_URL}/{path}"));
    }

    /// Publish a version: descriptor, manifest and one body per file.
    pub fn publish(&self, version: &str, update: &str, install: &str, files: &[(&str, &str, &str)]) {
        self.put("chcp.json", descriptor_json(version, update, install));
        let entries: Vec<(&str, &str)> = files.iter().map(|(p, h, _)| (*p, *h)).collect();
        self.put("chcp.manifest", manifest_json(&entries));
        for (path, _, body) in files {
            self.put(path, *body);
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("lock").clone()
    }

    fn body(&self, url: &str) -> Result<Vec<u8>, SyncError> {
        self.requests.lock().expect("lock").push(url.to_string());
        self.bodies
            .lock()
            .expect("lock")
            .get(url)
            .cloned()
            .ok_or_else(|| SyncError::Http {
                url: url.to_string(),
                message: "HTTP status client error (404 Not Found)".to_string(),
            })
    }
}

#[async_trait]
impl RemoteSource for FakeSource {
    async fn fetch_text(&self, url: &str) -> Result<String, SyncError> {
        let body = self.body(url)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, SyncError> {
        if self.ghosts.lock().expect("lock").contains(url) {
            self.requests.lock().expect("lock").push(url.to_string());
            return Ok(0);
        }
        let body = self.body(url)?;
        std::fs::write(dest, &body).expect("write download");
        Ok(body.len() as u64)
    }
}

pub fn descriptor_json(version: &str, update: &str, install: &str) -> String {
    format!(
        r#"{{"content_url":"{CONTENT_URL}","release":"{version}","update":"{update}","install":"{install}"}}"#
    )
}

pub fn manifest_json(entries: &[(&str, &str)]) -> String {
    let items: Vec<String> = entries
        .iter()
        .map(|(file, hash)| format!(r#"{{"file":"{file}","hash":"{hash}"}}"#))
        .collect();
    format!("[{}]", items.join(","))
}

// ---------------------------------------------------------------------------
// Local
// ---------------------------------------------------------------------------

/// Bundle at V1: `index.html` (i1), `a.js` (h1), `b.js` (h2).
pub const BUNDLE_FILES: &[(&str, &str, &str)] = &[
    ("index.html", "i1", "<html>v1</html>"),
    ("a.js", "h1", "console.log('a')"),
    ("b.js", "h2", "console.log('b1')"),
];

pub struct Fixture {
    pub dir: TempDir,
    pub settings: Settings,
    pub layout: ContentLayout,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_start_page("index.html")
    }

    pub fn with_start_page(start_page: &str) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let settings = Settings {
            storage_root: Some(dir.path().join("content")),
            bundle_dir: Some(dir.path().join("bundle")),
            start_page: start_page.to_string(),
            max_concurrent_downloads: 2,
            ..Settings::default()
        };
        let layout = settings.layout_at(dir.path());

        let bundle = &layout.bundle_dir;
        std::fs::create_dir_all(bundle).expect("bundle dir");
        std::fs::write(bundle.join("chcp.json"), descriptor_json(V1, "now", "now"))
            .expect("bundle descriptor");
        let entries: Vec<(&str, &str)> = BUNDLE_FILES.iter().map(|(p, h, _)| (*p, *h)).collect();
        std::fs::write(bundle.join("chcp.manifest"), manifest_json(&entries))
            .expect("bundle manifest");
        for (path, _, body) in BUNDLE_FILES {
            std::fs::write(bundle.join(path), body).expect("bundle file");
        }

        Self {
            dir,
            settings,
            layout,
        }
    }

    pub fn engine(&self, source: &Arc<FakeSource>) -> UpdateEngine {
        let source: Arc<dyn RemoteSource> = source.clone();
        UpdateEngine::open(self.settings.clone(), self.layout.clone(), source).expect("open engine")
    }
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<UpdateEvent>) -> Vec<UpdateEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
