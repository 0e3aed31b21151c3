//! Remote content source.
//!
//! The engine only needs two operations from the network: fetch a small text
//! document and stream a file to disk. [`HttpSource`] is the production
//! implementation; tests plug in an in-memory one.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::io::AsyncWriteExt;

use deltaroot_core::Settings;

use crate::error::{io_err, SyncError};

#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// GET `url` and return the body as text.
    async fn fetch_text(&self, url: &str) -> Result<String, SyncError>;

    /// GET `url` and stream the body into `dest`, returning the byte count.
    ///
    /// `dest`'s parent directory already exists.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, SyncError>;
}

/// reqwest-backed [`RemoteSource`].
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(headers: &BTreeMap<String, String>, timeout: Duration) -> Result<Self, SyncError> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let invalid = || SyncError::InvalidHeader { name: name.clone() };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            header_map.insert(header_name, header_value);
        }

        let client = reqwest::Client::builder()
            .user_agent(format!("deltaroot/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(header_map)
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Http {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    /// Build from `request_headers` / `request_timeout_secs`.
    pub fn from_settings(settings: &Settings) -> Result<Self, SyncError> {
        Self::new(
            &settings.request_headers,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, SyncError> {
        self.client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| http_err(url, e))
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    async fn fetch_text(&self, url: &str) -> Result<String, SyncError> {
        tracing::debug!(url, "fetching document");
        self.get(url).await?.text().await.map_err(|e| http_err(url, e))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, SyncError> {
        let response = self.get(url).await?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| io_err(dest, e))?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| http_err(url, e))?;
            file.write_all(&chunk).await.map_err(|e| io_err(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| io_err(dest, e))?;

        tracing::debug!(url, bytes = written, "download complete");
        Ok(written)
    }
}

fn http_err(url: &str, err: reqwest::Error) -> SyncError {
    SyncError::Http {
        url: url.to_string(),
        message: err.to_string(),
    }
}
