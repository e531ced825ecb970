//! Blob-store collaborator.
//!
//! Uploads go to an external endpoint as a POST with the target blob name
//! in the `name` query parameter and the raw bytes as the body. The store
//! serves uploaded blobs under a public base URL. Both sides sit behind the
//! [`BlobStore`] trait so the refresh worker can be driven against a stub.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::UploadConfig;

/// Blob name of the persisted manifest backup.
pub const MANIFEST_NAME: &str = "fpl-league-manifest.json";

/// Cache-Control applied to every upload so CDNs never pin stale bytes to
/// a mutable name.
const NO_CACHE: &str = "no-cache, no-store, must-revalidate, max-age=0";

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `data` under `name`, overwriting any existing blob. Returns
    /// only after the store acknowledges the write.
    async fn upload(&self, name: &str, data: &[u8], content_type: &str) -> Result<()>;

    /// Download a blob by full public URL.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    /// Public URL under which `name` is served.
    fn public_url(&self, name: &str) -> String;
}

/// The real HTTP-backed store.
pub struct HttpBlobStore {
    http: reqwest::Client,
    endpoint: String,
    public_base: String,
}

impl HttpBlobStore {
    pub fn new(config: &UploadConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            public_base: config.public_base.clone(),
        })
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(&self, name: &str, data: &[u8], content_type: &str) -> Result<()> {
        self.http
            .post(&self.endpoint)
            .query(&[("name", name)])
            .header("Content-Type", content_type)
            .header("Cache-Control", NO_CACHE)
            .header("CDN-Cache-Control", "no-cache")
            .body(data.to_vec())
            .send()
            .await
            .with_context(|| format!("upload request for {} failed", name))?
            .error_for_status()
            .with_context(|| format!("blob store rejected upload of {}", name))?;
        Ok(())
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("fetch of {} failed", url))?
            .error_for_status()
            .with_context(|| format!("blob store returned error for {}", url))?;
        Ok(response.bytes().await?.to_vec())
    }

    fn public_url(&self, name: &str) -> String {
        format!("{}{}", self.public_base, name)
    }
}
