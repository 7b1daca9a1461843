//! services/api/src/adapters/storage.rs
//!
//! A `StorageService` backed by the hosted backend's object storage
//! (`/storage/v1/object/...`). Objects are written to a single public bucket.

use async_trait::async_trait;
use bytes::Bytes;
use nexus_core::ports::{PortError, PortResult, StorageService};
use reqwest::{header, Client};
use tracing::{debug, error};

pub struct ObjectStorageAdapter {
    client: Client,
    base_url: String,
    bucket: String,
    key: String,
}

impl ObjectStorageAdapter {
    /// `key` is sent both as the `apikey` header and as the bearer token.
    pub fn new(client: Client, project_url: &str, bucket: String, key: String) -> Self {
        Self {
            client,
            base_url: format!("{}/storage/v1", project_url),
            bucket,
            key,
        }
    }
}

#[async_trait]
impl StorageService for ObjectStorageAdapter {
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> PortResult<()> {
        let url = format!("{}/object/{}/{}", self.base_url, self.bucket, path);
        debug!(path, bytes = data.len(), "Uploading object");

        let response = self
            .client
            .post(url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(data)
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(path, %status, "Object upload rejected: {}", body);
            return Err(PortError::Unexpected(format!(
                "Storage upload failed with {}: {}",
                status, body
            )));
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/object/public/{}/{}", self.base_url, self.bucket, path)
    }
}
