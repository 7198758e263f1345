//! Blob operations for registry client
//!
//! Implements Docker Registry v2 blob operations:
//! - Blob existence checks (HEAD /v2/{name}/blobs/{digest})
//! - Blob download (GET /v2/{name}/blobs/{digest})
//! - Monolithic upload (POST /v2/{name}/blobs/uploads/ then PUT ?digest=)
//!
//! Blob bodies are streamed and go through `transfer`, a client without a
//! total request deadline, so a large layer is bounded by its read progress
//! rather than by its size.

use crate::error::handlers::HttpErrorHandler;
use crate::error::{MirrorError, Result};
use crate::registry::BlobStream;
use crate::registry::auth::{pull_scope, push_scope};
use crate::registry::token_manager::TokenManager;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Body, Client, StatusCode};

#[derive(Clone)]
pub struct BlobOperations {
    client: Client,
    transfer: Client,
    address: String,
    token_manager: TokenManager,
}

impl BlobOperations {
    pub fn new(client: Client, transfer: Client, address: String, token_manager: TokenManager) -> Self {
        Self {
            client,
            transfer,
            address,
            token_manager,
        }
    }

    /// Check if a blob exists using a HEAD request
    pub async fn check_blob_exists(&self, repository: &str, digest: &str) -> Result<bool> {
        // push scope: existence is only asked on the side we are about to write
        let scope = push_scope(repository);
        let url = format!("{}/v2/{}/blobs/{}", self.address, repository, digest);

        let response = self
            .token_manager
            .execute_with_retry(&scope, "blob existence check", || self.client.head(&url))
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(HttpErrorHandler::handle_registry_error(
                status,
                "",
                &format!("blob existence check for {}@{}", repository, digest),
            )),
        }
    }

    /// Open a blob download; redirects to storage backends are followed
    pub async fn pull_blob(&self, repository: &str, digest: &str) -> Result<BlobStream> {
        let scope = pull_scope(repository);
        let url = format!("{}/v2/{}/blobs/{}", self.address, repository, digest);

        let response = self
            .token_manager
            .execute_with_retry(&scope, "blob download", || self.transfer.get(&url))
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(HttpErrorHandler::handle_registry_error(
                status,
                &error_text,
                &format!("blob download for {}@{}", repository, digest),
            ));
        }

        let digest = digest.to_string();
        Ok(response
            .bytes_stream()
            .map_err(move |e| MirrorError::Network(format!("Failed to read blob {}: {}", digest, e)))
            .boxed())
    }

    /// Upload a blob with the staged monolithic pattern.
    ///
    /// `content` cannot be replayed, so the `PUT` carries the credential the
    /// session `POST` already negotiated for the same scope.
    pub async fn upload_blob(&self, repository: &str, digest: &str, size: u64, content: BlobStream) -> Result<()> {
        let scope = push_scope(repository);
        let upload_url = format!("{}/v2/{}/blobs/uploads/", self.address, repository);

        let response = self
            .token_manager
            .execute_with_retry(&scope, "blob upload session", || {
                self.client.post(&upload_url).header(CONTENT_LENGTH, "0")
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(HttpErrorHandler::handle_registry_error(
                status,
                &error_text,
                &format!("blob upload session for {}", repository),
            ));
        }

        let location = response
            .headers()
            .get(LOCATION)
            .ok_or_else(|| MirrorError::Registry("Missing Location header in upload response".to_string()))?
            .to_str()
            .map_err(|e| MirrorError::Registry(format!("Invalid Location header: {}", e)))?;

        let mut final_url = url::Url::parse(&upload_url)?.join(location)?;
        final_url.query_pairs_mut().append_pair("digest", digest);

        let request = self
            .transfer
            .put(final_url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, size.to_string())
            .body(Body::wrap_stream(content));
        let response = self
            .token_manager
            .execute_once(&scope, "blob upload", request)
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(repository = %repository, digest = %digest, size, "blob uploaded");
            Ok(())
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            Err(HttpErrorHandler::handle_registry_error(
                status,
                &error_text,
                &format!("blob upload for {}@{}", repository, digest),
            ))
        }
    }
}
