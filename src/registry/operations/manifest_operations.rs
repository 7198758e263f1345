//! Manifest operations for registry client
//!
//! Implements Docker Registry v2 and OCI manifest operations:
//! - Manifest download (GET /v2/{name}/manifests/{reference})
//! - Manifest upload (PUT /v2/{name}/manifests/{reference})

use crate::error::handlers::HttpErrorHandler;
use crate::error::{MirrorError, Result};
use crate::image::manifest::{ACCEPTED_MANIFEST_TYPES, Manifest};
use crate::registry::auth::{pull_scope, push_scope};
use crate::registry::token_manager::TokenManager;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

#[derive(Clone)]
pub struct ManifestOperations {
    client: Client,
    address: String,
    token_manager: TokenManager,
}

impl ManifestOperations {
    pub fn new(client: Client, address: String, token_manager: TokenManager) -> Self {
        Self {
            client,
            address,
            token_manager,
        }
    }

    /// Download a manifest by tag or digest with multi-format Accept headers
    pub async fn pull_manifest(&self, repository: &str, reference: &str) -> Result<Manifest> {
        let scope = pull_scope(repository);
        let url = format!("{}/v2/{}/manifests/{}", self.address, repository, reference);

        let response = self
            .token_manager
            .execute_with_retry(&scope, "manifest pull", || {
                self.client.get(&url).header(ACCEPT, ACCEPTED_MANIFEST_TYPES)
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
                &format!("manifest pull for {}:{}", repository, reference),
            ));
        }

        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| MirrorError::Network(format!("Failed to read manifest response: {}", e)))?;

        tracing::debug!(
            repository = %repository,
            reference = %reference,
            media_type = %media_type,
            "pulled manifest"
        );
        Ok(Manifest::new(media_type, data.to_vec()))
    }

    /// Upload a manifest under a tag or digest, keeping its bytes unchanged
    pub async fn upload_manifest(
        &self,
        repository: &str,
        reference: &str,
        manifest: &Manifest,
    ) -> Result<()> {
        let scope = push_scope(repository);
        let url = format!("{}/v2/{}/manifests/{}", self.address, repository, reference);
        let content_type = manifest.content_type()?;

        let response = self
            .token_manager
            .execute_with_retry(&scope, "manifest upload", || {
                self.client
                    .put(&url)
                    .header(CONTENT_TYPE, content_type)
                    .body(manifest.data.clone())
            })
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(repository = %repository, reference = %reference, "manifest uploaded");
            Ok(())
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            Err(HttpErrorHandler::handle_registry_error(
                status,
                &error_text,
                &format!("manifest upload for {}:{}", repository, reference),
            ))
        }
    }
}
