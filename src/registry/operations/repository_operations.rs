//! Repository operations for registry client
//!
//! Implements Docker Registry v2 repository-level operations:
//! - Tag listing (GET /v2/{name}/tags/list), following `Link` pagination
//! - Image existence checks (HEAD /v2/{name}/manifests/{reference})

use crate::error::handlers::HttpErrorHandler;
use crate::error::{MirrorError, Result};
use crate::image::manifest::ACCEPTED_MANIFEST_TYPES;
use crate::registry::auth::pull_scope;
use crate::registry::token_manager::TokenManager;
use reqwest::header::{ACCEPT, LINK};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

const PAGE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct RepositoryOperations {
    client: Client,
    address: String,
    token_manager: TokenManager,
}

impl RepositoryOperations {
    pub fn new(client: Client, address: String, token_manager: TokenManager) -> Self {
        Self {
            client,
            address,
            token_manager,
        }
    }

    /// List all tags in a repository
    pub async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        let scope = pull_scope(repository);
        let mut next = Some(url::Url::parse(&format!(
            "{}/v2/{}/tags/list?n={}",
            self.address, repository, PAGE_SIZE
        ))?);
        let mut tags = Vec::new();

        while let Some(url) = next.take() {
            let response = self
                .token_manager
                .execute_with_retry(&scope, "tag listing", || self.client.get(url.clone()))
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
                    &format!("tag listing for {}", repository),
                ));
            }

            next = response
                .headers()
                .get(LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(next_link)
                .map(|link| url.join(&link))
                .transpose()?;

            let page: TagList = response
                .json()
                .await
                .map_err(|e| MirrorError::Parse(format!("Failed to parse tags response: {}", e)))?;
            tags.extend(page.tags.unwrap_or_default());
        }

        tracing::debug!(repository = %repository, count = tags.len(), "listed tags");
        Ok(tags)
    }

    /// Check whether a manifest exists.
    ///
    /// `Ok(false)` only for a definite `404`; any other failure is an error.
    pub async fn check_image_exists(&self, repository: &str, reference: &str) -> Result<bool> {
        let scope = pull_scope(repository);
        let url = format!("{}/v2/{}/manifests/{}", self.address, repository, reference);

        let response = self
            .token_manager
            .execute_with_retry(&scope, "image existence check", || {
                self.client.head(&url).header(ACCEPT, ACCEPTED_MANIFEST_TYPES)
            })
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(HttpErrorHandler::handle_registry_error(
                status,
                "",
                &format!("existence check for {}:{}", repository, reference),
            )),
        }
    }
}

/// Extract the target of a `rel="next"` entry from a `Link` header
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|param| param.trim().replace(' ', "") == "rel=\"next\"" || param.trim() == "rel=next");
        if !is_next {
            return None;
        }
        let target = target.trim();
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}
