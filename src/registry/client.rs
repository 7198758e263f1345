// HTTP implementation of the `Registry` capability: one client per registry,
// sharing a reqwest connection pool and a per-scope token cache between the
// repository, manifest and blob operations.

use crate::error::{MirrorError, Result};
use crate::image::{ImageRef, Manifest, RegistryRef, RepositoryRef};
use crate::registry::auth::Auth;
use crate::registry::operations::{BlobOperations, ManifestOperations, RepositoryOperations};
use crate::registry::token_manager::TokenManager;
use crate::registry::{BlobStream, Registry};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

pub struct RegistryClientBuilder {
    reference: RegistryRef,
    timeout: Duration,
}

impl RegistryClientBuilder {
    pub fn new(reference: RegistryRef) -> Self {
        Self {
            reference,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Deadline of metadata requests, and the connect and idle-read timeout
    /// of blob transfers
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn http_client(builder: ClientBuilder) -> Result<Client> {
        builder
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MirrorError::Configuration(format!("Failed to create HTTP client: {}", e)))
    }

    pub fn build(self) -> Result<RegistryClient> {
        let client = Self::http_client(Client::builder().timeout(self.timeout))?;
        let transfer = Self::http_client(
            Client::builder()
                .connect_timeout(self.timeout)
                .read_timeout(self.timeout),
        )?;

        let address = self.reference.endpoint();
        url::Url::parse(&address).map_err(|e| {
            MirrorError::Configuration(format!(
                "Invalid registry address '{}' for {}: {}",
                address,
                self.reference.name(),
                e
            ))
        })?;

        let auth = Auth::new(client.clone(), self.reference.credential().cloned());
        let token_manager = TokenManager::new(auth);

        Ok(RegistryClient {
            name: self.reference.name().to_string(),
            repositories: RepositoryOperations::new(
                client.clone(),
                address.clone(),
                token_manager.clone(),
            ),
            manifests: ManifestOperations::new(client.clone(), address.clone(), token_manager.clone()),
            blobs: BlobOperations::new(client, transfer, address.clone(), token_manager),
            address,
        })
    }
}

pub struct RegistryClient {
    name: String,
    address: String,
    repositories: RepositoryOperations,
    manifests: ManifestOperations,
    blobs: BlobOperations,
}

impl RegistryClient {
    pub fn new(reference: RegistryRef) -> Result<Self> {
        Self::builder(reference).build()
    }

    pub fn builder(reference: RegistryRef) -> RegistryClientBuilder {
        RegistryClientBuilder::new(reference)
    }

    /// Base URL requests are sent to
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Registry for RegistryClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tags(&self, repository: &RepositoryRef) -> Result<Vec<String>> {
        self.repositories.list_tags(&repository.api_path()).await
    }

    async fn exists(&self, image: &ImageRef) -> Result<bool> {
        self.repositories
            .check_image_exists(&image.repository.api_path(), &image.tag)
            .await
    }

    async fn pull_manifest(&self, repository: &RepositoryRef, reference: &str) -> Result<Manifest> {
        self.manifests
            .pull_manifest(&repository.api_path(), reference)
            .await
    }

    async fn push_manifest(
        &self,
        repository: &RepositoryRef,
        reference: &str,
        manifest: &Manifest,
    ) -> Result<()> {
        self.manifests
            .upload_manifest(&repository.api_path(), reference, manifest)
            .await
    }

    async fn blob_exists(&self, repository: &RepositoryRef, digest: &str) -> Result<bool> {
        self.blobs
            .check_blob_exists(&repository.api_path(), digest)
            .await
    }

    async fn pull_blob(&self, repository: &RepositoryRef, digest: &str) -> Result<BlobStream> {
        self.blobs.pull_blob(&repository.api_path(), digest).await
    }

    async fn push_blob(
        &self,
        repository: &RepositoryRef,
        digest: &str,
        size: u64,
        content: BlobStream,
    ) -> Result<()> {
        self.blobs
            .upload_blob(&repository.api_path(), digest, size, content)
            .await
    }
}
