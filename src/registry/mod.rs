//! Registry module for Docker Registry HTTP API v2 / OCI distribution access
//!
//! [`Registry`] is the capability the mirroring engine consumes: list tags,
//! check existence, copy an image. [`RegistryClient`] implements it over HTTP
//! and [`RegistryDirectory`] maps registry names to live clients.

pub mod auth;
pub mod client;
pub mod copy;
pub mod directory;
pub mod operations;
pub mod token_manager;

use crate::error::Result;
use crate::image::{ImageRef, Manifest, RepositoryRef};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

pub use client::{RegistryClient, RegistryClientBuilder};
pub use directory::RegistryDirectory;

/// Blob content as it arrives from the wire
pub type BlobStream = BoxStream<'static, Result<Bytes>>;

/// Operations a mirror needs from one registry.
///
/// Repositories are addressed by [`RepositoryRef`]; the implementation is
/// responsible for mapping them to its wire paths. `reference` is a tag or a
/// digest.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Logical name this client was registered under
    fn name(&self) -> &str;

    async fn list_tags(&self, repository: &RepositoryRef) -> Result<Vec<String>>;

    /// `Ok(false)` means the image is confirmed absent
    async fn exists(&self, image: &ImageRef) -> Result<bool>;

    async fn pull_manifest(&self, repository: &RepositoryRef, reference: &str) -> Result<Manifest>;

    async fn push_manifest(
        &self,
        repository: &RepositoryRef,
        reference: &str,
        manifest: &Manifest,
    ) -> Result<()>;

    async fn blob_exists(&self, repository: &RepositoryRef, digest: &str) -> Result<bool>;

    /// Open the blob for reading; the content is not verified
    async fn pull_blob(&self, repository: &RepositoryRef, digest: &str) -> Result<BlobStream>;

    /// Upload `size` bytes read from `content` under `digest`
    async fn push_blob(
        &self,
        repository: &RepositoryRef,
        digest: &str,
        size: u64,
        content: BlobStream,
    ) -> Result<()>;

    /// Copy `source` from this registry to `destination` on `target`
    async fn copy(&self, source: &ImageRef, destination: &ImageRef, target: &dyn Registry) -> Result<()> {
        copy::copy_image(self, source, destination, target).await
    }
}
