//! Registry-to-registry image copy built on the [`Registry`] primitives
//!
//! Blobs go first, then child manifests of an index (by digest), then the
//! top-level manifest under the destination tag. A registry only accepts a
//! manifest whose blobs it already has, so this order makes the tag appear
//! last and atomically.
//!
//! Blob content is streamed from source to destination and hashed on the way.

use crate::error::Result;
use crate::image::{Descriptor, DigestUtils, ImageRef, Manifest, ManifestContent, RepositoryRef};
use crate::registry::Registry;
use futures::future::{BoxFuture, FutureExt};

pub async fn copy_image<S>(
    source_registry: &S,
    source: &ImageRef,
    destination: &ImageRef,
    target: &dyn Registry,
) -> Result<()>
where
    S: Registry + ?Sized,
{
    let manifest = source_registry
        .pull_manifest(&source.repository, &source.tag)
        .await?;

    copy_referenced(
        source_registry,
        &source.repository,
        target,
        &destination.repository,
        &manifest,
    )
    .await?;

    target
        .push_manifest(&destination.repository, &destination.tag, &manifest)
        .await?;

    tracing::debug!(
        source = %source,
        destination = %destination,
        digest = %manifest.digest(),
        "manifest pushed"
    );
    Ok(())
}

/// Copy everything `manifest` references, recursing into indexes
fn copy_referenced<'a, S>(
    source_registry: &'a S,
    from: &'a RepositoryRef,
    target: &'a dyn Registry,
    to: &'a RepositoryRef,
    manifest: &'a Manifest,
) -> BoxFuture<'a, Result<()>>
where
    S: Registry + ?Sized,
{
    async move {
        match manifest.content()? {
            ManifestContent::Image { config, layers } => {
                for descriptor in std::iter::once(&config).chain(layers.iter()) {
                    copy_blob(source_registry, from, target, to, descriptor).await?;
                }
            }
            ManifestContent::Index { manifests } => {
                for child in &manifests {
                    let child_manifest = source_registry.pull_manifest(from, &child.digest).await?;
                    DigestUtils::verify(&child.digest, &child_manifest.data)?;
                    copy_referenced(source_registry, from, target, to, &child_manifest).await?;
                    target.push_manifest(to, &child.digest, &child_manifest).await?;
                }
            }
        }
        Ok(())
    }
    .boxed()
}

async fn copy_blob<S>(
    source_registry: &S,
    from: &RepositoryRef,
    target: &dyn Registry,
    to: &RepositoryRef,
    descriptor: &Descriptor,
) -> Result<()>
where
    S: Registry + ?Sized,
{
    if target.blob_exists(to, &descriptor.digest).await? {
        tracing::trace!(digest = %descriptor.digest, repository = %to, "blob already present");
        return Ok(());
    }

    let content = source_registry.pull_blob(from, &descriptor.digest).await?;
    let (content, verification) = DigestUtils::verify_stream(&descriptor.digest, descriptor.size, content);
    let pushed = target
        .push_blob(to, &descriptor.digest, descriptor.size, content)
        .await;
    // the upload only reports its own failure when the content was bad
    verification.result()?;
    pushed
}
