//! Turns the configuration into queued sync items
//!
//! A cycle registers every `auth` registry, then lists the tags of every
//! source repository. Sources are listed concurrently and independently: one
//! failing source never hides the items of another.

use super::SyncItem;
use crate::concurrency::RateLimitingQueue;
use crate::config::{Configuration, Source};
use crate::error::{MirrorError, Result};
use crate::image::RepositoryRef;
use crate::registry::RegistryDirectory;
use futures::future::join_all;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnumerationReport {
    /// Repositories whose tags were requested
    pub repositories: usize,
    /// Tags found across all listed repositories
    pub images: usize,
    /// Items offered to the queue, duplicates included
    pub items: usize,
    pub failures: Vec<ListingFailure>,
}

/// A repository skipped this cycle because its tags could not be listed
#[derive(Debug, Clone, PartialEq)]
pub struct ListingFailure {
    pub repository: RepositoryRef,
    pub error: MirrorError,
}

impl EnumerationReport {
    fn merge(&mut self, other: EnumerationReport) {
        self.repositories += other.repositories;
        self.images += other.images;
        self.items += other.items;
        self.failures.extend(other.failures);
    }
}

#[derive(Clone)]
pub struct Enumerator {
    directory: Arc<RegistryDirectory>,
    queue: Arc<RateLimitingQueue<SyncItem>>,
}

impl Enumerator {
    pub fn new(directory: Arc<RegistryDirectory>, queue: Arc<RateLimitingQueue<SyncItem>>) -> Self {
        Self { directory, queue }
    }

    /// Run one enumeration cycle.
    ///
    /// Fails when a registry cannot be registered or a source names a
    /// registry the directory does not know. Items of the sources that did
    /// succeed are queued either way.
    pub async fn enumerate(&self, config: &Configuration) -> Result<EnumerationReport> {
        for reference in config.registry_refs()? {
            self.directory.register(&reference)?;
        }

        let results = join_all(
            config
                .sources
                .iter()
                .map(|source| self.enumerate_source(source, &config.destinations)),
        )
        .await;

        let mut report = EnumerationReport::default();
        let mut errors = Vec::new();
        for (source, result) in config.sources.iter().zip(results) {
            match result {
                Ok(source_report) => report.merge(source_report),
                Err(e) => {
                    tracing::error!(registry = %source.registry, error = %e, "source skipped");
                    errors.push(format!("{}: {}", source.registry, e));
                }
            }
        }

        if !errors.is_empty() {
            return Err(MirrorError::Enumeration(errors));
        }
        Ok(report)
    }

    async fn enumerate_source(&self, source: &Source, destinations: &[String]) -> Result<EnumerationReport> {
        let registry = self.directory.lookup(&source.registry).ok_or_else(|| {
            MirrorError::Configuration(format!(
                "source registry '{}' is not registered",
                source.registry
            ))
        })?;

        let mut report = EnumerationReport::default();
        for repository in source.repositories() {
            report.repositories += 1;
            let tags = match registry.list_tags(&repository).await {
                Ok(tags) => tags,
                Err(e) => {
                    tracing::warn!(repository = %repository, error = %e, "listing tags failed, skipping repository this cycle");
                    report.failures.push(ListingFailure {
                        repository,
                        error: e,
                    });
                    continue;
                }
            };

            tracing::debug!(repository = %repository, tags = tags.len(), "tags listed");
            for tag in tags {
                report.images += 1;
                let image = repository.tag(tag);
                for destination in destinations {
                    self.queue
                        .add(SyncItem::new(image.clone(), image.with_registry(destination.as_str())));
                    report.items += 1;
                }
            }
        }
        Ok(report)
    }
}
