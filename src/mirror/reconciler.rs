//! Worker side of the queue: make the destination match the source

use super::{SyncItem, SyncOutcome};
use crate::concurrency::RateLimitingQueue;
use crate::error::{MirrorError, Result};
use crate::registry::{Registry, RegistryDirectory};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct Reconciler {
    directory: Arc<RegistryDirectory>,
    queue: Arc<RateLimitingQueue<SyncItem>>,
}

impl Reconciler {
    pub fn new(directory: Arc<RegistryDirectory>, queue: Arc<RateLimitingQueue<SyncItem>>) -> Self {
        Self { directory, queue }
    }

    /// Copy `item` unless its destination tag already exists.
    ///
    /// An existing destination tag is never overwritten.
    pub async fn sync(&self, item: &SyncItem) -> Result<SyncOutcome> {
        let source = self.resolve(item.source.registry())?;
        let destination = self.resolve(item.destination.registry())?;

        if destination.exists(&item.destination).await? {
            tracing::debug!(destination = %item.destination, "already mirrored");
            return Ok(SyncOutcome::AlreadyPresent);
        }

        tracing::info!(source = %item.source, destination = %item.destination, "copy image");
        source
            .copy(&item.source, &item.destination, destination.as_ref())
            .await?;
        Ok(SyncOutcome::Copied)
    }

    /// Take one item off the queue and sync it.
    ///
    /// Returns `false` once the queue is shut down and empty.
    pub async fn process_next(&self, cancel: &CancellationToken) -> bool {
        let Some(item) = self.queue.get().await else {
            return false;
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MirrorError::Cancelled),
            result = self.sync(&item) => result,
        };

        match result {
            Ok(outcome) => {
                self.queue.forget(&item);
                if outcome == SyncOutcome::Copied {
                    tracing::info!(source = %item.source, destination = %item.destination, "image mirrored");
                }
            }
            Err(MirrorError::Cancelled) => {
                tracing::debug!(item = %item, "sync interrupted");
                self.queue.add(item.clone());
            }
            Err(e) => {
                let failures = self.queue.num_requeues(&item) + 1;
                if e.is_permanent() {
                    tracing::warn!(
                        source = %item.source,
                        destination = %item.destination,
                        failures,
                        error = %e,
                        "sync failed, retrying although this looks permanent"
                    );
                } else {
                    tracing::error!(
                        source = %item.source,
                        destination = %item.destination,
                        failures,
                        error = %e,
                        "sync failed, retrying"
                    );
                }
                self.queue.add_rate_limited(item.clone());
            }
        }

        self.queue.done(&item);
        true
    }

    pub async fn run_worker(&self, worker: usize, cancel: CancellationToken) {
        tracing::debug!(worker, "worker started");
        while self.process_next(&cancel).await {}
        tracing::debug!(worker, "worker stopped");
    }

    fn resolve(&self, name: &str) -> Result<Arc<dyn Registry>> {
        self.directory
            .lookup(name)
            .ok_or_else(|| MirrorError::Configuration(format!("registry '{}' is not registered", name)))
    }
}
