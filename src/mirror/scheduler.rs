//! Drives enumeration on a timer and runs the worker pool

use super::{Enumerator, Reconciler, SyncItem};
use crate::concurrency::{ItemExponentialFailureRateLimiter, RateLimitingQueue};
use crate::config::{Configuration, duration};
use crate::error::{MirrorError, Result};
use crate::registry::RegistryDirectory;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub struct Mirror {
    config: Configuration,
    directory: Arc<RegistryDirectory>,
    queue: Arc<RateLimitingQueue<SyncItem>>,
}

impl Mirror {
    /// Engine talking HTTP to every configured registry
    pub fn new(config: Configuration) -> Result<Self> {
        let directory = Arc::new(RegistryDirectory::new(config.worker.request_timeout));
        Self::with_directory(config, directory)
    }

    /// Engine resolving registries through `directory`
    pub fn with_directory(config: Configuration, directory: Arc<RegistryDirectory>) -> Result<Self> {
        config.validate()?;
        let retry = &config.worker.retry;
        let queue = Arc::new(RateLimitingQueue::with_rate_limiter(
            ItemExponentialFailureRateLimiter::new(retry.base_delay, retry.max_delay),
        ));
        Ok(Self {
            config,
            directory,
            queue,
        })
    }

    pub fn directory(&self) -> &Arc<RegistryDirectory> {
        &self.directory
    }

    pub fn queue(&self) -> &Arc<RateLimitingQueue<SyncItem>> {
        &self.queue
    }

    /// Run until `cancel` fires.
    ///
    /// Workers start once the first enumeration has completed, even when
    /// some sources failed in it. A first cycle that cannot run at all ends
    /// the engine with its error. On cancellation the queue is drained and
    /// every worker is awaited.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let enumerator = Enumerator::new(self.directory.clone(), self.queue.clone());
        let (first_tx, first_rx) = oneshot::channel();
        let enumeration = tokio::spawn(enumerate_periodically(
            enumerator,
            self.config.clone(),
            cancel.clone(),
            first_tx,
        ));

        let ready = tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(false),
            first = first_rx => match first {
                Ok(outcome) => outcome.map(|()| true),
                Err(_) => Err(MirrorError::Enumeration(vec![
                    "enumeration task stopped before its first cycle".to_string(),
                ])),
            },
        };

        let mut workers = JoinSet::new();
        if let Ok(true) = ready {
            let parallel = self.config.worker.parallel as usize;
            tracing::info!(
                workers = parallel,
                registries = ?self.directory.names(),
                "first enumeration complete, starting workers"
            );
            let reconciler = Reconciler::new(self.directory.clone(), self.queue.clone());
            for worker in 0..parallel {
                let reconciler = reconciler.clone();
                let cancel = cancel.clone();
                workers.spawn(async move { reconciler.run_worker(worker, cancel).await });
            }
            cancel.cancelled().await;
        }

        tracing::info!("shutting down");
        self.queue.shut_down_with_drain().await;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "worker task failed");
            }
        }
        if let Err(e) = enumeration.await {
            tracing::error!(error = %e, "enumeration task failed");
        }
        tracing::info!("mirror stopped");
        ready.map(|_| ())
    }
}

async fn enumerate_periodically(
    enumerator: Enumerator,
    config: Configuration,
    cancel: CancellationToken,
    first: oneshot::Sender<Result<()>>,
) {
    let mut first = Some(first);
    let interval = config.worker.interval;

    loop {
        let started = Instant::now();
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = enumerator.enumerate(&config) => result,
        };

        let outcome = match result {
            Ok(report) => {
                tracing::info!(
                    repositories = report.repositories,
                    images = report.images,
                    items = report.items,
                    failed_repositories = report.failures.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "enumeration finished"
                );
                Ok(())
            }
            // healthy sources were still queued
            Err(e @ MirrorError::Enumeration(_)) => {
                tracing::error!(
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "enumeration finished with failed sources"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "enumeration failed");
                Err(e)
            }
        };

        if let Some(first) = first.take() {
            let fatal = outcome.is_err();
            let _ = first.send(outcome);
            if fatal {
                return;
            }
        }

        tracing::debug!(next_in = %duration::format(interval), "waiting for next enumeration");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
