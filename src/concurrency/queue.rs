//! Deduplicating work queue with delayed and rate-limited re-adds
//!
//! An item is in at most one of three places: pending in the queue, in
//! flight with a worker, or both "in flight and dirty" when it was re-added
//! while a worker held it. A dirty in-flight item is queued again once the
//! worker calls [`RateLimitingQueue::done`], so one item is never processed by
//! two workers at the same time.

use super::rate_limiter::{ItemExponentialFailureRateLimiter, RateLimiter};
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Inner<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    /// Ready time of the delayed add currently armed for each item
    waiting: HashMap<T, Instant>,
    shutting_down: bool,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    available: Notify,
    drained: Notify,
    shutdown: CancellationToken,
}

impl<T> Shared<T>
where
    T: Clone + Eq + Hash,
{
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, item: T) {
        {
            let mut inner = self.lock();
            if inner.shutting_down || inner.dirty.contains(&item) {
                return;
            }
            inner.dirty.insert(item.clone());
            if inner.processing.contains(&item) {
                return;
            }
            inner.queue.push_back(item);
        }
        self.available.notify_one();
    }

    /// Fire a delayed add if it is still the one armed for `item`
    fn fire(&self, item: T, ready: Instant) {
        {
            let mut inner = self.lock();
            if inner.waiting.get(&item) != Some(&ready) {
                return;
            }
            inner.waiting.remove(&item);
        }
        self.add(item);
    }
}

pub struct RateLimitingQueue<T> {
    shared: Arc<Shared<T>>,
    rate_limiter: Box<dyn RateLimiter<T>>,
}

impl<T> RateLimitingQueue<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// Queue retrying with [`ItemExponentialFailureRateLimiter::default`]
    pub fn new() -> Self {
        Self::with_rate_limiter(ItemExponentialFailureRateLimiter::default())
    }

    pub fn with_rate_limiter<R>(rate_limiter: R) -> Self
    where
        R: RateLimiter<T> + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    waiting: HashMap::new(),
                    shutting_down: false,
                }),
                available: Notify::new(),
                drained: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
            rate_limiter: Box::new(rate_limiter),
        }
    }

    /// Enqueue `item` unless it is already pending. Ignored after shutdown.
    pub fn add(&self, item: T) {
        self.shared.add(item);
    }

    /// Wait for the next item and mark it in flight.
    ///
    /// Returns `None` once the queue is shut down and nothing is pending.
    pub async fn get(&self) -> Option<T> {
        loop {
            let mut notified = pin!(self.shared.available.notified());
            notified.as_mut().enable();
            {
                let mut inner = self.shared.lock();
                if let Some(item) = inner.queue.pop_front() {
                    inner.dirty.remove(&item);
                    inner.processing.insert(item.clone());
                    if !inner.queue.is_empty() {
                        // pass the wakeup on; another worker may be parked
                        self.shared.available.notify_one();
                    }
                    return Some(item);
                }
                if inner.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark `item` finished; re-queues it if it was added while in flight
    pub fn done(&self, item: &T) {
        let requeued = {
            let mut inner = self.shared.lock();
            inner.processing.remove(item);
            if inner.processing.is_empty() {
                self.shared.drained.notify_waiters();
            }
            if inner.dirty.contains(item) {
                inner.queue.push_back(item.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.shared.available.notify_one();
        }
    }

    /// Add `item` once `delay` has elapsed.
    ///
    /// Of several delayed adds for the same item only the earliest fires.
    /// Delayed adds still waiting at shutdown are dropped.
    pub fn add_after(&self, item: T, delay: Duration) {
        if delay.is_zero() {
            self.add(item);
            return;
        }

        let ready = Instant::now() + delay;
        {
            let mut inner = self.shared.lock();
            if inner.shutting_down {
                return;
            }
            if inner.waiting.get(&item).is_some_and(|armed| *armed <= ready) {
                return;
            }
            inner.waiting.insert(item.clone(), ready);
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tokio::select! {
                _ = shared.shutdown.cancelled() => {}
                _ = tokio::time::sleep_until(ready) => shared.fire(item, ready),
            }
        });
    }

    /// Re-add after the backoff the rate limiter assigns to `item`
    pub fn add_rate_limited(&self, item: T) {
        let delay = self.rate_limiter.when(&item);
        self.add_after(item, delay);
    }

    /// Reset the retry backoff of `item`
    pub fn forget(&self, item: &T) {
        self.rate_limiter.forget(item);
    }

    pub fn num_requeues(&self, item: &T) -> usize {
        self.rate_limiter.num_requeues(item)
    }

    /// Items pending, not counting in-flight or delayed ones
    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.lock().shutting_down
    }

    /// Stop accepting adds and wake every waiting [`get`](Self::get)
    pub fn shut_down(&self) {
        {
            let mut inner = self.shared.lock();
            if inner.shutting_down {
                return;
            }
            inner.shutting_down = true;
            inner.waiting.clear();
        }
        self.shared.shutdown.cancel();
        self.shared.available.notify_waiters();
    }

    /// Shut down, then wait until every in-flight item has been marked done
    pub async fn shut_down_with_drain(&self) {
        self.shut_down();
        loop {
            let mut drained = pin!(self.shared.drained.notified());
            drained.as_mut().enable();
            if self.shared.lock().processing.is_empty() {
                return;
            }
            drained.await;
        }
    }
}

impl<T> Default for RateLimitingQueue<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
