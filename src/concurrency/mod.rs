//! Concurrency primitives shared by the enumerator and the worker pool
//!
//! [`RateLimitingQueue`] is the hand-off point between the producer (one
//! enumeration task) and the consumers (the reconciler workers). It
//! deduplicates pending work, never hands the same item to two workers at
//! once, and delays retries according to a [`RateLimiter`].

pub mod queue;
pub mod rate_limiter;

pub use queue::RateLimitingQueue;
pub use rate_limiter::{
    DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, ItemExponentialFailureRateLimiter, RateLimiter,
};
