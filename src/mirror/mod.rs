//! The mirroring engine
//!
//! [`Mirror`] owns the registry directory and the work queue. On every tick
//! the [`Enumerator`] lists the configured source repositories and offers one
//! [`SyncItem`] per (tag, destination) pair; [`Reconciler`] workers take items
//! off the queue and copy whatever the destination is missing.

pub mod enumerator;
pub mod reconciler;
pub mod scheduler;

use crate::image::ImageRef;
use std::fmt;

pub use enumerator::{EnumerationReport, Enumerator, ListingFailure};
pub use reconciler::Reconciler;
pub use scheduler::Mirror;

/// One image to mirror to one destination; also the queue's dedup key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyncItem {
    pub source: ImageRef,
    pub destination: ImageRef,
}

impl SyncItem {
    pub fn new(source: ImageRef, destination: ImageRef) -> Self {
        Self {
            source,
            destination,
        }
    }
}

impl fmt::Display for SyncItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The destination already had the tag; nothing was written
    AlreadyPresent,
    Copied,
}
