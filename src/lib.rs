//! OCI Image Mirror Library
//!
//! Keeps tags of configured source repositories mirrored into one or more
//! destination registries. The library root wires together the modules the
//! `oci-image-mirror` binary is built from.

pub mod cli;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod image;
pub mod logging;
pub mod mirror;
pub mod registry;

pub use config::Configuration;
pub use error::{MirrorError, Result};
pub use mirror::{Mirror, SyncItem, SyncOutcome};
