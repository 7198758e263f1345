//! Registry operations module - HTTP calls grouped by resource
//!
//! The public entry point is [`crate::registry::RegistryClient`]; these
//! structs share its `reqwest::Client` and token manager.

pub mod blob_operations;
pub mod manifest_operations;
pub mod repository_operations;

pub use blob_operations::BlobOperations;
pub use manifest_operations::ManifestOperations;
pub use repository_operations::RepositoryOperations;
