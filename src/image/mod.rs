//! Image naming and manifest handling
//!
//! [`reference`] holds the value types that identify registries, repositories
//! and tagged images. [`manifest`] and [`digest`] cover the parts of the image
//! format that a registry-to-registry copy has to understand.

pub mod digest;
pub mod manifest;
pub mod reference;

pub use digest::DigestUtils;
pub use manifest::{Descriptor, Manifest, ManifestContent, ManifestType};
pub use reference::{Credential, ImageRef, RegistryRef, RepositoryRef};
