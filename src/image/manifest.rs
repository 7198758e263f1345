//! Manifest media types and the blob references a manifest carries
//!
//! Only the fields needed to copy an image are decoded: the config and layer
//! descriptors of an image manifest, and the child manifests of an index.

use crate::error::{MirrorError, Result};
use serde::Deserialize;

pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST_V2: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const OCI_IMAGE_MANIFEST_V1: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_IMAGE_INDEX_V1: &str = "application/vnd.oci.image.index.v1+json";

/// Accept header value covering every manifest format we can copy
pub const ACCEPTED_MANIFEST_TYPES: &str = "application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestType {
    DockerV2,
    DockerList,
    OciManifest,
    OciIndex,
}

impl ManifestType {
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        // registries may append parameters such as "; charset=utf-8"
        let media_type = media_type.split(';').next().unwrap_or("").trim();
        match media_type {
            DOCKER_MANIFEST_V2 => Some(ManifestType::DockerV2),
            DOCKER_MANIFEST_LIST_V2 => Some(ManifestType::DockerList),
            OCI_IMAGE_MANIFEST_V1 => Some(ManifestType::OciManifest),
            OCI_IMAGE_INDEX_V1 => Some(ManifestType::OciIndex),
            _ => None,
        }
    }

    pub fn to_content_type(self) -> &'static str {
        match self {
            ManifestType::DockerV2 => DOCKER_MANIFEST_V2,
            ManifestType::DockerList => DOCKER_MANIFEST_LIST_V2,
            ManifestType::OciManifest => OCI_IMAGE_MANIFEST_V1,
            ManifestType::OciIndex => OCI_IMAGE_INDEX_V1,
        }
    }

    pub fn is_index(self) -> bool {
        matches!(self, ManifestType::DockerList | ManifestType::OciIndex)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub media_type: String,
    pub digest: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    schema_version: Option<u32>,
    media_type: Option<String>,
    config: Option<Descriptor>,
    #[serde(default)]
    layers: Vec<Descriptor>,
    manifests: Option<Vec<Descriptor>>,
}

/// A manifest as fetched from a registry, kept byte-for-byte so that pushing
/// it elsewhere preserves its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub media_type: String,
    pub data: Vec<u8>,
}

/// What a manifest points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestContent {
    Image {
        config: Descriptor,
        layers: Vec<Descriptor>,
    },
    Index {
        manifests: Vec<Descriptor>,
    },
}

impl Manifest {
    pub fn new(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            data,
        }
    }

    /// Manifest type, preferring the registry's Content-Type and falling back
    /// to the `mediaType` field of the document.
    pub fn manifest_type(&self) -> Result<ManifestType> {
        if let Some(kind) = ManifestType::from_media_type(&self.media_type) {
            return Ok(kind);
        }
        let raw: RawManifest = serde_json::from_slice(&self.data)?;
        if let Some(kind) = raw.media_type.as_deref().and_then(ManifestType::from_media_type) {
            return Ok(kind);
        }
        // OCI documents may omit mediaType entirely
        match (raw.manifests.is_some(), raw.config.is_some()) {
            (true, _) => Ok(ManifestType::OciIndex),
            (false, true) => Ok(ManifestType::OciManifest),
            _ => Err(MirrorError::Parse(format!(
                "Unsupported manifest type '{}'",
                self.media_type
            ))),
        }
    }

    pub fn content_type(&self) -> Result<&'static str> {
        Ok(self.manifest_type()?.to_content_type())
    }

    pub fn digest(&self) -> String {
        super::digest::DigestUtils::compute_docker_digest(&self.data)
    }

    pub fn content(&self) -> Result<ManifestContent> {
        let kind = self.manifest_type()?;
        let raw: RawManifest = serde_json::from_slice(&self.data)?;

        if let Some(version) = raw.schema_version {
            if version != 2 {
                return Err(MirrorError::Parse(format!(
                    "Unsupported manifest schema version {}",
                    version
                )));
            }
        }

        if kind.is_index() {
            return Ok(ManifestContent::Index {
                manifests: raw.manifests.unwrap_or_default(),
            });
        }

        let config = raw
            .config
            .ok_or_else(|| MirrorError::Parse("Image manifest has no config descriptor".to_string()))?;
        Ok(ManifestContent::Image {
            config,
            layers: raw.layers,
        })
    }
}
