//! In-memory registry used to drive the engine without a network
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use oci_image_mirror::config::{Configuration, RegistryConfiguration, Source};
use oci_image_mirror::error::{MirrorError, Result};
use oci_image_mirror::image::manifest::OCI_IMAGE_MANIFEST_V1;
use oci_image_mirror::image::{DigestUtils, ImageRef, Manifest, RegistryRef, RepositoryRef};
use oci_image_mirror::registry::{BlobStream, Registry, RegistryDirectory};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct State {
    /// repository path -> tag -> manifest digest
    tags: HashMap<String, BTreeMap<String, String>>,
    manifests: HashMap<String, Manifest>,
    blobs: HashMap<String, Vec<u8>>,
    broken_listings: HashSet<String>,
    offline: bool,
    failing_manifest_pushes: usize,
    manifest_pushes: usize,
    blob_pushes: usize,
    exists_calls: usize,
}

pub struct MemoryRegistry {
    name: String,
    state: Mutex<State>,
}

impl MemoryRegistry {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            state: Mutex::new(State::default()),
        })
    }

    /// Store a single-layer image under `repository:tag`
    pub fn add_image(&self, repository: &str, tag: &str) {
        let config = format!(r#"{{"architecture":"amd64","os":"linux","tag":"{}"}}"#, tag).into_bytes();
        let layer = format!("layer of {}:{}", repository, tag).into_bytes();
        let config_digest = DigestUtils::compute_docker_digest(&config);
        let layer_digest = DigestUtils::compute_docker_digest(&layer);

        let document = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": OCI_IMAGE_MANIFEST_V1,
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": config_digest,
                "size": config.len(),
            },
            "layers": [{
                "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
                "digest": layer_digest,
                "size": layer.len(),
            }],
        });
        let manifest = Manifest::new(OCI_IMAGE_MANIFEST_V1, serde_json::to_vec(&document).unwrap());
        let digest = manifest.digest();

        let mut state = self.state.lock().unwrap();
        state.blobs.insert(config_digest, config);
        state.blobs.insert(layer_digest, layer);
        state.manifests.insert(digest.clone(), manifest);
        state
            .tags
            .entry(repository.to_string())
            .or_default()
            .insert(tag.to_string(), digest);
    }

    /// Make `list_tags` fail for `repository`
    pub fn break_listing(&self, repository: &str) {
        self.state.lock().unwrap().broken_listings.insert(repository.to_string());
    }

    /// Make every `list_tags` fail as if the registry could not be reached
    pub fn go_offline(&self) {
        self.state.lock().unwrap().offline = true;
    }

    /// Corrupt every stored blob while keeping its length
    pub fn tamper_blobs(&self) {
        for data in self.state.lock().unwrap().blobs.values_mut() {
            for byte in data.iter_mut() {
                *byte ^= 0xff;
            }
        }
    }

    /// Fail the next `count` manifest pushes
    pub fn fail_manifest_pushes(&self, count: usize) {
        self.state.lock().unwrap().failing_manifest_pushes = count;
    }

    pub fn tags(&self, repository: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .tags
            .get(repository)
            .map(|tags| tags.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn manifest_digest(&self, repository: &str, tag: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .tags
            .get(repository)
            .and_then(|tags| tags.get(tag))
            .cloned()
    }

    pub fn manifest_pushes(&self) -> usize {
        self.state.lock().unwrap().manifest_pushes
    }

    pub fn blob_pushes(&self) -> usize {
        self.state.lock().unwrap().blob_pushes
    }

    pub fn exists_calls(&self) -> usize {
        self.state.lock().unwrap().exists_calls
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tags(&self, repository: &RepositoryRef) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let path = repository.path();
        if state.offline {
            return Err(MirrorError::Network(format!("{} is unreachable", self.name)));
        }
        if state.broken_listings.contains(&path) {
            return Err(MirrorError::Registry(format!("listing {} is broken", path)));
        }
        state
            .tags
            .get(&path)
            .map(|tags| tags.keys().cloned().collect())
            .ok_or_else(|| MirrorError::NotFound(format!("repository {}", path)))
    }

    async fn exists(&self, image: &ImageRef) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.exists_calls += 1;
        Ok(state
            .tags
            .get(&image.repository.path())
            .is_some_and(|tags| tags.contains_key(&image.tag)))
    }

    async fn pull_manifest(&self, repository: &RepositoryRef, reference: &str) -> Result<Manifest> {
        let state = self.state.lock().unwrap();
        let digest = if reference.starts_with("sha256:") {
            Some(reference.to_string())
        } else {
            state
                .tags
                .get(&repository.path())
                .and_then(|tags| tags.get(reference))
                .cloned()
        };
        digest
            .and_then(|digest| state.manifests.get(&digest).cloned())
            .ok_or_else(|| MirrorError::NotFound(format!("manifest {}:{}", repository, reference)))
    }

    async fn push_manifest(&self, repository: &RepositoryRef, reference: &str, manifest: &Manifest) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing_manifest_pushes > 0 {
            state.failing_manifest_pushes -= 1;
            return Err(MirrorError::Registry("injected push failure".to_string()));
        }
        state.manifest_pushes += 1;
        let digest = manifest.digest();
        state.manifests.insert(digest.clone(), manifest.clone());
        if !reference.starts_with("sha256:") {
            state
                .tags
                .entry(repository.path())
                .or_default()
                .insert(reference.to_string(), digest);
        }
        Ok(())
    }

    async fn blob_exists(&self, _repository: &RepositoryRef, digest: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().blobs.contains_key(digest))
    }

    async fn pull_blob(&self, _repository: &RepositoryRef, digest: &str) -> Result<BlobStream> {
        let data = self
            .state
            .lock()
            .unwrap()
            .blobs
            .get(digest)
            .cloned()
            .ok_or_else(|| MirrorError::NotFound(format!("blob {}", digest)))?;
        let chunks: Vec<Result<Bytes>> = data.chunks(4).map(|c| Ok(Bytes::copy_from_slice(c))).collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn push_blob(&self, _repository: &RepositoryRef, digest: &str, _size: u64, content: BlobStream) -> Result<()> {
        let data = content
            .try_fold(Vec::new(), |mut data, chunk| async move {
                data.extend_from_slice(&chunk);
                Ok(data)
            })
            .await?;
        let mut state = self.state.lock().unwrap();
        state.blob_pushes += 1;
        state.blobs.insert(digest.to_string(), data);
        Ok(())
    }
}

/// Directory whose factory hands out the given in-memory registries by name
pub fn directory(registries: &[Arc<MemoryRegistry>]) -> Arc<RegistryDirectory> {
    let known: HashMap<String, Arc<MemoryRegistry>> = registries
        .iter()
        .map(|registry| (registry.name.clone(), registry.clone()))
        .collect();
    Arc::new(RegistryDirectory::with_factory(move |reference: &RegistryRef| {
        known
            .get(reference.name())
            .cloned()
            .map(|registry| registry as Arc<dyn Registry>)
            .ok_or_else(|| MirrorError::Configuration(format!("no test registry named {}", reference.name())))
    }))
}

/// Configuration registering `registries`, mirroring `sources` into `destinations`
pub fn configuration(registries: &[&str], sources: Vec<Source>, destinations: &[&str]) -> Configuration {
    let mut config = Configuration::default();
    config.auth.clear();
    for name in registries {
        config
            .auth
            .insert(name.to_string(), RegistryConfiguration::anonymous(name));
    }
    config.sources = sources;
    config.destinations = destinations.iter().map(|d| d.to_string()).collect();
    config.worker.interval = Duration::from_secs(60);
    config.worker.retry.base_delay = Duration::from_millis(1);
    config.worker.retry.max_delay = Duration::from_millis(50);
    config
}

pub fn source(registry: &str, namespace: &[&str], names: &[&str]) -> Source {
    Source {
        registry: registry.to_string(),
        namespace: namespace.iter().map(|s| s.to_string()).collect(),
        names: names.iter().map(|s| s.to_string()).collect(),
    }
}
