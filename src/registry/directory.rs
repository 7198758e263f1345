//! Name → client table shared by the enumerator and the reconciler workers
//!
//! The directory only grows. The first registration of a name wins; later
//! registrations of the same name are ignored even when their credentials
//! differ.

use crate::error::Result;
use crate::image::RegistryRef;
use crate::registry::{Registry, RegistryClient};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Builds a client for a registry reference
pub type RegistryFactory = dyn Fn(&RegistryRef) -> Result<Arc<dyn Registry>> + Send + Sync;

pub struct RegistryDirectory {
    registries: Mutex<HashMap<String, Arc<dyn Registry>>>,
    factory: Box<RegistryFactory>,
}

impl RegistryDirectory {
    /// Directory building HTTP clients with the given request timeout
    pub fn new(timeout: Duration) -> Self {
        Self::with_factory(move |reference: &RegistryRef| {
            let client = RegistryClient::builder(reference.clone())
                .with_timeout(timeout)
                .build()?;
            Ok(Arc::new(client) as Arc<dyn Registry>)
        })
    }

    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(&RegistryRef) -> Result<Arc<dyn Registry>> + Send + Sync + 'static,
    {
        Self {
            registries: Mutex::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// Register a registry unless its name is already known.
    ///
    /// Returns `Ok(true)` when a new client was created.
    pub fn register(&self, reference: &RegistryRef) -> Result<bool> {
        let mut registries = self.registries.lock().unwrap_or_else(PoisonError::into_inner);
        if registries.contains_key(reference.name()) {
            return Ok(false);
        }
        let client = (self.factory)(reference)?;
        registries.insert(reference.name().to_string(), client);
        tracing::info!(registry = %reference.name(), authenticated = reference.credential().is_some(), "registry registered");
        Ok(true)
    }

    /// Register a pre-built client under its own name, first one wins
    pub fn insert(&self, registry: Arc<dyn Registry>) -> bool {
        let mut registries = self.registries.lock().unwrap_or_else(PoisonError::into_inner);
        if registries.contains_key(registry.name()) {
            return false;
        }
        registries.insert(registry.name().to_string(), registry);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Registry>> {
        self.registries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.registries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MirrorError;
    use crate::image::{Credential, ImageRef, Manifest, RepositoryRef};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Stub {
        name: String,
    }

    #[async_trait]
    impl Registry for Stub {
        fn name(&self) -> &str {
            &self.name
        }
        async fn list_tags(&self, _: &RepositoryRef) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn exists(&self, _: &ImageRef) -> Result<bool> {
            Ok(false)
        }
        async fn pull_manifest(&self, _: &RepositoryRef, r: &str) -> Result<Manifest> {
            Err(MirrorError::NotFound(r.to_string()))
        }
        async fn push_manifest(&self, _: &RepositoryRef, _: &str, _: &Manifest) -> Result<()> {
            Ok(())
        }
        async fn blob_exists(&self, _: &RepositoryRef, _: &str) -> Result<bool> {
            Ok(false)
        }
        async fn pull_blob(&self, _: &RepositoryRef, d: &str) -> Result<crate::registry::BlobStream> {
            Err(MirrorError::NotFound(d.to_string()))
        }
        async fn push_blob(&self, _: &RepositoryRef, _: &str, _: u64, _: crate::registry::BlobStream) -> Result<()> {
            Ok(())
        }
    }

    fn stub_directory(built: Arc<AtomicUsize>) -> RegistryDirectory {
        RegistryDirectory::with_factory(move |reference: &RegistryRef| {
            built.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Stub {
                name: reference.name().to_string(),
            }) as Arc<dyn Registry>)
        })
    }

    #[test]
    fn first_registration_wins() {
        let built = Arc::new(AtomicUsize::new(0));
        let directory = stub_directory(built.clone());

        let first = RegistryRef::new("ghcr.io").with_credential(Some(Credential::new("a", "1")));
        let second = RegistryRef::new("ghcr.io").with_credential(Some(Credential::new("b", "2")));

        assert!(directory.register(&first).unwrap());
        assert!(!directory.register(&second).unwrap());
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(directory.len(), 1);
        assert!(directory.lookup("ghcr.io").is_some());
        assert!(directory.lookup("quay.io").is_none());
    }

    #[test]
    fn concurrent_registration_builds_one_client() {
        let built = Arc::new(AtomicUsize::new(0));
        let directory = Arc::new(stub_directory(built.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let directory = directory.clone();
                std::thread::spawn(move || directory.register(&RegistryRef::new("quay.io")).unwrap())
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|created| *created)
            .count();

        assert_eq!(created, 1);
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn insert_respects_existing_names() {
        let directory = stub_directory(Arc::new(AtomicUsize::new(0)));
        directory.register(&RegistryRef::new("docker.io")).unwrap();

        let replacement = Arc::new(Stub {
            name: "docker.io".to_string(),
        });
        assert!(!directory.insert(replacement));
        assert!(directory.insert(Arc::new(Stub {
            name: "mirror.local".to_string(),
        })));
        assert_eq!(directory.names(), vec!["docker.io".to_string(), "mirror.local".to_string()]);
    }

    #[test]
    fn http_factory_builds_clients() {
        let directory = RegistryDirectory::new(Duration::from_secs(5));
        assert!(directory.is_empty());
        assert!(directory.register(&RegistryRef::new("localhost:5000")).unwrap());
        assert_eq!(directory.lookup("localhost:5000").unwrap().name(), "localhost:5000");
    }
}
