//! Value types naming registries, repositories and tagged images
//!
//! All types here are plain owned values with structural equality and
//! hashing. They are rebuilt on every enumeration cycle and are cheap to clone.

use std::fmt;

const DOCKER_HUB_ALIASES: &[&str] = &["docker.io", "index.docker.io", "registry-1.docker.io"];
const DOCKER_HUB_API: &str = "registry-1.docker.io";

/// Username/password pair for a registry
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A registry's logical name plus the credential used to reach it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryRef {
    name: String,
    credential: Option<Credential>,
    insecure: bool,
}

impl RegistryRef {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let insecure = is_local_registry(&name);
        Self {
            name,
            credential: None,
            insecure,
        }
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    /// Override plain-HTTP detection for this registry
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn is_insecure(&self) -> bool {
        self.insecure
    }

    /// Base URL of the registry API, e.g. `https://registry-1.docker.io`
    pub fn endpoint(&self) -> String {
        if self.name.starts_with("http://") || self.name.starts_with("https://") {
            return self.name.trim_end_matches('/').to_string();
        }
        let host = if is_docker_hub(&self.name) {
            DOCKER_HUB_API
        } else {
            self.name.as_str()
        };
        let scheme = if self.insecure { "http" } else { "https" };
        format!("{}://{}", scheme, host)
    }
}

fn is_docker_hub(name: &str) -> bool {
    DOCKER_HUB_ALIASES.contains(&name)
}

fn is_local_registry(name: &str) -> bool {
    let host = match name.rsplit_once(':') {
        // keep bracketed IPv6 literals intact
        Some((host, port)) if !port.contains(']') => host,
        _ => name,
    };
    matches!(host, "localhost" | "127.0.0.1" | "[::1]") || host.ends_with(".local")
}

/// Registry name, namespace path and repository name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryRef {
    pub registry: String,
    pub namespace: Vec<String>,
    pub name: String,
}

impl RepositoryRef {
    pub fn new(registry: impl Into<String>, namespace: Vec<String>, name: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            namespace,
            name: name.into(),
        }
    }

    /// Repository path without the registry, e.g. `library/golang`
    pub fn path(&self) -> String {
        let mut segments: Vec<&str> = self.namespace.iter().map(String::as_str).collect();
        segments.push(&self.name);
        segments.join("/")
    }

    /// Path used on the wire; Docker Hub puts official images under `library/`
    pub fn api_path(&self) -> String {
        if is_docker_hub(&self.registry) && self.namespace.is_empty() {
            format!("library/{}", self.name)
        } else {
            self.path()
        }
    }

    /// Registry-qualified name, e.g. `docker.io/library/golang`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.registry, self.path())
    }

    pub fn tag(&self, tag: impl Into<String>) -> ImageRef {
        ImageRef {
            repository: self.clone(),
            tag: tag.into(),
        }
    }

    /// Same namespace and name under another registry
    pub fn with_registry(&self, registry: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// A tagged image: the unit of mirroring
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageRef {
    pub repository: RepositoryRef,
    pub tag: String,
}

impl ImageRef {
    pub fn registry(&self) -> &str {
        &self.repository.registry
    }

    /// Same repository path and tag under another registry
    pub fn with_registry(&self, registry: impl Into<String>) -> Self {
        Self {
            repository: self.repository.with_registry(registry),
            tag: self.tag.clone(),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_registry_keeps_path_and_tag() {
        let source = RepositoryRef::new("quay.io", vec!["coreos".into()], "etcd").tag("v3.5.0");
        let destination = source.with_registry("mirror.example.com");
        assert_eq!(destination.to_string(), "mirror.example.com/coreos/etcd:v3.5.0");
        assert_eq!(destination.tag, source.tag);
        assert_eq!(destination.repository.path(), source.repository.path());
    }

    #[test]
    fn docker_hub_normalisation() {
        let official = RepositoryRef::new("docker.io", vec![], "golang");
        assert_eq!(official.api_path(), "library/golang");
        assert_eq!(official.path(), "golang");

        let user = RepositoryRef::new("docker.io", vec!["bitnami".into()], "redis");
        assert_eq!(user.api_path(), "bitnami/redis");

        assert_eq!(RegistryRef::new("docker.io").endpoint(), "https://registry-1.docker.io");
        assert_eq!(RegistryRef::new("ghcr.io").endpoint(), "https://ghcr.io");
    }

    #[test]
    fn local_registries_default_to_http() {
        assert_eq!(RegistryRef::new("localhost:5000").endpoint(), "http://localhost:5000");
        assert_eq!(RegistryRef::new("127.0.0.1").endpoint(), "http://127.0.0.1");
        assert_eq!(RegistryRef::new("registry.local").endpoint(), "http://registry.local");
        assert_eq!(
            RegistryRef::new("harbor.example.com").with_insecure(true).endpoint(),
            "http://harbor.example.com"
        );
        assert_eq!(
            RegistryRef::new("http://127.0.0.1:8080/").endpoint(),
            "http://127.0.0.1:8080"
        );
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::new("robot", "s3cret");
        let rendered = format!("{:?}", credential);
        assert!(rendered.contains("robot"));
        assert!(!rendered.contains("s3cret"));
    }
}
