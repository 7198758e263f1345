//! Configuration file model and loading
//!
//! The file is YAML, read over [`Configuration::default`]: anything it leaves
//! out keeps its default value. Durations are written the way Go prints them
//! (`1m`, `1h30m`, `250ms`) or as a plain number of seconds.

use crate::concurrency::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
use crate::error::{MirrorError, Result};
use crate::image::{Credential, RegistryRef, RepositoryRef};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_REGISTRY: &str = "docker.io";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Registries to register each cycle, keyed by registry name
    pub auth: BTreeMap<String, RegistryConfiguration>,
    pub worker: WorkerConfiguration,
    pub sources: Vec<Source>,
    /// Registry names every source image is mirrored to
    pub destinations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfiguration {
    /// Informational; the map key is the name the registry is registered under
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic: Option<Basic>,
    /// Force plain HTTP on or off; unset means "plain HTTP for local names"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,
}

/// Basic credentials, either as `user`/`pass` or as a base64 `user:pass`
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Basic {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pass: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

impl std::fmt::Debug for Basic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Basic")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .field("auth", &self.auth.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfiguration {
    /// Number of concurrent reconciler workers
    pub parallel: u32,
    /// Pause between the end of one enumeration and the start of the next
    #[serde(with = "duration")]
    pub interval: Duration,
    pub retry: RetryConfiguration,
    #[serde(with = "duration")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfiguration {
    #[serde(with = "duration")]
    pub base_delay: Duration,
    #[serde(with = "duration")]
    pub max_delay: Duration,
}

/// A group of repositories on one registry sharing a namespace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Source {
    pub registry: String,
    pub namespace: Vec<String>,
    pub names: Vec<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        let mut auth = BTreeMap::new();
        auth.insert(DEFAULT_REGISTRY.to_string(), RegistryConfiguration::anonymous(DEFAULT_REGISTRY));
        Self {
            auth,
            worker: WorkerConfiguration::default(),
            sources: Vec::new(),
            destinations: Vec::new(),
        }
    }
}

impl Default for WorkerConfiguration {
    fn default() -> Self {
        Self {
            parallel: 1,
            interval: DEFAULT_INTERVAL,
            retry: RetryConfiguration::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl Default for RetryConfiguration {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl Configuration {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MirrorError::Configuration(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: Self = serde_yaml::from_str(content)?;
        // the default anonymous docker.io entry survives a file that adds others
        config
            .auth
            .entry(DEFAULT_REGISTRY.to_string())
            .or_insert_with(|| RegistryConfiguration::anonymous(DEFAULT_REGISTRY));
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.worker.parallel == 0 {
            return Err(MirrorError::Configuration(
                "worker.parallel must be greater than 0".to_string(),
            ));
        }
        if self.worker.interval.is_zero() {
            return Err(MirrorError::Configuration(
                "worker.interval must be greater than 0".to_string(),
            ));
        }
        if self.worker.request_timeout.is_zero() {
            return Err(MirrorError::Configuration(
                "worker.request_timeout must be greater than 0".to_string(),
            ));
        }
        let retry = &self.worker.retry;
        if retry.base_delay.is_zero() || retry.base_delay > retry.max_delay {
            return Err(MirrorError::Configuration(format!(
                "worker.retry needs 0 < base_delay <= max_delay (got {} and {})",
                duration::format(retry.base_delay),
                duration::format(retry.max_delay)
            )));
        }

        self.registry_refs()?;

        for (index, source) in self.sources.iter().enumerate() {
            if source.registry.trim().is_empty() {
                return Err(MirrorError::Configuration(format!(
                    "sources[{}] has no registry",
                    index
                )));
            }
            if source.names.is_empty() {
                return Err(MirrorError::Configuration(format!(
                    "sources[{}] ({}) lists no image names",
                    index, source.registry
                )));
            }
            if source
                .names
                .iter()
                .chain(source.namespace.iter())
                .any(|segment| segment.trim().is_empty() || segment.contains('/'))
            {
                return Err(MirrorError::Configuration(format!(
                    "sources[{}] ({}) has an empty or '/'-containing namespace or name",
                    index, source.registry
                )));
            }
        }

        if let Some(index) = self.destinations.iter().position(|d| d.trim().is_empty()) {
            return Err(MirrorError::Configuration(format!(
                "destinations[{}] is empty",
                index
            )));
        }

        Ok(())
    }

    /// Problems that do not stop the engine but will fail every cycle or item
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for source in &self.sources {
            if !self.auth.contains_key(&source.registry) {
                warnings.push(format!(
                    "source registry '{}' has no auth entry; enumeration will fail until it is added",
                    source.registry
                ));
            }
        }
        for destination in &self.destinations {
            if !self.auth.contains_key(destination) {
                warnings.push(format!(
                    "destination registry '{}' has no auth entry; its items will keep failing",
                    destination
                ));
            }
        }
        if !self.sources.is_empty() && self.destinations.is_empty() {
            warnings.push("sources are configured but there are no destinations".to_string());
        }
        warnings
    }

    /// One [`RegistryRef`] per `auth` entry, ordered by name
    pub fn registry_refs(&self) -> Result<Vec<RegistryRef>> {
        self.auth
            .iter()
            .map(|(name, registry)| registry.registry_ref(name))
            .collect()
    }
}

impl RegistryConfiguration {
    pub fn anonymous(name: &str) -> Self {
        Self {
            name: name.to_string(),
            basic: None,
            insecure: None,
        }
    }

    pub fn registry_ref(&self, name: &str) -> Result<RegistryRef> {
        let credential = self
            .basic
            .as_ref()
            .map(|basic| basic.credential(name))
            .transpose()?;
        let reference = RegistryRef::new(name).with_credential(credential);
        Ok(match self.insecure {
            Some(insecure) => reference.with_insecure(insecure),
            None => reference,
        })
    }
}

impl Basic {
    pub fn credential(&self, registry: &str) -> Result<Credential> {
        if let Some(encoded) = &self.auth {
            let decoded = STANDARD.decode(encoded.trim()).map_err(|e| {
                MirrorError::Configuration(format!(
                    "auth.{}.basic.auth is not valid base64: {}",
                    registry, e
                ))
            })?;
            let decoded = String::from_utf8(decoded).map_err(|_| {
                MirrorError::Configuration(format!("auth.{}.basic.auth is not UTF-8", registry))
            })?;
            let (user, pass) = decoded.split_once(':').ok_or_else(|| {
                MirrorError::Configuration(format!(
                    "auth.{}.basic.auth must encode 'user:password'",
                    registry
                ))
            })?;
            if user.is_empty() {
                return Err(MirrorError::Configuration(format!(
                    "auth.{}.basic.auth has an empty user",
                    registry
                )));
            }
            return Ok(Credential::new(user, pass));
        }

        if self.user.is_empty() {
            return Err(MirrorError::Configuration(format!(
                "auth.{}.basic needs a user",
                registry
            )));
        }
        Ok(Credential::new(self.user.clone(), self.pass.clone()))
    }
}

impl Source {
    pub fn repositories(&self) -> impl Iterator<Item = RepositoryRef> + '_ {
        self.names
            .iter()
            .map(|name| RepositoryRef::new(self.registry.clone(), self.namespace.clone(), name.clone()))
    }
}

/// Go-style duration strings for serde
pub mod duration {
    use crate::error::{MirrorError, Result};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Parse `1h30m`, `1m0s`, `1.5s`, `250ms`, `10us`, `0` or a bare number of seconds
    pub fn parse(text: &str) -> Result<Duration> {
        let text = text.trim();
        let invalid = || MirrorError::Configuration(format!("Invalid duration '{}'", text));

        if text.is_empty() {
            return Err(invalid());
        }
        if let Ok(seconds) = text.parse::<u64>() {
            return Ok(Duration::from_secs(seconds));
        }

        let mut nanos = 0f64;
        let mut rest = text;
        while !rest.is_empty() {
            let number_end = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .ok_or_else(invalid)?;
            if number_end == 0 {
                return Err(invalid());
            }
            let value: f64 = rest[..number_end].parse().map_err(|_| invalid())?;
            rest = &rest[number_end..];

            let unit_end = rest
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(rest.len());
            let scale = match &rest[..unit_end] {
                "ns" => 1.0,
                "us" | "µs" => 1e3,
                "ms" => 1e6,
                "s" => 1e9,
                "m" => 60e9,
                "h" => 3600e9,
                _ => return Err(invalid()),
            };
            nanos += value * scale;
            rest = &rest[unit_end..];
        }

        if !nanos.is_finite() || nanos > u64::MAX as f64 {
            return Err(invalid());
        }
        Ok(Duration::from_nanos(nanos.round() as u64))
    }

    /// Render like Go's `time.Duration::String` (`1m0s`, `1h30m0s`, `250ms`)
    pub fn format(duration: Duration) -> String {
        let nanos = duration.as_nanos();
        if nanos == 0 {
            return "0s".to_string();
        }
        if duration < Duration::from_secs(1) {
            return if nanos % 1_000_000 == 0 {
                format!("{}ms", nanos / 1_000_000)
            } else if nanos % 1_000 == 0 {
                format!("{}us", nanos / 1_000)
            } else {
                format!("{}ns", nanos)
            };
        }

        let total_secs = duration.as_secs();
        let (hours, minutes, secs) = (total_secs / 3600, (total_secs % 3600) / 60, total_secs % 60);
        let seconds = match duration.subsec_nanos() {
            0 => secs.to_string(),
            frac => {
                let digits = format!("{:09}", frac);
                format!("{}.{}", secs, digits.trim_end_matches('0'))
            }
        };

        if hours > 0 {
            format!("{}h{}m{}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m{}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Seconds(seconds) => Ok(Duration::from_secs(seconds)),
            Raw::Text(text) => parse(&text).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let config = Configuration::default();
        assert_eq!(config.worker.parallel, 1);
        assert_eq!(config.worker.interval, Duration::from_secs(60));
        assert_eq!(config.worker.retry.base_delay, Duration::from_millis(5));
        assert_eq!(config.worker.retry.max_delay, Duration::from_secs(1000));
        assert!(config.auth[DEFAULT_REGISTRY].basic.is_none());
        assert!(config.sources.is_empty());
        assert!(config.destinations.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn parses_full_document() {
        let config = Configuration::from_yaml(
            r#"
auth:
  ghcr.io:
    name: ghcr.io
    basic:
      user: bot
      pass: s3cret
  mirror.local:5000:
    basic:
      auth: dXNlcjpwYXNz
worker:
  parallel: 4
  interval: 1h30m
  retry:
    base_delay: 250ms
    max_delay: 10m
sources:
  - registry: docker.io
    namespace: [library]
    names: [golang, alpine]
destinations:
  - ghcr.io
"#,
        )
        .unwrap();

        assert_eq!(config.worker.parallel, 4);
        assert_eq!(config.worker.interval, Duration::from_secs(5400));
        assert_eq!(config.worker.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.worker.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert!(config.auth.contains_key(DEFAULT_REGISTRY));

        let refs = config.registry_refs().unwrap();
        let names: Vec<&str> = refs.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["docker.io", "ghcr.io", "mirror.local:5000"]);
        assert_eq!(refs[1].credential().unwrap().username, "bot");
        assert_eq!(refs[2].credential().unwrap().password, "pass");
        assert!(refs[2].is_insecure());

        let repositories: Vec<String> = config.sources[0].repositories().map(|r| r.full_name()).collect();
        assert_eq!(repositories, vec!["docker.io/library/golang", "docker.io/library/alpine"]);
        config.validate().unwrap();
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(Configuration::from_yaml("  \n").unwrap(), Configuration::default());
    }

    #[test]
    fn rejects_malformed_credentials() {
        let mut config = Configuration::default();
        config.auth.insert(
            "quay.io".to_string(),
            RegistryConfiguration {
                basic: Some(Basic {
                    auth: Some("bm8tY29sb24=".to_string()),
                    ..Basic::default()
                }),
                ..RegistryConfiguration::default()
            },
        );
        let err = config.validate().unwrap_err();
        assert!(matches!(err, MirrorError::Configuration(ref m) if m.contains("user:password")));

        config.auth.get_mut("quay.io").unwrap().basic = Some(Basic::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_unusable_workers_and_sources() {
        let mut config = Configuration::default();
        config.worker.parallel = 0;
        assert!(config.validate().is_err());

        let mut config = Configuration::default();
        config.worker.interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Configuration::default();
        config.sources.push(Source {
            registry: "docker.io".to_string(),
            namespace: vec![],
            names: vec![],
        });
        assert!(config.validate().is_err());

        let mut config = Configuration::default();
        config.destinations.push(" ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn warns_about_unregistered_names() {
        let mut config = Configuration::default();
        config.sources.push(Source {
            registry: "quay.io".to_string(),
            namespace: vec!["coreos".to_string()],
            names: vec!["etcd".to_string()],
        });
        config.destinations.push("ghcr.io".to_string());

        let warnings = config.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("quay.io"));
        assert!(warnings[1].contains("ghcr.io"));
    }

    #[test]
    fn explicit_insecure_overrides_detection() {
        let registry = RegistryConfiguration {
            insecure: Some(false),
            ..RegistryConfiguration::default()
        };
        assert!(!registry.registry_ref("localhost:5000").unwrap().is_insecure());

        let registry = RegistryConfiguration {
            insecure: Some(true),
            ..RegistryConfiguration::default()
        };
        assert!(registry.registry_ref("registry.example.com").unwrap().is_insecure());
    }

    #[test]
    fn go_durations() {
        assert_eq!(duration::parse("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(duration::parse("1m0s").unwrap(), Duration::from_secs(60));
        assert_eq!(duration::parse("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(duration::parse("2h45m30s").unwrap(), Duration::from_secs(9930));
        assert_eq!(duration::parse("300").unwrap(), Duration::from_secs(300));
        assert_eq!(duration::parse("10us").unwrap(), Duration::from_micros(10));
        assert_eq!(duration::parse("0").unwrap(), Duration::ZERO);
        for bad in ["", "m", "1x", "-1s", "1.2.3s", "5 m"] {
            assert!(duration::parse(bad).is_err(), "{bad} should not parse");
        }

        assert_eq!(duration::format(Duration::from_secs(60)), "1m0s");
        assert_eq!(duration::format(Duration::from_secs(5400)), "1h30m0s");
        assert_eq!(duration::format(Duration::from_millis(1500)), "1.5s");
        assert_eq!(duration::format(Duration::from_millis(5)), "5ms");
        assert_eq!(duration::format(Duration::ZERO), "0s");
    }

    #[test]
    fn default_yaml_reloads_identically() {
        let yaml = Configuration::default().to_yaml().unwrap();
        assert!(yaml.contains("1m0s"));
        assert_eq!(Configuration::from_yaml(&yaml).unwrap(), Configuration::default());
    }
}
