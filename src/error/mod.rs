//! Error types for the mirroring engine and its registry client

pub mod handlers;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    /// Transport level failures (connect, DNS, TLS, timeouts)
    #[error("Network error: {0}")]
    Network(String),
    /// The registry answered with an unexpected status
    #[error("Registry error: {0}")]
    Registry(String),
    /// Credentials rejected or token exchange failed
    #[error("Authentication error: {0}")]
    Authentication(String),
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(String),
    /// Resource not found (registry, repository, manifest, blob)
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Digest mismatch for {expected}: registry returned content hashing to {actual}")]
    DigestMismatch { expected: String, actual: String },
    #[error("Operation cancelled")]
    Cancelled,
    /// One or more sources failed during an enumeration cycle
    #[error("Enumeration failed for {} source(s): {}", .0.len(), .0.join("; "))]
    Enumeration(Vec<String>),
}

impl MirrorError {
    /// Failures that will not heal by retrying with the same configuration.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            MirrorError::Configuration(_) | MirrorError::Validation(_) | MirrorError::NotFound(_)
        )
    }
}

impl From<std::io::Error> for MirrorError {
    fn from(err: std::io::Error) -> Self {
        MirrorError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(err: serde_json::Error) -> Self {
        MirrorError::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for MirrorError {
    fn from(err: serde_yaml::Error) -> Self {
        MirrorError::Configuration(err.to_string())
    }
}

impl From<reqwest::Error> for MirrorError {
    fn from(err: reqwest::Error) -> Self {
        handlers::NetworkErrorHandler::handle_network_error(&err, "registry request")
    }
}

impl From<url::ParseError> for MirrorError {
    fn from(err: url::ParseError) -> Self {
        MirrorError::Validation(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for MirrorError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        MirrorError::Parse(format!("UTF-8 conversion error: {}", err))
    }
}
