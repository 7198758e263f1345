//! Standardized mapping of HTTP and transport failures to [`MirrorError`]

use crate::error::MirrorError;
use reqwest::StatusCode;

/// Maps registry HTTP responses to errors with operation context
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Handle registry-related HTTP errors
    pub fn handle_registry_error(
        status: StatusCode,
        error_text: &str,
        operation: &str,
    ) -> MirrorError {
        match status.as_u16() {
            401 => MirrorError::Authentication(format!(
                "Unauthorized to perform {}: {}",
                operation, error_text
            )),
            403 => MirrorError::Authentication(format!(
                "Forbidden: insufficient permissions for {}: {}",
                operation, error_text
            )),
            404 => MirrorError::NotFound(format!("{}: {}", operation, error_text)),
            429 => MirrorError::Registry(format!("Rate limited during {}: {}", operation, error_text)),
            500 => MirrorError::Registry(format!(
                "Registry server error during {}: {}",
                operation, error_text
            )),
            502 | 503 => MirrorError::Registry(format!(
                "Registry unavailable for {}: {}",
                operation, error_text
            )),
            _ => MirrorError::Registry(format!(
                "{} failed (status {}): {}",
                operation, status, error_text
            )),
        }
    }

    /// Handle token endpoint failures
    pub fn handle_auth_error(status: StatusCode, error_text: &str) -> MirrorError {
        let error_msg = match status.as_u16() {
            400 => "Invalid token request parameters".to_string(),
            401 => "Invalid credentials provided".to_string(),
            403 => "Access denied - insufficient permissions".to_string(),
            404 => "Authentication endpoint not found".to_string(),
            _ => format!("Authentication failed (status {}): {}", status, error_text),
        };

        MirrorError::Authentication(error_msg)
    }
}

/// Network error categorization and handling
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    /// Categorize and format network errors with helpful context
    pub fn handle_network_error(error: &reqwest::Error, context: &str) -> MirrorError {
        if error.is_timeout() {
            MirrorError::Network(format!("{} timeout: {}", context, error))
        } else if error.is_connect() {
            MirrorError::Network(format!("Connection error during {}: {}", context, error))
        } else if error.is_decode() {
            MirrorError::Parse(format!("Failed to decode {} response: {}", context, error))
        } else if error.to_string().contains("certificate") {
            MirrorError::Network(format!(
                "TLS certificate error during {}: {}",
                context, error
            ))
        } else {
            MirrorError::Network(format!("{} network error: {}", context, error))
        }
    }
}
