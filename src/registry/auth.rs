//! Authentication for Docker Registry v2 / OCI distribution endpoints
//!
//! Registries answer an unauthenticated request with `401` and a
//! `WWW-Authenticate` challenge. A `Bearer` challenge names a token service
//! (`realm`) that exchanges optional basic credentials for a scoped token; a
//! `Basic` challenge expects the credentials on every request.

use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{MirrorError, Result};
use crate::image::Credential;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChallenge {
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
    Basic,
}

impl AuthChallenge {
    /// Parse a `WWW-Authenticate` header value.
    ///
    /// Returns `None` for schemes we cannot answer.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, params_str) = match header.split_once(' ') {
            Some((scheme, rest)) => (scheme, rest),
            None => (header, ""),
        };

        if scheme.eq_ignore_ascii_case("basic") {
            return Some(AuthChallenge::Basic);
        }
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let params = parse_params(params_str);
        let realm = params.get("realm")?.to_string();
        Some(AuthChallenge::Bearer {
            realm,
            service: params.get("service").map(|s| s.to_string()),
            scope: params.get("scope").map(|s| s.to_string()),
        })
    }
}

/// Split `key="value",key2="value, with comma"` respecting quotes
fn parse_params(params_str: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut in_quotes = false;

    for c in params_str.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '=' if !in_value && !in_quotes => in_value = true,
            ',' if !in_quotes => {
                if !key.trim().is_empty() {
                    params.insert(key.trim().to_lowercase(), value.trim().to_string());
                }
                key.clear();
                value.clear();
                in_value = false;
            }
            _ if in_value => value.push(c),
            _ => key.push(c),
        }
    }
    if !key.trim().is_empty() {
        params.insert(key.trim().to_lowercase(), value.trim().to_string());
    }
    params
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Exchanges credentials for registry tokens
#[derive(Debug, Clone)]
pub struct Auth {
    client: Client,
    credential: Option<Credential>,
}

impl Auth {
    pub fn new(client: Client, credential: Option<Credential>) -> Self {
        Self { client, credential }
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Fetch a bearer token for `scope` from the challenge's realm
    pub async fn fetch_token(&self, challenge: &AuthChallenge, scope: &str) -> Result<String> {
        let (realm, service) = match challenge {
            AuthChallenge::Bearer { realm, service, .. } => (realm, service),
            AuthChallenge::Basic => {
                return Err(MirrorError::Authentication(
                    "Basic challenge does not issue tokens".to_string(),
                ));
            }
        };

        let mut url = url::Url::parse(realm)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = service {
                query.append_pair("service", service);
            }
            if !scope.is_empty() {
                query.append_pair("scope", scope);
            }
        }

        tracing::debug!(realm = %realm, scope = %scope, "requesting registry token");

        let mut request = self.client.get(url);
        if let Some(credential) = &self.credential {
            request = request.basic_auth(&credential.username, Some(&credential.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "token request"))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(HttpErrorHandler::handle_auth_error(status, &error_text));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| MirrorError::Parse(format!("Failed to parse token response: {}", e)))?;

        token_response
            .token
            .or(token_response.access_token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                MirrorError::Authentication("Token service returned no token".to_string())
            })
    }
}

/// Token scope for read access to a repository
pub fn pull_scope(repository: &str) -> String {
    format!("repository:{}:pull", repository)
}

/// Token scope for read/write access to a repository
pub fn push_scope(repository: &str) -> String {
    format!("repository:{}:pull,push", repository)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_challenge() {
        let header = r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/golang:pull""#;
        assert_eq!(
            AuthChallenge::parse(header),
            Some(AuthChallenge::Bearer {
                realm: "https://auth.docker.io/token".to_string(),
                service: Some("registry.docker.io".to_string()),
                scope: Some("repository:library/golang:pull".to_string()),
            })
        );
    }

    #[test]
    fn scope_with_comma_stays_intact() {
        let header = r#"Bearer realm="https://ghcr.io/token",scope="repository:org/app:pull,push""#;
        match AuthChallenge::parse(header) {
            Some(AuthChallenge::Bearer { scope, service, .. }) => {
                assert_eq!(scope.as_deref(), Some("repository:org/app:pull,push"));
                assert_eq!(service, None);
            }
            other => panic!("unexpected challenge: {:?}", other),
        }
    }

    #[test]
    fn basic_and_unknown_schemes() {
        assert_eq!(
            AuthChallenge::parse(r#"Basic realm="Registry Realm""#),
            Some(AuthChallenge::Basic)
        );
        assert_eq!(AuthChallenge::parse("Negotiate"), None);
        assert_eq!(AuthChallenge::parse("Bearer service=\"x\""), None);
    }

    #[test]
    fn scopes() {
        assert_eq!(pull_scope("library/golang"), "repository:library/golang:pull");
        assert_eq!(push_scope("team/app"), "repository:team/app:pull,push");
    }
}
