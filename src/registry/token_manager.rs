//! Per-scope token cache with automatic challenge handling
//!
//! Every registry request goes through [`TokenManager::execute_with_retry`]:
//! it attaches whatever credential is known for the request's scope, and on a
//! `401` answers the registry's challenge once before retrying.

use crate::error::handlers::NetworkErrorHandler;
use crate::error::Result;
use crate::registry::auth::{Auth, AuthChallenge};
use reqwest::header::WWW_AUTHENTICATE;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Thread-safe token manager shared by all operations of one registry client
#[derive(Clone)]
pub struct TokenManager {
    auth: Auth,
    tokens: Arc<RwLock<HashMap<String, String>>>,
    use_basic: Arc<AtomicBool>,
}

impl TokenManager {
    pub fn new(auth: Auth) -> Self {
        Self {
            auth,
            tokens: Arc::new(RwLock::new(HashMap::new())),
            use_basic: Arc::new(AtomicBool::new(false)),
        }
    }

    fn cached_token(&self, scope: &str) -> Option<String> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scope)
            .cloned()
    }

    fn store_token(&self, scope: &str, token: String) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scope.to_string(), token);
    }

    fn authorize(&self, request: RequestBuilder, scope: &str) -> RequestBuilder {
        if let Some(token) = self.cached_token(scope) {
            return request.bearer_auth(token);
        }
        match self.auth.credential() {
            Some(credential) if self.use_basic.load(Ordering::Relaxed) => {
                request.basic_auth(&credential.username, Some(&credential.password))
            }
            _ => request,
        }
    }

    /// Send a request built by `build`, answering one auth challenge if needed.
    ///
    /// The returned response may still carry a `401` when the registry rejects
    /// the credentials; callers map that status like any other failure.
    pub async fn execute_with_retry<F>(&self, scope: &str, context: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let response = self.send(scope, context, &build).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .and_then(AuthChallenge::parse);

        match challenge {
            Some(challenge @ AuthChallenge::Bearer { .. }) => {
                tracing::debug!(scope = %scope, "registry requested a bearer token");
                let token = self.auth.fetch_token(&challenge, scope).await?;
                self.store_token(scope, token);
            }
            Some(AuthChallenge::Basic) if self.auth.credential().is_some() => {
                tracing::debug!(scope = %scope, "registry requested basic authentication");
                self.use_basic.store(true, Ordering::Relaxed);
            }
            _ => return Ok(response),
        }

        self.send(scope, context, &build).await
    }

    async fn send<F>(&self, scope: &str, context: &str, build: &F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        self.execute_once(scope, context, build()).await
    }

    /// Send a request that cannot be rebuilt, such as one with a streamed
    /// body, using the credential already known for `scope`
    pub async fn execute_once(&self, scope: &str, context: &str, request: RequestBuilder) -> Result<Response> {
        self.authorize(request, scope)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, context))
    }
}
