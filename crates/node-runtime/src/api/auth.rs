//! API key authentication.
//!
//! Resolves `X-Authorization: ApiKey <key>` to a [`SecurityUser`] and puts it
//! into the request extensions for the rate limit layer and the handlers.
//! Requests without the header pass through anonymously. Unknown keys are
//! refused with `401`.

use super::ApiError;
use crate::config::ApiUserEntry;
use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use shared_types::SecurityUser;
use std::collections::HashMap;
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Request header carrying the key.
pub const AUTHORIZATION_HEADER: &str = "X-Authorization";

const API_KEY_SCHEME: &str = "ApiKey ";

/// Known keys and their users.
#[derive(Debug, Default)]
pub struct ApiKeys {
    users: HashMap<String, SecurityUser>,
}

impl ApiKeys {
    /// Key table built from configuration.
    pub fn from_entries(entries: &[ApiUserEntry]) -> Self {
        let users = entries
            .iter()
            .map(|entry| {
                (
                    entry.api_key.clone(),
                    SecurityUser {
                        user_id: entry.user_id,
                        tenant_id: entry.tenant_id,
                        customer_id: entry.customer_id,
                        authority: entry.authority,
                    },
                )
            })
            .collect();
        Self { users }
    }

    fn lookup(&self, key: &str) -> Option<&SecurityUser> {
        self.users.get(key)
    }
}

/// Authentication layer
#[derive(Clone)]
pub struct ApiKeyAuthLayer {
    keys: Arc<ApiKeys>,
}

impl ApiKeyAuthLayer {
    /// Layer resolving keys against `keys`.
    pub fn new(keys: Arc<ApiKeys>) -> Self {
        Self { keys }
    }
}

impl<S> Layer<S> for ApiKeyAuthLayer {
    type Service = ApiKeyAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKeyAuthService {
            inner,
            keys: Arc::clone(&self.keys),
        }
    }
}

/// Authentication service
#[derive(Clone)]
pub struct ApiKeyAuthService<S> {
    inner: S,
    keys: Arc<ApiKeys>,
}

impl<S> Service<Request<Body>> for ApiKeyAuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let header = req
            .headers()
            .get(AUTHORIZATION_HEADER)
            .map(|value| value.to_str().unwrap_or_default().to_string());

        if let Some(header) = header {
            let user = header
                .strip_prefix(API_KEY_SCHEME)
                .and_then(|key| self.keys.lookup(key.trim()))
                .cloned();
            match user {
                Some(user) => {
                    debug!(user = %user.user_id, path = %req.uri().path(), "[api] Authenticated request");
                    req.extensions_mut().insert(user);
                }
                None => {
                    warn!(path = %req.uri().path(), "[api] Rejected request with invalid API key");
                    return Box::pin(async { Ok(ApiError::Unauthorized.into_response()) });
                }
            }
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}
