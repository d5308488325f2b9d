//! HTTP rate limit filter.
//!
//! Reads the [`SecurityUser`] the authentication layer put into the request
//! extensions and checks it against the registry. Anonymous requests pass.
//! Throttled requests get `429 Too Many Requests` with a JSON error body.

use crate::domain::RateLimitError;
use crate::ports::RateLimitApi;
use axum::{
    body::Body,
    http::{header, HeaderValue, Request, StatusCode},
    response::Response,
};
use shared_types::SecurityUser;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::{Layer, Service};
use tracing::debug;

/// Error code carried in the JSON body of a 429 response.
pub const TOO_MANY_REQUESTS_ERROR_CODE: u16 = 33;

/// Rate limit layer
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<dyn RateLimitApi>,
}

impl RateLimitLayer {
    /// Layer checking every request against `limiter`.
    pub fn new(limiter: Arc<dyn RateLimitApi>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

/// Rate limit service
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<dyn RateLimitApi>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
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

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let verdict = match req.extensions().get::<SecurityUser>() {
            Some(user) => self.limiter.check_user(user),
            None => Ok(()),
        };
        match verdict {
            Ok(()) => {
                let mut inner = self.inner.clone();
                Box::pin(async move { inner.call(req).await })
            }
            Err(err) => {
                debug!(path = %req.uri().path(), "[tg-03] Request throttled: {}", err);
                Box::pin(async move { Ok(too_many_requests(err)) })
            }
        }
    }
}

fn too_many_requests(err: RateLimitError) -> Response {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let body = serde_json::json!({
        "status": StatusCode::TOO_MANY_REQUESTS.as_u16(),
        "message": err.to_string(),
        "errorCode": TOO_MANY_REQUESTS_ERROR_CODE,
        "entityType": err.entity_type().to_string(),
        "timestamp": timestamp,
    });

    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MockRateLimiter;
    use axum::body::to_bytes;
    use shared_types::Authority;
    use std::convert::Infallible;
    use std::sync::atomic::Ordering;
    use tower::{service_fn, ServiceExt};
    use uuid::Uuid;

    fn user() -> SecurityUser {
        SecurityUser {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            customer_id: None,
            authority: Authority::TenantAdmin,
        }
    }

    fn request(user: Option<SecurityUser>) -> Request<Body> {
        let mut req = Request::builder().uri("/api/ring").body(Body::empty()).unwrap();
        if let Some(user) = user {
            req.extensions_mut().insert(user);
        }
        req
    }

    async fn ok_handler(_req: Request<Body>) -> Result<Response, Infallible> {
        Ok(Response::new(Body::from("ok")))
    }

    #[tokio::test]
    async fn test_admitted_request_reaches_inner() {
        let limiter = Arc::new(MockRateLimiter::default());
        let service = RateLimitLayer::new(limiter.clone()).layer(service_fn(ok_handler));

        let response = service.oneshot(request(Some(user()))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(limiter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_throttled_request_gets_429() {
        let limiter = Arc::new(MockRateLimiter {
            reject: Some(RateLimitError::Customer),
            ..Default::default()
        });
        let service = RateLimitLayer::new(limiter).layer(service_fn(ok_handler));

        let response = service.oneshot(request(Some(user()))).await.unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Too many requests for current customer!");
        assert_eq!(json["errorCode"], 33);
        assert_eq!(json["entityType"], "CUSTOMER");
    }

    #[tokio::test]
    async fn test_anonymous_request_is_not_checked() {
        let limiter = Arc::new(MockRateLimiter {
            reject: Some(RateLimitError::Tenant),
            ..Default::default()
        });
        let service = RateLimitLayer::new(limiter.clone()).layer(service_fn(ok_handler));

        let response = service.oneshot(request(None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(limiter.calls.load(Ordering::SeqCst), 0);
    }
}
