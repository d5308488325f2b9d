//! # HTTP API
//!
//! Operational endpoints plus the device operations that reach actors on
//! this node. Every request passes the API key layer first, then the rate
//! limit layer.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /health` | Liveness and counts |
//! | `GET /metrics` | Prometheus text exposition |
//! | `GET /api/v1/cluster/ring` | Ring positions, `?server_type=CORE` |
//! | `GET /api/v1/queues` | Persistence queue counters |
//! | `GET /api/v1/sessions` | Sessions held by this node |
//! | `POST /api/v1/devices/:id/attributes/shared` | Push shared attributes |
//! | `POST /api/v1/devices/:id/rpc` | Server side RPC call |
//! | `POST /api/v1/devices/:id/claim` | Claim with the device's secret |

pub mod auth;
pub mod error;
mod handlers;
pub mod limiter;

pub use auth::{ApiKeyAuthLayer, ApiKeys, AUTHORIZATION_HEADER};
pub use error::ApiError;
pub use limiter::MeteredRateLimiter;

use crate::actors::{AttributeRecord, DeviceActorSystem, TsRecord};
use crate::credentials::InMemoryCredentialStore;
use crate::transport::SessionRegistry;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tg_01_cluster_routing::ClusterRoutingService;
use tg_02_mqtt_transport::MqttTransportServer;
use tg_03_rate_limiting::{RateLimitApi, RateLimitLayer};
use tg_04_batch_queue::PersistenceQueue;
use tower::ServiceBuilder;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// This node's id, `host:port` of its RPC listener.
    pub node_id: String,
    /// Ring owner lookups.
    pub routing: Arc<ClusterRoutingService>,
    /// Device registry.
    pub credentials: Arc<InMemoryCredentialStore>,
    /// Local device actors.
    pub actors: Arc<DeviceActorSystem>,
    /// Local sessions.
    pub sessions: Arc<SessionRegistry>,
    /// Telemetry persistence.
    pub telemetry_queue: Arc<dyn PersistenceQueue<TsRecord>>,
    /// Attribute persistence.
    pub attribute_queue: Arc<dyn PersistenceQueue<AttributeRecord>>,
    /// MQTT listener, for the connection gauge.
    pub mqtt: Arc<MqttTransportServer>,
    /// How long an RPC call waits for the device.
    pub rpc_timeout: Duration,
}

/// Builds the HTTP router.
pub fn router(state: AppState, keys: Arc<ApiKeys>, limiter: Arc<dyn RateLimitApi>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(ApiKeyAuthLayer::new(keys))
        .layer(RateLimitLayer::new(Arc::new(MeteredRateLimiter::new(
            limiter,
        ))));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/api/v1/cluster/ring", get(handlers::ring))
        .route("/api/v1/queues", get(handlers::queues))
        .route("/api/v1/sessions", get(handlers::sessions))
        .route(
            "/api/v1/devices/:device_id/attributes/shared",
            post(handlers::shared_attributes),
        )
        .route("/api/v1/devices/:device_id/rpc", post(handlers::device_rpc))
        .route("/api/v1/devices/:device_id/claim", post(handlers::claim_device))
        .layer(middleware)
        .with_state(state)
}
