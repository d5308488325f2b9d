//! Route handlers.

use super::{ApiError, AppState};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_types::{EntityId, SecurityUser, ServerType};
use tg_01_cluster_routing::ClusterRoutingApi;
use tg_02_mqtt_transport::adaptor::json::parse_key_values;
use tg_telemetry::{encode_metrics, ACTIVE_CONNECTIONS, RING_MEMBERS};
use tracing::info;
use uuid::Uuid;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub(super) async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "UP",
        "version": crate::VERSION,
        "nodeId": state.node_id,
        "actors": state.actors.actor_count(),
        "sessions": state.sessions.len(),
    }))
}

/// Gauges that mirror live state are refreshed on scrape.
pub(super) async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    for server_type in ServerType::ALL {
        let label = server_type.to_string();
        RING_MEMBERS
            .with_label_values(&[label.as_str()])
            .set(state.routing.member_count(server_type) as i64);
    }
    ACTIVE_CONNECTIONS.set(state.mqtt.active_connections() as i64);

    let text = encode_metrics().map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], text).into_response())
}

#[derive(Debug, Deserialize)]
pub(super) struct RingQuery {
    server_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct RingEntry {
    hash: i64,
    host: String,
    port: u16,
}

pub(super) async fn ring(
    State(state): State<AppState>,
    Query(query): Query<RingQuery>,
) -> Result<Json<Vec<RingEntry>>, ApiError> {
    let server_type = match query.server_type {
        Some(name) => name
            .parse::<ServerType>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => ServerType::Core,
    };
    let entries = state
        .routing
        .ring_snapshot(server_type)
        .into_iter()
        .map(|(hash, address)| RingEntry {
            hash,
            host: address.host,
            port: address.port,
        })
        .collect();
    Ok(Json(entries))
}

pub(super) async fn queues(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "timeseries": state.telemetry_queue.stats(),
        "attributes": state.attribute_queue.stats(),
    }))
}

pub(super) async fn sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.sessions.snapshot())
}

/// Who may act on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// The device's tenant, or its customer for customer users.
    Owner,
    /// Anyone in the device's tenant.
    Tenant,
}

/// Checks the caller against the device and that this node owns it.
fn authorize(
    state: &AppState,
    user: Option<Extension<SecurityUser>>,
    device_id: Uuid,
    access: Access,
) -> Result<SecurityUser, ApiError> {
    let Some(Extension(user)) = user else {
        return Err(ApiError::Unauthorized);
    };
    let device = state
        .credentials
        .find_by_id(device_id)
        .ok_or(ApiError::DeviceNotFound(device_id))?;

    let allowed = user.is_system_admin()
        || (user.tenant_id == device.tenant_id
            && (access == Access::Tenant
                || !user.is_customer_user()
                || user.customer_id == device.customer_id));
    if !allowed {
        return Err(ApiError::Forbidden(device_id));
    }

    if let Some(owner) = state.routing.resolve(&EntityId::device(device_id)) {
        return Err(ApiError::NotOwner {
            device: device_id,
            owner,
        });
    }
    Ok(user)
}

pub(super) async fn shared_attributes(
    State(state): State<AppState>,
    user: Option<Extension<SecurityUser>>,
    Path(device_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, user, device_id, Access::Owner)?;
    let kv = parse_key_values(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let updated = kv.len();
    state.actors.update_shared_attributes(device_id, kv)?;
    Ok(Json(json!({ "updated": updated })))
}

#[derive(Debug, Deserialize)]
pub(super) struct RpcBody {
    method: String,
    #[serde(default)]
    params: Value,
}

pub(super) async fn device_rpc(
    State(state): State<AppState>,
    user: Option<Extension<SecurityUser>>,
    Path(device_id): Path<Uuid>,
    Json(body): Json<RpcBody>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, user, device_id, Access::Owner)?;
    let payload = state
        .actors
        .call_rpc(device_id, body.method, body.params.to_string(), state.rpc_timeout)
        .await?;
    let response = match serde_json::from_str::<Value>(&payload) {
        Ok(value) => value,
        Err(_) => Value::String(payload),
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ClaimBody {
    secret_key: String,
}

pub(super) async fn claim_device(
    State(state): State<AppState>,
    user: Option<Extension<SecurityUser>>,
    Path(device_id): Path<Uuid>,
    Json(body): Json<ClaimBody>,
) -> Result<Json<Value>, ApiError> {
    let user = authorize(&state, user, device_id, Access::Tenant)?;
    state.actors.claim(device_id, body.secret_key).await?;

    let customer_id = if user.is_customer_user() {
        user.customer_id
    } else {
        None
    };
    state
        .credentials
        .assign_customer(device_id, customer_id)
        .ok_or(ApiError::DeviceNotFound(device_id))?;
    info!(device = %device_id, customer = ?customer_id, "[api] Device claimed through the API");
    Ok(Json(json!({ "deviceId": device_id, "customerId": customer_id })))
}
