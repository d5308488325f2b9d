//! # Gateway Sessions
//!
//! A gateway multiplexes many child devices over its own connection. Each
//! child gets a session of its own, registered with the transport service
//! on first sight and closed together with the gateway.

use crate::adaptor::json::{claim_from_json, parse_key_values, parse_telemetry};
use crate::adaptor::{JsonMqttAdaptor, OutboundPublish};
use crate::domain::{AdaptorError, TransportError};
use crate::ports::TransportService;
use serde_json::Value;
use shared_types::{
    DeviceInfo, DeviceToTransportMsg, GetAttributeRequestMsg, PostAttributeMsg, SessionEvent,
    SessionInfo, SubscribeToAttributeUpdatesMsg, SubscribeToRpcMsg, ToDeviceRpcResponseMsg,
    TransportPayload, TransportToDeviceMsg,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Device type used when a connect message names none.
pub const DEFAULT_CHILD_DEVICE_TYPE: &str = "default";

struct ChildSession {
    device: DeviceInfo,
    session: SessionInfo,
}

/// Child sessions of one gateway connection.
pub struct GatewaySessionHandler {
    gateway: DeviceInfo,
    gateway_session: SessionInfo,
    transport: Arc<dyn TransportService>,
    listener: UnboundedSender<DeviceToTransportMsg>,
    adaptor: JsonMqttAdaptor,
    children: HashMap<String, ChildSession>,
    names_by_session: HashMap<Uuid, String>,
}

fn parse(payload: &[u8]) -> Result<Value, TransportError> {
    serde_json::from_slice(payload).map_err(|e| AdaptorError::from(e).into())
}

fn as_object(value: &Value) -> Result<&serde_json::Map<String, Value>, TransportError> {
    value
        .as_object()
        .ok_or_else(|| AdaptorError::InvalidPayload("expected JSON object".into()).into())
}

fn string_field<'a>(value: &'a Value, field: &str) -> Result<&'a str, TransportError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AdaptorError::InvalidPayload(format!("missing {field}")).into())
}

fn request_id_field(value: &Value) -> Result<i32, TransportError> {
    value
        .get("id")
        .and_then(Value::as_i64)
        .and_then(|id| i32::try_from(id).ok())
        .ok_or_else(|| AdaptorError::InvalidPayload("missing id".into()).into())
}

impl GatewaySessionHandler {
    /// Handler for a freshly connected gateway.
    pub fn new(
        gateway: DeviceInfo,
        gateway_session: SessionInfo,
        transport: Arc<dyn TransportService>,
        listener: UnboundedSender<DeviceToTransportMsg>,
    ) -> Self {
        Self {
            gateway,
            gateway_session,
            transport,
            listener,
            adaptor: JsonMqttAdaptor,
            children: HashMap::new(),
            names_by_session: HashMap::new(),
        }
    }

    /// Number of connected children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Session of a connected child.
    pub fn child_session(&self, device_name: &str) -> Option<&SessionInfo> {
        self.children.get(device_name).map(|c| &c.session)
    }

    /// True when `session_id` belongs to one of the children.
    pub fn owns_session(&self, session_id: Uuid) -> bool {
        self.names_by_session.contains_key(&session_id)
    }

    /// `v1/gateway/connect` with `{"device": "name", "type": "type"}`.
    pub async fn on_connect(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let body = parse(payload)?;
        let name = string_field(&body, "device")?;
        let device_type = body
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_CHILD_DEVICE_TYPE);
        self.connect_child(name, device_type).await?;
        Ok(())
    }

    /// `v1/gateway/disconnect` with `{"device": "name"}`.
    pub async fn on_disconnect(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let body = parse(payload)?;
        let name = string_field(&body, "device")?;
        match self.children.remove(name) {
            Some(child) => {
                self.names_by_session.remove(&child.session.session_id);
                self.close_child(&child).await;
                info!(
                    "[tg-02] Gateway {} child {} disconnected",
                    self.gateway.device_name, name
                );
            }
            None => debug!(
                "[tg-02] Gateway {} disconnect for unknown child {}",
                self.gateway.device_name, name
            ),
        }
        Ok(())
    }

    /// `v1/gateway/telemetry` with `{"device": [telemetry, ...]}`.
    pub async fn on_telemetry(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let body = parse(payload)?;
        for (name, data) in as_object(&body)? {
            let telemetry = parse_telemetry(data)?;
            self.forward(name, TransportPayload::PostTelemetry(telemetry))
                .await?;
        }
        Ok(())
    }

    /// `v1/gateway/attributes` with `{"device": {"key": value}}`.
    pub async fn on_attributes(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let body = parse(payload)?;
        for (name, data) in as_object(&body)? {
            let kv = parse_key_values(data)?;
            self.forward(name, TransportPayload::PostAttributes(PostAttributeMsg { kv }))
                .await?;
        }
        Ok(())
    }

    /// `v1/gateway/attributes/request` with
    /// `{"id": 1, "device": "name", "client": true, "key": "k"}` or `"keys": [..]`.
    pub async fn on_attributes_request(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let body = parse(payload)?;
        let request_id = request_id_field(&body)?;
        let name = string_field(&body, "device")?.to_string();
        let keys: Vec<String> = match (body.get("key"), body.get("keys")) {
            (Some(Value::String(key)), _) => vec![key.clone()],
            (_, Some(Value::Array(keys))) => keys
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
            _ => return Err(AdaptorError::InvalidPayload("missing key or keys".into()).into()),
        };
        let client = body.get("client").and_then(Value::as_bool).unwrap_or(false);
        let request = if client {
            GetAttributeRequestMsg {
                request_id,
                client_keys: keys,
                shared_keys: Vec::new(),
            }
        } else {
            GetAttributeRequestMsg {
                request_id,
                client_keys: Vec::new(),
                shared_keys: keys,
            }
        };
        self.forward(&name, TransportPayload::GetAttributes(request))
            .await
    }

    /// `v1/gateway/rpc` with `{"device": "name", "id": 1, "data": {...}}`.
    pub async fn on_rpc_response(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let body = parse(payload)?;
        let request_id = request_id_field(&body)?;
        let name = string_field(&body, "device")?.to_string();
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let response = ToDeviceRpcResponseMsg {
            request_id,
            payload: data.to_string(),
        };
        self.forward(&name, TransportPayload::ToDeviceRpcResponse(response))
            .await
    }

    /// `v1/gateway/claim` with `{"device": {"secretKey": "...", "durationMs": 1000}}`.
    pub async fn on_claim(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let body = parse(payload)?;
        for (name, data) in as_object(&body)? {
            let device_id = self.connect_child(name, DEFAULT_CHILD_DEVICE_TYPE).await?.device_id;
            let claim = claim_from_json(device_id, data);
            self.forward(name, TransportPayload::ClaimDevice(claim))
                .await?;
        }
        Ok(())
    }

    /// The gateway itself disconnected: close every child.
    pub async fn on_gateway_disconnect(&mut self) {
        let children: Vec<ChildSession> = self.children.drain().map(|(_, c)| c).collect();
        self.names_by_session.clear();
        for child in &children {
            self.close_child(child).await;
        }
        if !children.is_empty() {
            info!(
                "[tg-02] Gateway {} closed {} child sessions",
                self.gateway.device_name,
                children.len()
            );
        }
    }

    /// Gateway ping counts as activity for every child.
    pub fn report_activity(&self) {
        for child in self.children.values() {
            self.transport.report_activity(&child.session);
        }
    }

    /// Wire form of a message addressed to a child session.
    pub fn convert_to_publish(&self, msg: &DeviceToTransportMsg) -> Option<OutboundPublish> {
        let name = self.names_by_session.get(&msg.session_id)?;
        self.adaptor.convert_to_gateway_publish(name, &msg.msg)
    }

    async fn connect_child(
        &mut self,
        name: &str,
        device_type: &str,
    ) -> Result<DeviceInfo, TransportError> {
        if let Some(child) = self.children.get(name) {
            return Ok(child.device.clone());
        }
        let device = self
            .transport
            .get_or_create_device(&self.gateway, name, device_type)
            .await?;
        let session = SessionInfo::for_device(self.gateway_session.node_id.clone(), &device);

        let open = TransportToDeviceMsg::new(
            session.clone(),
            TransportPayload::SessionEvent(SessionEvent::Open),
        );
        self.transport.process(open).await?;
        self.transport
            .register_session(&session, self.listener.clone())
            .await;
        for payload in [
            TransportPayload::SubscribeToAttributes(SubscribeToAttributeUpdatesMsg {
                unsubscribe: false,
            }),
            TransportPayload::SubscribeToRpc(SubscribeToRpcMsg { unsubscribe: false }),
        ] {
            let subscribe = TransportToDeviceMsg::new(session.clone(), payload);
            if let Err(e) = self.transport.process(subscribe).await {
                // Not tracked yet, so the gateway disconnect would miss it.
                self.transport.deregister_session(&session).await;
                return Err(e);
            }
        }

        info!(
            "[tg-02] Gateway {} child {} connected (session {})",
            self.gateway.device_name, name, session.session_id
        );
        self.names_by_session
            .insert(session.session_id, name.to_string());
        self.children.insert(
            name.to_string(),
            ChildSession {
                device: device.clone(),
                session,
            },
        );
        Ok(device)
    }

    async fn forward(&mut self, name: &str, payload: TransportPayload) -> Result<(), TransportError> {
        self.connect_child(name, DEFAULT_CHILD_DEVICE_TYPE).await?;
        let session = match self.children.get(name) {
            Some(child) => child.session.clone(),
            None => return Err(TransportError::DeviceLookup(name.to_string())),
        };
        self.transport
            .process(TransportToDeviceMsg::new(session, payload))
            .await
    }

    async fn close_child(&self, child: &ChildSession) {
        let closed = TransportToDeviceMsg::new(
            child.session.clone(),
            TransportPayload::SessionEvent(SessionEvent::Closed),
        );
        if let Err(e) = self.transport.process(closed).await {
            warn!(
                "[tg-02] Failed to report close of child {}: {}",
                child.device.device_name, e
            );
        }
        self.transport.deregister_session(&child.session).await;
    }
}
