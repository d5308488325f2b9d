//! # JSON Payload Adaptor
//!
//! Converts JSON PUBLISH payloads to transport messages and device-bound
//! messages back to `(topic, payload)` pairs.
//!
//! Telemetry accepts three shapes:
//!
//! ```text
//! {"temperature": 42}                              values stamped with now
//! {"ts": 1700000000000, "values": {"temperature": 42}}
//! [ ...either of the above... ]
//! ```

use crate::domain::topics::{
    DEVICE_ATTRIBUTES_REQUEST_TOPIC_PREFIX, DEVICE_ATTRIBUTES_RESPONSE_TOPIC_PREFIX,
    DEVICE_ATTRIBUTES_TOPIC, DEVICE_RPC_REQUESTS_TOPIC, DEVICE_RPC_RESPONSE_TOPIC,
    GATEWAY_ATTRIBUTES_RESPONSE_TOPIC, GATEWAY_ATTRIBUTES_TOPIC, GATEWAY_RPC_TOPIC,
};
use crate::domain::AdaptorError;
use bytes::Bytes;
use serde_json::{json, Map, Value};
use shared_types::{
    AttributeUpdateNotificationMsg, ClaimDeviceMsg, GetAttributeRequestMsg,
    GetAttributeResponseMsg, KeyValue, KvValue, PostAttributeMsg, PostTelemetryMsg,
    ToDeviceRpcRequestMsg, ToDeviceRpcResponseMsg, ToServerRpcRequestMsg, ToServerRpcResponseMsg,
    ToTransportMsg, TsKvList,
};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// A PUBLISH to send: topic and payload.
pub type OutboundPublish = (String, Bytes);

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn parse_json(payload: &[u8]) -> Result<Value, AdaptorError> {
    Ok(serde_json::from_slice(payload)?)
}

fn payload_str(payload: &[u8]) -> Result<&str, AdaptorError> {
    std::str::from_utf8(payload).map_err(|_| AdaptorError::InvalidPayload("not UTF-8".into()))
}

fn request_id(topic: &str, prefix: &str) -> Result<i32, AdaptorError> {
    let suffix = topic.strip_prefix(prefix).unwrap_or_default();
    suffix
        .parse()
        .map_err(|_| AdaptorError::InvalidRequestId(topic.to_string()))
}

/// Converts one JSON value to a typed value. `null` is rejected.
pub fn to_kv_value(value: &Value) -> Result<KvValue, AdaptorError> {
    match value {
        Value::Bool(b) => Ok(KvValue::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(KvValue::Long(i)),
            None => n
                .as_f64()
                .map(KvValue::Double)
                .ok_or_else(|| AdaptorError::InvalidPayload(format!("unsupported number {n}"))),
        },
        Value::String(s) => Ok(KvValue::Str(s.clone())),
        Value::Object(_) | Value::Array(_) => Ok(KvValue::Json(value.to_string())),
        Value::Null => Err(AdaptorError::InvalidPayload("null value".into())),
    }
}

/// Converts a typed value back to JSON.
pub fn from_kv_value(value: &KvValue) -> Value {
    match value {
        KvValue::Bool(b) => Value::Bool(*b),
        KvValue::Long(i) => Value::from(*i),
        KvValue::Double(d) => Value::from(*d),
        KvValue::Str(s) => Value::String(s.clone()),
        KvValue::Json(raw) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())),
    }
}

/// Reads a flat JSON object as key/value pairs.
pub fn parse_key_values(value: &Value) -> Result<Vec<KeyValue>, AdaptorError> {
    let object = value
        .as_object()
        .ok_or_else(|| AdaptorError::InvalidPayload("expected JSON object".into()))?;
    object
        .iter()
        .map(|(k, v)| Ok(KeyValue::new(k.clone(), to_kv_value(v)?)))
        .collect()
}

fn kv_object(kvs: &[KeyValue]) -> Map<String, Value> {
    kvs.iter()
        .map(|kv| (kv.key.clone(), from_kv_value(&kv.value)))
        .collect()
}

fn parse_ts_entry(value: &Value, now: i64) -> Result<TsKvList, AdaptorError> {
    let object = value
        .as_object()
        .ok_or_else(|| AdaptorError::InvalidPayload("expected JSON object".into()))?;
    match (object.get("ts"), object.get("values")) {
        (Some(ts), Some(values)) => Ok(TsKvList {
            ts: ts
                .as_i64()
                .ok_or_else(|| AdaptorError::InvalidPayload("ts is not an integer".into()))?,
            kv: parse_key_values(values)?,
        }),
        _ => Ok(TsKvList {
            ts: now,
            kv: parse_key_values(value)?,
        }),
    }
}

/// Reads any of the telemetry shapes.
pub fn parse_telemetry(value: &Value) -> Result<PostTelemetryMsg, AdaptorError> {
    let now = now_millis();
    let ts_kv_list = match value {
        Value::Array(items) => items
            .iter()
            .map(|item| parse_ts_entry(item, now))
            .collect::<Result<Vec<_>, _>>()?,
        other => vec![parse_ts_entry(other, now)?],
    };
    Ok(PostTelemetryMsg { ts_kv_list })
}

fn split_keys(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

/// JSON implementation of the MQTT payload adaptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMqttAdaptor;

impl JsonMqttAdaptor {
    /// `v1/devices/me/telemetry`
    pub fn convert_to_post_telemetry(&self, payload: &[u8]) -> Result<PostTelemetryMsg, AdaptorError> {
        parse_telemetry(&parse_json(payload)?)
    }

    /// `v1/devices/me/attributes`
    pub fn convert_to_post_attributes(&self, payload: &[u8]) -> Result<PostAttributeMsg, AdaptorError> {
        Ok(PostAttributeMsg {
            kv: parse_key_values(&parse_json(payload)?)?,
        })
    }

    /// `v1/devices/me/attributes/request/{id}` with
    /// `{"clientKeys": "a,b", "sharedKeys": "c"}`. An empty payload asks for everything.
    pub fn convert_to_get_attributes(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Result<GetAttributeRequestMsg, AdaptorError> {
        let request_id = request_id(topic, DEVICE_ATTRIBUTES_REQUEST_TOPIC_PREFIX)?;
        let body = if payload.is_empty() {
            Value::Object(Map::new())
        } else {
            parse_json(payload)?
        };
        Ok(GetAttributeRequestMsg {
            request_id,
            client_keys: split_keys(body.get("clientKeys")),
            shared_keys: split_keys(body.get("sharedKeys")),
        })
    }

    /// `v1/devices/me/rpc/response/{id}`. The payload is passed through.
    pub fn convert_to_device_rpc_response(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Result<ToDeviceRpcResponseMsg, AdaptorError> {
        Ok(ToDeviceRpcResponseMsg {
            request_id: request_id(topic, DEVICE_RPC_RESPONSE_TOPIC)?,
            payload: payload_str(payload)?.to_string(),
        })
    }

    /// `v1/devices/me/rpc/request/{id}` with `{"method": "...", "params": ...}`.
    pub fn convert_to_server_rpc_request(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Result<ToServerRpcRequestMsg, AdaptorError> {
        let request_id = request_id(topic, DEVICE_RPC_REQUESTS_TOPIC)?;
        let body = parse_json(payload)?;
        let method_name = body
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| AdaptorError::InvalidPayload("missing method".into()))?
            .to_string();
        let params = body.get("params").cloned().unwrap_or(Value::Null).to_string();
        Ok(ToServerRpcRequestMsg {
            request_id,
            method_name,
            params,
        })
    }

    /// `v1/devices/me/claim` with optional `{"secretKey": "...", "durationMs": 60000}`.
    pub fn convert_to_claim_device(
        &self,
        device_id: Uuid,
        payload: &[u8],
    ) -> Result<ClaimDeviceMsg, AdaptorError> {
        let body = if payload.is_empty() {
            Value::Object(Map::new())
        } else {
            parse_json(payload)?
        };
        Ok(claim_from_json(device_id, &body))
    }

    /// Device bound message as a PUBLISH on the device topics.
    ///
    /// `None` for messages that have no wire form.
    pub fn convert_to_publish(&self, msg: &ToTransportMsg) -> Option<OutboundPublish> {
        let (topic, body) = match msg {
            ToTransportMsg::AttributeUpdate(update) => (
                DEVICE_ATTRIBUTES_TOPIC.to_string(),
                attribute_update_json(update),
            ),
            ToTransportMsg::GetAttributesResponse(response) => (
                format!("{DEVICE_ATTRIBUTES_RESPONSE_TOPIC_PREFIX}{}", response.request_id),
                attribute_response_json(response),
            ),
            ToTransportMsg::ToDeviceRpcRequest(request) => (
                format!("{DEVICE_RPC_REQUESTS_TOPIC}{}", request.request_id),
                rpc_request_json(request),
            ),
            ToTransportMsg::ToServerRpcResponse(response) => {
                let topic = format!("{DEVICE_RPC_RESPONSE_TOPIC}{}", response.request_id);
                return Some((topic, rpc_response_bytes(response)));
            }
            ToTransportMsg::SessionClose { .. } => return None,
        };
        Some((topic, Bytes::from(body.to_string())))
    }

    /// Device bound message for a gateway child, wrapped with its name.
    pub fn convert_to_gateway_publish(
        &self,
        device_name: &str,
        msg: &ToTransportMsg,
    ) -> Option<OutboundPublish> {
        let (topic, body) = match msg {
            ToTransportMsg::AttributeUpdate(update) => (
                GATEWAY_ATTRIBUTES_TOPIC,
                json!({"device": device_name, "data": attribute_update_json(update)}),
            ),
            ToTransportMsg::GetAttributesResponse(response) => {
                let mut body = json!({"id": response.request_id, "device": device_name});
                let values: Map<String, Value> = kv_object(&response.client_attributes)
                    .into_iter()
                    .chain(kv_object(&response.shared_attributes))
                    .collect();
                if let Some(error) = &response.error {
                    body["error"] = Value::String(error.clone());
                } else if values.len() == 1 {
                    body["value"] = values.values().next().cloned().unwrap_or(Value::Null);
                } else {
                    body["values"] = Value::Object(values);
                }
                (GATEWAY_ATTRIBUTES_RESPONSE_TOPIC, body)
            }
            ToTransportMsg::ToDeviceRpcRequest(request) => (
                GATEWAY_RPC_TOPIC,
                json!({"device": device_name, "data": rpc_request_json(request)}),
            ),
            ToTransportMsg::ToServerRpcResponse(_) | ToTransportMsg::SessionClose { .. } => {
                return None
            }
        };
        Some((topic.to_string(), Bytes::from(body.to_string())))
    }
}

/// Claim body shared by device and gateway topics.
pub fn claim_from_json(device_id: Uuid, body: &Value) -> ClaimDeviceMsg {
    ClaimDeviceMsg {
        device_id,
        secret_key: body
            .get("secretKey")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        duration_ms: body.get("durationMs").and_then(Value::as_i64).unwrap_or(0),
    }
}

fn attribute_update_json(update: &AttributeUpdateNotificationMsg) -> Value {
    let mut body = kv_object(&update.shared_updated);
    if !update.shared_deleted.is_empty() {
        body.insert("deleted".into(), json!(update.shared_deleted));
    }
    Value::Object(body)
}

fn attribute_response_json(response: &GetAttributeResponseMsg) -> Value {
    if let Some(error) = &response.error {
        return json!({ "error": error });
    }
    let mut body = Map::new();
    if !response.client_attributes.is_empty() {
        body.insert("client".into(), Value::Object(kv_object(&response.client_attributes)));
    }
    if !response.shared_attributes.is_empty() {
        body.insert("shared".into(), Value::Object(kv_object(&response.shared_attributes)));
    }
    Value::Object(body)
}

fn rpc_request_json(request: &ToDeviceRpcRequestMsg) -> Value {
    let params = serde_json::from_str(&request.params)
        .unwrap_or_else(|_| Value::String(request.params.clone()));
    json!({"id": request.request_id, "method": request.method_name, "params": params})
}

fn rpc_response_bytes(response: &ToServerRpcResponseMsg) -> Bytes {
    match &response.error {
        Some(error) => Bytes::from(json!({ "error": error }).to_string()),
        None => Bytes::from(response.payload.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADAPTOR: JsonMqttAdaptor = JsonMqttAdaptor;

    #[test]
    fn test_telemetry_flat_object() {
        let msg = ADAPTOR
            .convert_to_post_telemetry(br#"{"temperature":42,"humidity":55.5,"on":true}"#)
            .unwrap();
        assert_eq!(msg.ts_kv_list.len(), 1);
        let kv = &msg.ts_kv_list[0].kv;
        assert!(kv.contains(&KeyValue::new("temperature", KvValue::Long(42))));
        assert!(kv.contains(&KeyValue::new("humidity", KvValue::Double(55.5))));
        assert!(kv.contains(&KeyValue::new("on", KvValue::Bool(true))));
        assert!(msg.ts_kv_list[0].ts > 0);
    }

    #[test]
    fn test_telemetry_with_timestamps() {
        let msg = ADAPTOR
            .convert_to_post_telemetry(
                br#"[{"ts":1000,"values":{"a":1}},{"ts":2000,"values":{"a":2,"cfg":{"x":1}}}]"#,
            )
            .unwrap();
        assert_eq!(msg.ts_kv_list.len(), 2);
        assert_eq!(msg.ts_kv_list[1].ts, 2000);
        assert!(msg.ts_kv_list[1]
            .kv
            .contains(&KeyValue::new("cfg", KvValue::Json("{\"x\":1}".into()))));
    }

    #[test]
    fn test_telemetry_rejects_garbage() {
        assert!(matches!(
            ADAPTOR.convert_to_post_telemetry(b"not json"),
            Err(AdaptorError::InvalidJson(_))
        ));
        assert!(matches!(
            ADAPTOR.convert_to_post_telemetry(b"42"),
            Err(AdaptorError::InvalidPayload(_))
        ));
        assert!(ADAPTOR.convert_to_post_telemetry(br#"{"a":null}"#).is_err());
    }

    #[test]
    fn test_get_attributes_request() {
        let msg = ADAPTOR
            .convert_to_get_attributes(
                "v1/devices/me/attributes/request/7",
                br#"{"clientKeys":"a, b","sharedKeys":"c"}"#,
            )
            .unwrap();
        assert_eq!(msg.request_id, 7);
        assert_eq!(msg.client_keys, vec!["a", "b"]);
        assert_eq!(msg.shared_keys, vec!["c"]);
    }

    #[test]
    fn test_bad_request_id() {
        let result = ADAPTOR.convert_to_get_attributes("v1/devices/me/attributes/request/x", b"");
        assert!(matches!(result, Err(AdaptorError::InvalidRequestId(_))));
    }

    #[test]
    fn test_server_rpc_request() {
        let msg = ADAPTOR
            .convert_to_server_rpc_request(
                "v1/devices/me/rpc/request/3",
                br#"{"method":"getTime","params":{}}"#,
            )
            .unwrap();
        assert_eq!(msg.request_id, 3);
        assert_eq!(msg.method_name, "getTime");
        assert_eq!(msg.params, "{}");
    }

    #[test]
    fn test_claim_defaults() {
        let id = Uuid::new_v4();
        let msg = ADAPTOR.convert_to_claim_device(id, b"").unwrap();
        assert_eq!(msg.device_id, id);
        assert_eq!(msg.secret_key, "");
        assert_eq!(msg.duration_ms, 0);
    }

    #[test]
    fn test_outbound_rpc_request_topic() {
        let (topic, payload) = ADAPTOR
            .convert_to_publish(&ToTransportMsg::ToDeviceRpcRequest(ToDeviceRpcRequestMsg {
                request_id: 12,
                method_name: "reboot".into(),
                params: "{\"delay\":5}".into(),
            }))
            .unwrap();
        assert_eq!(topic, "v1/devices/me/rpc/request/12");
        let body: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(body["method"], "reboot");
        assert_eq!(body["params"]["delay"], 5);
    }

    #[test]
    fn test_outbound_attribute_update_with_deletes() {
        let (topic, payload) = ADAPTOR
            .convert_to_publish(&ToTransportMsg::AttributeUpdate(AttributeUpdateNotificationMsg {
                shared_updated: vec![KeyValue::new("fw", KvValue::Str("1.2".into()))],
                shared_deleted: vec!["old".into()],
            }))
            .unwrap();
        assert_eq!(topic, DEVICE_ATTRIBUTES_TOPIC);
        let body: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(body, json!({"fw": "1.2", "deleted": ["old"]}));
    }

    #[test]
    fn test_gateway_attribute_response_single_value() {
        let (topic, payload) = ADAPTOR
            .convert_to_gateway_publish(
                "child-1",
                &ToTransportMsg::GetAttributesResponse(GetAttributeResponseMsg {
                    request_id: 4,
                    client_attributes: vec![],
                    shared_attributes: vec![KeyValue::new("mode", KvValue::Str("eco".into()))],
                    error: None,
                }),
            )
            .unwrap();
        assert_eq!(topic, GATEWAY_ATTRIBUTES_RESPONSE_TOPIC);
        let body: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(body, json!({"id": 4, "device": "child-1", "value": "eco"}));
    }

    #[test]
    fn test_session_close_has_no_wire_form() {
        let msg = ToTransportMsg::SessionClose {
            message: "expired".into(),
        };
        assert!(ADAPTOR.convert_to_publish(&msg).is_none());
        assert!(ADAPTOR.convert_to_gateway_publish("d", &msg).is_none());
    }
}
