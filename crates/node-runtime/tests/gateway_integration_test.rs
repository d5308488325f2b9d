//! # Gateway Integration Tests
//!
//! Drives complete nodes through their real listeners.
//!
//! ## Test Strategy
//!
//! - MQTT clients speak the wire protocol through `MqttCodec`
//! - HTTP calls are plain HTTP/1.1 over a TCP stream
//! - Persistence lands in a `LatestValueStore` the test can inspect
//! - Two-node tests point the nodes at each other's RPC listener

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use node_runtime::config::ApiUserEntry;
use node_runtime::credentials::DeviceCredentialEntry;
use node_runtime::{LatestValueStore, NodeConfig, NodeRuntime};
use serde_json::{json, Value};
use shared_types::{Authority, EntityId, KvValue, ServerType};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tg_01_cluster_routing::ClusterRoutingApi;
use tg_02_mqtt_transport::domain::{ConnectPacket, PublishPacket};
use tg_02_mqtt_transport::{ConnectReturnCode, MqttCodec, Packet, QoS};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use uuid::Uuid;

const TENANT: Uuid = Uuid::from_u128(1);
const DEVICE: Uuid = Uuid::from_u128(10);
const TOKEN: &str = "A1_TEST_TOKEN";
const ADMIN_KEY: &str = "admin-key";
const WAIT: Duration = Duration::from_secs(5);

type Client = Framed<TcpStream, MqttCodec>;

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn base_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.rpc.bind = loopback();
    config.transport.mqtt_bind = loopback();
    config.api.bind = loopback();
    config.api.rpc_timeout_ms = 2_000;
    config.api.users = vec![ApiUserEntry {
        api_key: ADMIN_KEY.into(),
        user_id: Uuid::from_u128(100),
        tenant_id: TENANT,
        customer_id: None,
        authority: Authority::TenantAdmin,
    }];
    config.queues.max_delay_ms = 10;
    config.queues.batch_threads = 2;
    config
}

fn device_entry(device_id: Uuid, token: &str) -> DeviceCredentialEntry {
    DeviceCredentialEntry {
        name: format!("device-{}", device_id.as_u128()),
        device_type: "thermostat".into(),
        tenant_id: TENANT,
        customer_id: None,
        device_id: Some(device_id),
        access_token: Some(token.into()),
        certificate_fingerprint: None,
        gateway: false,
    }
}

async fn start_node(config: NodeConfig) -> (NodeRuntime, Arc<LatestValueStore>) {
    let store = Arc::new(LatestValueStore::new());
    let node = NodeRuntime::start(config, store.clone(), store.clone())
        .await
        .expect("node starts");
    (node, store)
}

async fn next_packet(client: &mut Client) -> Packet {
    timeout(WAIT, client.next())
        .await
        .expect("packet within timeout")
        .expect("stream open")
        .expect("valid packet")
}

async fn connect(addr: SocketAddr, token: &str) -> (Client, ConnectReturnCode) {
    let stream = TcpStream::connect(addr).await.expect("mqtt connect");
    let mut client = Framed::new(stream, MqttCodec::new(64 * 1024));
    client
        .send(Packet::Connect(ConnectPacket {
            client_id: "it-client".into(),
            keep_alive: 60,
            clean_session: true,
            username: Some(token.into()),
            password: None,
        }))
        .await
        .expect("send CONNECT");
    match next_packet(&mut client).await {
        Packet::ConnAck { code, .. } => (client, code),
        other => panic!("expected CONNACK, got {}", other.name()),
    }
}

async fn publish(client: &mut Client, topic: &str, packet_id: u16, payload: Value) {
    client
        .send(Packet::Publish(PublishPacket {
            topic: topic.into(),
            qos: QoS::AtLeastOnce,
            packet_id: Some(packet_id),
            dup: false,
            retain: false,
            payload: Bytes::from(payload.to_string()),
        }))
        .await
        .expect("send PUBLISH");
}

async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

async fn http_post(addr: SocketAddr, path: &str, body: Value) -> (u16, Value) {
    let body = body.to_string();
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: {addr}\r\nX-Authorization: ApiKey {ADMIN_KEY}\r\n\
         Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let mut stream = TcpStream::connect(addr).await.expect("http connect");
    stream.write_all(request.as_bytes()).await.expect("write request");
    let mut raw = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut raw))
        .await
        .expect("response within timeout")
        .expect("read response");

    let text = String::from_utf8(raw).expect("utf-8 response");
    let (head, payload) = text.split_once("\r\n\r\n").expect("header terminator");
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status code");
    (status, serde_json::from_str(payload).unwrap_or(Value::Null))
}

/// Telemetry published over MQTT is acknowledged and reaches the writer.
#[tokio::test]
async fn test_telemetry_reaches_the_store() {
    // Arrange
    let mut config = base_config();
    config.devices = vec![device_entry(DEVICE, TOKEN)];
    let (node, store) = start_node(config).await;

    // Act
    let (mut client, code) = connect(node.addresses().mqtt, TOKEN).await;
    assert_eq!(code, ConnectReturnCode::Accepted);
    publish(&mut client, "v1/devices/me/telemetry", 5, json!({"temperature": 21.5})).await;

    // Assert
    assert_eq!(next_packet(&mut client).await, Packet::PubAck(5));
    assert!(eventually(|| store.latest_telemetry(DEVICE, "temperature").is_some()).await);
    let (_, value) = store.latest_telemetry(DEVICE, "temperature").unwrap();
    assert_eq!(value, KvValue::Double(21.5));
    assert_eq!(node.sessions().len(), 1);

    node.shutdown().await;
}

/// Unknown tokens are refused and no session is registered.
#[tokio::test]
async fn test_unknown_token_is_refused() {
    let (node, _store) = start_node(base_config()).await;

    let (_client, code) = connect(node.addresses().mqtt, "WRONG").await;

    assert_ne!(code, ConnectReturnCode::Accepted);
    assert!(node.sessions().is_empty());

    node.shutdown().await;
}

/// An HTTP RPC call reaches the subscribed device and returns its answer.
#[tokio::test]
async fn test_rpc_round_trip_over_http() {
    // Arrange
    let mut config = base_config();
    config.devices = vec![device_entry(DEVICE, TOKEN)];
    let (node, _store) = start_node(config).await;
    let (mut client, code) = connect(node.addresses().mqtt, TOKEN).await;
    assert_eq!(code, ConnectReturnCode::Accepted);
    client
        .send(Packet::Subscribe {
            packet_id: 1,
            topics: vec![("v1/devices/me/rpc/request/+".into(), QoS::AtLeastOnce)],
        })
        .await
        .unwrap();
    assert!(matches!(next_packet(&mut client).await, Packet::SubAck { packet_id: 1, .. }));

    // Act
    let api = node.addresses().api;
    let call = tokio::spawn(async move {
        http_post(
            api,
            &format!("/api/v1/devices/{DEVICE}/rpc"),
            json!({"method": "getState", "params": {"pin": 4}}),
        )
        .await
    });

    let request = match next_packet(&mut client).await {
        Packet::Publish(publish) => publish,
        other => panic!("expected PUBLISH, got {}", other.name()),
    };
    let request_id = request
        .topic
        .strip_prefix("v1/devices/me/rpc/request/")
        .expect("rpc request topic")
        .to_string();
    let body: Value = serde_json::from_slice(&request.payload).unwrap();
    assert_eq!(body["method"], "getState");
    assert_eq!(body["params"]["pin"], 4);
    if let Some(id) = request.packet_id {
        client.send(Packet::PubAck(id)).await.unwrap();
    }
    publish(
        &mut client,
        &format!("v1/devices/me/rpc/response/{request_id}"),
        2,
        json!({"state": "on"}),
    )
    .await;

    // Assert
    let (status, response) = call.await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(response, json!({"state": "on"}));

    node.shutdown().await;
}

/// RPC to a device without a subscription fails fast with a conflict.
#[tokio::test]
async fn test_rpc_without_subscription() {
    let mut config = base_config();
    config.devices = vec![device_entry(DEVICE, TOKEN)];
    let (node, _store) = start_node(config).await;
    let (_client, _) = connect(node.addresses().mqtt, TOKEN).await;
    assert!(eventually(|| node.actors().actor_count() == 1).await);

    let (status, _) = http_post(
        node.addresses().api,
        &format!("/api/v1/devices/{DEVICE}/rpc"),
        json!({"method": "reboot"}),
    )
    .await;

    assert_eq!(status, 409);
    node.shutdown().await;
}

/// Telemetry for a device owned by the other node is forwarded over
/// cluster RPC and persisted there.
#[tokio::test]
async fn test_two_nodes_forward_to_owner() {
    // Arrange
    let (owner, owner_store) = start_node(base_config()).await;
    let mut edge_config = base_config();
    edge_config.cluster.peers = vec![node_runtime::config::PeerConfig {
        host: "127.0.0.1".into(),
        port: owner.addresses().rpc.port(),
        server_type: ServerType::Core,
    }];
    let (edge, edge_store) = start_node(edge_config).await;

    let device = (1..10_000u128)
        .map(Uuid::from_u128)
        .find(|id| {
            edge.routing()
                .resolve(&EntityId::device(*id))
                .is_some_and(|owner_addr| owner_addr.port == owner.addresses().rpc.port())
        })
        .expect("some device lands on the owner");
    edge.credentials().insert(&device_entry(device, "REMOTE_TOKEN"));

    // Act
    let (mut client, code) = connect(edge.addresses().mqtt, "REMOTE_TOKEN").await;
    assert_eq!(code, ConnectReturnCode::Accepted);
    publish(&mut client, "v1/devices/me/telemetry", 7, json!({"humidity": 40})).await;

    // Assert
    assert_eq!(next_packet(&mut client).await, Packet::PubAck(7));
    assert!(eventually(|| owner_store.latest_telemetry(device, "humidity").is_some()).await);
    assert_eq!(
        owner_store.latest_telemetry(device, "humidity").unwrap().1,
        KvValue::Long(40)
    );
    assert!(edge_store.latest_telemetry(device, "humidity").is_none());
    assert_eq!(edge.actors().actor_count(), 0);
    assert_eq!(owner.actors().actor_count(), 1);
    assert_eq!(edge.sessions().len(), 1);

    edge.shutdown().await;
    owner.shutdown().await;
}
