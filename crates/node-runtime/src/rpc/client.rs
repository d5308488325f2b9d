//! Outbound cluster RPC with one cached connection per peer.

use super::{RpcCodec, RpcError, RpcMessage};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::SinkExt;
use shared_types::{DeviceToTransportMsg, ServerAddress, TransportToDeviceMsg};
use std::sync::Arc;
use std::time::Duration;
use tg_01_cluster_routing::{RemoteSender, RoutingError};
use tg_telemetry::CLUSTER_RPC_MESSAGES;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

type Connection = Arc<Mutex<Framed<TcpStream, RpcCodec>>>;

/// Sends [`RpcMessage`]s to peers, keyed by `host:port`.
///
/// A connection is opened on first use and dropped after a failed write;
/// the next send reconnects. Messages are never retried.
pub struct ClusterRpcClient {
    connections: DashMap<String, Connection>,
    connect_timeout: Duration,
}

impl ClusterRpcClient {
    /// Client giving up on connects after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            connect_timeout,
        }
    }

    /// Sends a session reply to the node with id `node_id`.
    pub async fn send_reply(&self, node_id: &str, msg: DeviceToTransportMsg) -> Result<(), RpcError> {
        self.send_to(node_id, RpcMessage::ToTransport(msg)).await
    }

    /// Sends `msg` to the peer at `target` (`host:port`).
    pub async fn send_to(&self, target: &str, msg: RpcMessage) -> Result<(), RpcError> {
        let result = self.write(target, msg).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        CLUSTER_RPC_MESSAGES
            .with_label_values(&["sent", outcome])
            .inc();
        result
    }

    /// Open peer connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    async fn write(&self, target: &str, msg: RpcMessage) -> Result<(), RpcError> {
        let connection = self.connection(target).await?;
        let mut framed = connection.lock().await;
        if let Err(e) = framed.send(msg).await {
            warn!(peer = %target, "[tg-01] Dropping cluster connection: {}", e);
            drop(framed);
            self.connections
                .remove_if(target, |_, cached| Arc::ptr_eq(cached, &connection));
            return Err(e);
        }
        Ok(())
    }

    async fn connection(&self, target: &str) -> Result<Connection, RpcError> {
        if let Some(cached) = self.connections.get(target) {
            return Ok(cached.clone());
        }
        if target.rsplit_once(':').is_none() {
            return Err(RpcError::InvalidAddress(target.to_string()));
        }
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| RpcError::ConnectTimeout(target.to_string()))??;
        stream.set_nodelay(true)?;
        debug!(peer = %target, "[tg-01] Cluster connection established");

        // A racing connect may have won. Keep whichever landed first.
        let connection = self
            .connections
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Framed::new(stream, RpcCodec::default()))))
            .clone();
        Ok(connection)
    }
}

#[async_trait]
impl RemoteSender for ClusterRpcClient {
    async fn send(&self, address: &ServerAddress, msg: TransportToDeviceMsg) -> Result<(), RoutingError> {
        let target = format!("{}:{}", address.host, address.port);
        self.send_to(&target, RpcMessage::ToDevice(msg))
            .await
            .map_err(|e| RoutingError::RemoteSend {
                address: address.clone(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use shared_types::{ServerType, ToTransportMsg};
    use tokio::net::TcpListener;
    use uuid::Uuid;

    fn close(session: u128) -> DeviceToTransportMsg {
        DeviceToTransportMsg {
            session_id: Uuid::from_u128(session),
            device_id: Uuid::from_u128(7),
            msg: ToTransportMsg::SessionClose {
                message: "moved".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_messages_share_one_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap().to_string();
        let client = ClusterRpcClient::new(Duration::from_secs(1));

        client.send_reply(&target, close(1)).await.unwrap();
        client.send_reply(&target, close(2)).await.unwrap();
        assert_eq!(client.connection_count(), 1);

        let (socket, _) = listener.accept().await.unwrap();
        let mut frames = Framed::new(socket, RpcCodec::default());
        assert_eq!(
            frames.next().await.unwrap().unwrap(),
            RpcMessage::ToTransport(close(1))
        );
        assert_eq!(
            frames.next().await.unwrap().unwrap(),
            RpcMessage::ToTransport(close(2))
        );
    }

    #[tokio::test]
    async fn test_unreachable_peer_maps_to_routing_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ClusterRpcClient::new(Duration::from_secs(1));
        let address = ServerAddress::new("127.0.0.1", port, ServerType::Core);
        let envelope = TransportToDeviceMsg::new(
            shared_types::SessionInfo::for_device(
                "n1",
                &shared_types::DeviceInfo {
                    tenant_id: Uuid::nil(),
                    customer_id: None,
                    device_id: Uuid::from_u128(3),
                    device_name: "d".into(),
                    device_type: "default".into(),
                    kind: shared_types::DeviceKind::Standard,
                },
            ),
            shared_types::TransportPayload::SessionEvent(shared_types::SessionEvent::Open),
        );

        let err = client.send(&address, envelope).await.unwrap_err();
        assert!(matches!(err, RoutingError::RemoteSend { address: a, .. } if a == address));
        assert_eq!(client.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_node_id() {
        let client = ClusterRpcClient::new(Duration::from_secs(1));
        assert!(matches!(
            client.send_reply("no-port", close(1)).await,
            Err(RpcError::InvalidAddress(_))
        ));
    }
}
