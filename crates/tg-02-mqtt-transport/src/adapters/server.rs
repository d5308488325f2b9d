//! # MQTT Transport Server
//!
//! Accept loop plus one task per connection. Each connection task owns a
//! framed socket and its session handler and multiplexes three sources:
//!
//! - inbound frames from the device
//! - device bound messages from the session registry
//! - the keep alive deadline, 1.5x the negotiated keep alive
//!
//! Whatever ends the loop, the handler is told the transport closed so the
//! session is deregistered exactly once.

use crate::codec::{MqttCodec, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::domain::{ProtocolError, Reaction};
use crate::handler::MqttSessionHandler;
use crate::ports::{PacketHandler, TransportService};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Default time a client has to send CONNECT.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Listener settings.
#[derive(Debug, Clone)]
pub struct MqttServerConfig {
    /// Largest accepted packet body.
    pub max_payload_size: usize,
    /// Time allowed between accept and CONNECT.
    pub connect_timeout: Duration,
}

impl Default for MqttServerConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// MQTT listener for one node.
pub struct MqttTransportServer {
    node_id: String,
    transport: Arc<dyn TransportService>,
    config: MqttServerConfig,
    active: AtomicUsize,
}

struct ConnectionGuard<'a>(&'a AtomicUsize);

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl MqttTransportServer {
    /// Server handing sessions to `transport`.
    pub fn new(
        node_id: impl Into<String>,
        transport: Arc<dyn TransportService>,
        config: MqttServerConfig,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            transport,
            config,
            active: AtomicUsize::new(0),
        }
    }

    /// Connections currently open.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Accepts connections until the task is aborted.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!("[tg-02] MQTT transport listening on {}", addr);
        }
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("[tg-02] Accept error: {}", e);
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!("[tg-02] Failed to set TCP_NODELAY for {}: {}", peer, e);
            }
            let server = self.clone();
            tokio::spawn(async move {
                server.serve_connection(stream, peer).await;
            });
        }
    }

    /// Drives one connection to completion.
    pub async fn serve_connection<S>(&self, stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.serve_connection_with_certificate(stream, peer, None)
            .await
    }

    /// Drives one connection whose TLS layer presented `peer_certificate`
    /// (DER). With a certificate, CONNECT authenticates by its fingerprint
    /// and the username is ignored.
    pub async fn serve_connection_with_certificate<S>(
        &self,
        stream: S,
        peer: SocketAddr,
        peer_certificate: Option<Vec<u8>>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.active.fetch_add(1, Ordering::Relaxed);
        let _guard = ConnectionGuard(&self.active);

        let (tx, mut commands) = mpsc::unbounded_channel();
        let mut handler = MqttSessionHandler::new(self.node_id.clone(), self.transport.clone(), tx);
        if let Some(der) = peer_certificate {
            handler = handler.with_peer_certificate(der);
        }
        let mut framed = Framed::new(stream, MqttCodec::new(self.config.max_payload_size));
        let mut deadline = Some(Instant::now() + self.config.connect_timeout);
        debug!("[tg-02] [{}] Connection from {}", handler.session_id(), peer);

        loop {
            let idle_at = deadline;
            let idle = async move {
                match idle_at {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };
            let reaction = tokio::select! {
                frame = framed.next() => match frame {
                    Some(Ok(packet)) => {
                        let reaction = handler.on_packet(packet).await;
                        deadline = handler
                            .keep_alive()
                            .map(|keep_alive| Instant::now() + keep_alive + keep_alive / 2);
                        reaction
                    }
                    Some(Err(e)) => {
                        info!("[tg-02] [{}] Invalid message from {}: {}", handler.session_id(), peer, e);
                        break;
                    }
                    None => break,
                },
                Some(command) = commands.recv() => handler.on_command(command).await,
                _ = idle => {
                    info!("[tg-02] [{}] Keep alive expired for {}", handler.session_id(), peer);
                    break;
                }
            };
            match write_reaction(&mut framed, reaction).await {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    debug!("[tg-02] [{}] Write to {} failed: {}", handler.session_id(), peer, e);
                    break;
                }
            }
        }

        handler.on_transport_closed().await;
        debug!("[tg-02] [{}] Connection from {} closed", handler.session_id(), peer);
    }
}

/// Writes the reaction's packets. `Ok(false)` when the connection must close.
async fn write_reaction<S>(
    framed: &mut Framed<S, MqttCodec>,
    reaction: Reaction,
) -> Result<bool, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Reaction { packets, close } = reaction;
    for packet in packets {
        framed.feed(packet).await?;
    }
    framed.flush().await?;
    Ok(!close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectPacket, ConnectReturnCode, Packet, PublishPacket, QoS};
    use crate::handler::certificate_fingerprint;
    use crate::ports::MockTransportService;
    use bytes::Bytes;
    use shared_types::{
        DeviceInfo, DeviceKind, DeviceToTransportMsg, ToDeviceRpcRequestMsg, ToTransportMsg,
    };
    use uuid::Uuid;

    const TOKEN: &str = "DEVICE_TOKEN";

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn mock() -> Arc<MockTransportService> {
        Arc::new(MockTransportService::with_token(
            TOKEN,
            DeviceInfo {
                tenant_id: Uuid::new_v4(),
                customer_id: None,
                device_id: Uuid::new_v4(),
                device_name: "meter-7".into(),
                device_type: "meter".into(),
                kind: DeviceKind::Standard,
            },
        ))
    }

    fn connect(keep_alive: u16) -> Packet {
        Packet::Connect(ConnectPacket {
            client_id: "meter-7".into(),
            keep_alive,
            clean_session: true,
            username: Some(TOKEN.into()),
            password: None,
        })
    }

    #[tokio::test]
    async fn test_connect_publish_and_push() {
        let mock = mock();
        let server = Arc::new(MqttTransportServer::new(
            "node-a",
            mock.clone(),
            MqttServerConfig::default(),
        ));
        let (client, server_side) = tokio::io::duplex(4096);
        let task = {
            let server = server.clone();
            tokio::spawn(async move { server.serve_connection(server_side, peer()).await })
        };
        let mut client = Framed::new(client, MqttCodec::default());

        client.send(connect(60)).await.unwrap();
        assert_eq!(
            client.next().await.unwrap().unwrap(),
            Packet::connack(ConnectReturnCode::Accepted)
        );

        client
            .send(Packet::Publish(PublishPacket {
                topic: "v1/devices/me/telemetry".into(),
                qos: QoS::AtLeastOnce,
                packet_id: Some(5),
                dup: false,
                retain: false,
                payload: Bytes::from_static(br#"{"power":12.5}"#),
            }))
            .await
            .unwrap();
        assert_eq!(client.next().await.unwrap().unwrap(), Packet::PubAck(5));
        assert_eq!(server.active_connections(), 1);

        let (session_id, listener) = {
            let sessions = mock.sessions.lock();
            let (id, tx) = sessions.iter().next().unwrap();
            (*id, tx.clone())
        };
        listener
            .send(DeviceToTransportMsg {
                session_id,
                device_id: Uuid::new_v4(),
                msg: ToTransportMsg::ToDeviceRpcRequest(ToDeviceRpcRequestMsg {
                    request_id: 1,
                    method_name: "setPower".into(),
                    params: "{\"on\":false}".into(),
                }),
            })
            .unwrap();
        match client.next().await.unwrap().unwrap() {
            Packet::Publish(p) => {
                assert_eq!(p.topic, "v1/devices/me/rpc/request/1");
                assert_eq!(p.qos, QoS::AtLeastOnce);
                assert_eq!(p.packet_id, Some(1));
            }
            other => panic!("unexpected packet {other:?}"),
        }

        client.send(Packet::Disconnect).await.unwrap();
        task.await.unwrap();
        assert_eq!(server.active_connections(), 0);
        assert_eq!(*mock.deregistered.lock(), vec![session_id]);
    }

    #[tokio::test]
    async fn test_client_drop_deregisters() {
        let mock = mock();
        let server = MqttTransportServer::new("node-a", mock.clone(), MqttServerConfig::default());
        let (client, server_side) = tokio::io::duplex(4096);
        let mut client = Framed::new(client, MqttCodec::default());

        let serve = server.serve_connection(server_side, peer());
        let drive = async move {
            client.send(connect(0)).await.unwrap();
            client.next().await.unwrap().unwrap();
            drop(client);
        };
        tokio::join!(serve, drive);

        assert_eq!(mock.deregistered.lock().len(), 1);
        assert_eq!(mock.processed_kinds(), vec!["session_event", "session_event"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_expiry_closes() {
        let mock = mock();
        let server = MqttTransportServer::new("node-a", mock.clone(), MqttServerConfig::default());
        let (client, server_side) = tokio::io::duplex(4096);
        let mut client = Framed::new(client, MqttCodec::default());

        let serve = server.serve_connection(server_side, peer());
        let drive = async move {
            client.send(connect(2)).await.unwrap();
            client.next().await.unwrap().unwrap();
            // Silent client: the server gives up after 3s.
            assert!(client.next().await.is_none());
        };
        tokio::join!(serve, drive);

        assert_eq!(mock.deregistered.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_certificate_connect_without_username() {
        let der = b"client-certificate-der".to_vec();
        let mock = Arc::new(MockTransportService::default());
        mock.certificates.lock().insert(
            certificate_fingerprint(&der),
            DeviceInfo {
                tenant_id: Uuid::new_v4(),
                customer_id: None,
                device_id: Uuid::new_v4(),
                device_name: "camera-2".into(),
                device_type: "camera".into(),
                kind: DeviceKind::Standard,
            },
        );
        let server = MqttTransportServer::new("node-a", mock.clone(), MqttServerConfig::default());
        let (client, server_side) = tokio::io::duplex(4096);
        let mut client = Framed::new(client, MqttCodec::default());

        let serve = server.serve_connection_with_certificate(server_side, peer(), Some(der));
        let drive = async move {
            client
                .send(Packet::Connect(ConnectPacket {
                    client_id: "camera-2".into(),
                    keep_alive: 0,
                    clean_session: true,
                    username: None,
                    password: None,
                }))
                .await
                .unwrap();
            let connack = client.next().await.unwrap().unwrap();
            client.send(Packet::Disconnect).await.unwrap();
            connack
        };
        let ((), connack) = tokio::join!(serve, drive);

        assert_eq!(connack, Packet::connack(ConnectReturnCode::Accepted));
        assert_eq!(mock.deregistered.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_no_certificate_and_no_username_is_refused() {
        let mock = mock();
        let server = MqttTransportServer::new("node-a", mock.clone(), MqttServerConfig::default());
        let (client, server_side) = tokio::io::duplex(4096);
        let mut client = Framed::new(client, MqttCodec::default());

        let serve = server.serve_connection(server_side, peer());
        let drive = async move {
            client
                .send(Packet::Connect(ConnectPacket {
                    client_id: "anonymous".into(),
                    keep_alive: 0,
                    clean_session: true,
                    username: None,
                    password: None,
                }))
                .await
                .unwrap();
            client.next().await.unwrap().unwrap()
        };
        let ((), connack) = tokio::join!(serve, drive);

        assert_ne!(connack, Packet::connack(ConnectReturnCode::Accepted));
        assert!(mock.sessions.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let mock = mock();
        let server = MqttTransportServer::new("node-a", mock.clone(), MqttServerConfig::default());
        let (client, server_side) = tokio::io::duplex(4096);
        let mut client = Framed::new(client, MqttCodec::default());

        let serve = server.serve_connection(server_side, peer());
        let drive = async move {
            assert!(client.next().await.is_none());
        };
        tokio::join!(serve, drive);

        assert!(mock.sessions.lock().is_empty());
        assert!(mock.deregistered.lock().is_empty());
    }
}
