//! Inbound cluster RPC.

use super::{RpcCodec, RpcMessage};
use crate::actors::DeviceActorSystem;
use crate::transport::SessionRegistry;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tg_telemetry::CLUSTER_RPC_MESSAGES;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

/// Accepts peer connections and hands their frames to the local owners.
pub struct ClusterRpcServer {
    actors: Arc<DeviceActorSystem>,
    sessions: Arc<SessionRegistry>,
}

impl ClusterRpcServer {
    /// Server delivering to `actors` and `sessions`.
    pub fn new(actors: Arc<DeviceActorSystem>, sessions: Arc<SessionRegistry>) -> Self {
        Self { actors, sessions }
    }

    /// Accept loop. Runs until the task is aborted.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!("[tg-01] Cluster RPC listening on {}", addr);
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = self.clone();
                    tokio::spawn(async move { server.serve_peer(stream, peer).await });
                }
                Err(e) => warn!("[tg-01] Cluster RPC accept failed: {}", e),
            }
        }
    }

    async fn serve_peer(&self, stream: TcpStream, peer: SocketAddr) {
        debug!(%peer, "[tg-01] Cluster peer connected");
        let mut frames = FramedRead::new(stream, RpcCodec::default());
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(msg) => {
                    CLUSTER_RPC_MESSAGES
                        .with_label_values(&["received", "ok"])
                        .inc();
                    self.handle(msg);
                }
                Err(e) => {
                    CLUSTER_RPC_MESSAGES
                        .with_label_values(&["received", "error"])
                        .inc();
                    warn!(%peer, "[tg-01] Closing cluster connection: {}", e);
                    break;
                }
            }
        }
        debug!(%peer, "[tg-01] Cluster peer disconnected");
    }

    fn handle(&self, msg: RpcMessage) {
        match msg {
            RpcMessage::ToDevice(envelope) => {
                let device_id = envelope.session_info.device_id;
                if let Err(e) = self.actors.dispatch(envelope) {
                    warn!(device = %device_id, "[tg-01] Remote envelope not delivered: {}", e);
                }
            }
            RpcMessage::ToTransport(reply) => {
                let session_id = reply.session_id;
                if !self.sessions.deliver(reply) {
                    debug!(session = %session_id, "[tg-01] Reply for unknown session dropped");
                }
            }
        }
    }
}
