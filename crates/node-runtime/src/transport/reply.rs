//! Routes device actor replies to the node holding the session.

use super::SessionRegistry;
use crate::actors::ReplySink;
use crate::rpc::ClusterRpcClient;
use shared_types::{DeviceToTransportMsg, SessionInfo, ToTransportMsg};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// [`ReplySink`] that delivers in process when the session is ours and over
/// cluster RPC otherwise.
///
/// Remote replies go through one forwarding task so a session sees them in
/// the order the actor produced them.
pub struct SessionReplyRouter {
    node_id: String,
    sessions: Arc<SessionRegistry>,
    outbound: mpsc::UnboundedSender<(String, DeviceToTransportMsg)>,
}

impl SessionReplyRouter {
    /// Starts the forwarding task. Must be called inside a runtime.
    pub fn start(node_id: String, sessions: Arc<SessionRegistry>, rpc: Arc<ClusterRpcClient>) -> Self {
        let (outbound, mut queue) = mpsc::unbounded_channel::<(String, DeviceToTransportMsg)>();
        tokio::spawn(async move {
            while let Some((target, reply)) = queue.recv().await {
                if let Err(e) = rpc.send_reply(&target, reply).await {
                    warn!(node = %target, "[tg-02] Failed to forward session reply: {}", e);
                }
            }
        });
        Self {
            node_id,
            sessions,
            outbound,
        }
    }
}

impl ReplySink for SessionReplyRouter {
    fn deliver(&self, session: &SessionInfo, msg: ToTransportMsg) {
        let reply = DeviceToTransportMsg {
            session_id: session.session_id,
            device_id: session.device_id,
            msg,
        };
        if session.node_id == self.node_id {
            if !self.sessions.deliver(reply) {
                debug!(session = %session.session_id, "[tg-02] Reply for closed session dropped");
            }
            return;
        }
        if self.outbound.send((session.node_id.clone(), reply)).is_err() {
            warn!(session = %session.session_id, "[tg-02] Reply forwarder stopped");
        }
    }
}
