//! Per-device worker.
//!
//! Owns the device's attributes, session subscriptions and pending RPC calls.
//! Nothing else touches that state: every change arrives as a
//! [`DeviceCommand`] on the actor's mailbox and is applied in order.

use super::ports::ReplySink;
use super::records::{AttributeRecord, AttributeScope, TsRecord};
use super::{now_millis, ActorError};
use futures::future::join_all;
use shared_types::{
    AttributeUpdateNotificationMsg, ClaimDeviceMsg, EntityId, GetAttributeRequestMsg, GetAttributeResponseMsg, KeyValue, KvValue,
    PostAttributeMsg, PostTelemetryMsg, SessionEvent, SessionInfo, SubscriptionInfoMsg,
    ToDeviceRpcRequestMsg, ToDeviceRpcResponseMsg, ToServerRpcRequestMsg, ToServerRpcResponseMsg,
    ToTransportMsg, TransportPayload, TransportToDeviceMsg,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tg_04_batch_queue::{CompletionHandle, PersistenceQueue};
use tg_telemetry::QUEUE_ITEMS;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Reply channel of an RPC call.
pub(crate) type RpcReply = oneshot::Sender<Result<String, ActorError>>;

/// Mailbox message.
pub(crate) enum DeviceCommand {
    /// Envelope produced by a session.
    Transport(TransportToDeviceMsg),
    /// Shared attributes set through the API.
    UpdateSharedAttributes(Vec<KeyValue>),
    /// Server side RPC call.
    Rpc {
        method_name: String,
        params: String,
        reply: RpcReply,
    },
    /// Claim attempt with the secret the device published.
    Claim {
        secret_key: String,
        reply: oneshot::Sender<Result<(), ActorError>>,
    },
}

/// Collaborators shared by every actor.
pub(crate) struct ActorContext {
    pub telemetry: Arc<dyn PersistenceQueue<TsRecord>>,
    pub attributes: Arc<dyn PersistenceQueue<AttributeRecord>>,
    pub replies: Arc<dyn ReplySink>,
}

#[derive(Debug, Clone)]
struct SessionSubscription {
    info: SessionInfo,
    attributes: bool,
    rpc: bool,
}

impl SessionSubscription {
    fn new(info: SessionInfo) -> Self {
        Self {
            info,
            attributes: false,
            rpc: false,
        }
    }
}

#[derive(Debug)]
struct ClaimRequest {
    secret_key: String,
    expires_at: i64,
}

pub(crate) struct DeviceActor {
    entity_id: EntityId,
    tenant_id: Uuid,
    client_attributes: BTreeMap<String, KvValue>,
    shared_attributes: BTreeMap<String, KvValue>,
    sessions: HashMap<Uuid, SessionSubscription>,
    pending_rpc: HashMap<i32, RpcReply>,
    next_rpc_id: i32,
    claim: Option<ClaimRequest>,
    ctx: Arc<ActorContext>,
}

impl DeviceActor {
    pub(crate) fn new(device_id: Uuid, tenant_id: Uuid, ctx: Arc<ActorContext>) -> Self {
        Self {
            entity_id: EntityId::device(device_id),
            tenant_id,
            client_attributes: BTreeMap::new(),
            shared_attributes: BTreeMap::new(),
            sessions: HashMap::new(),
            pending_rpc: HashMap::new(),
            next_rpc_id: 1,
            claim: None,
            ctx,
        }
    }

    pub(crate) async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<DeviceCommand>) {
        while let Some(command) = mailbox.recv().await {
            self.handle(command);
        }
        debug!(device = %self.entity_id, "[actors] Device actor stopped");
    }

    fn handle(&mut self, command: DeviceCommand) {
        match command {
            DeviceCommand::Transport(msg) => self.on_transport(msg),
            DeviceCommand::UpdateSharedAttributes(kv) => self.on_shared_update(kv),
            DeviceCommand::Rpc {
                method_name,
                params,
                reply,
            } => self.on_rpc_call(method_name, params, reply),
            DeviceCommand::Claim { secret_key, reply } => {
                let _ = reply.send(self.verify_claim(&secret_key));
            }
        }
    }

    fn on_transport(&mut self, msg: TransportToDeviceMsg) {
        let TransportToDeviceMsg {
            session_info,
            payload,
        } = msg;
        match payload {
            TransportPayload::SessionEvent(SessionEvent::Open) => {
                debug!(device = %self.entity_id, session = %session_info.session_id, "[actors] Session opened");
                self.sessions.insert(
                    session_info.session_id,
                    SessionSubscription::new(session_info),
                );
            }
            TransportPayload::SessionEvent(SessionEvent::Closed) => {
                debug!(device = %self.entity_id, session = %session_info.session_id, "[actors] Session closed");
                self.sessions.remove(&session_info.session_id);
            }
            TransportPayload::PostTelemetry(msg) => self.save_telemetry(msg),
            TransportPayload::PostAttributes(msg) => self.save_client_attributes(msg),
            TransportPayload::GetAttributes(request) => {
                self.reply_attributes(&session_info, request)
            }
            TransportPayload::SubscribeToAttributes(msg) => {
                self.session_mut(&session_info).attributes = !msg.unsubscribe;
            }
            TransportPayload::SubscribeToRpc(msg) => {
                self.session_mut(&session_info).rpc = !msg.unsubscribe;
            }
            TransportPayload::ToDeviceRpcResponse(response) => self.complete_rpc(response),
            TransportPayload::ToServerRpcRequest(request) => {
                self.reply_server_rpc(&session_info, request)
            }
            TransportPayload::ClaimDevice(claim) => self.register_claim(claim),
            TransportPayload::SubscriptionInfo(info) => {
                self.update_subscription(&session_info, info)
            }
        }
    }

    fn session_mut(&mut self, info: &SessionInfo) -> &mut SessionSubscription {
        self.sessions
            .entry(info.session_id)
            .or_insert_with(|| SessionSubscription::new(info.clone()))
    }

    fn save_telemetry(&mut self, msg: PostTelemetryMsg) {
        let handles: Vec<CompletionHandle> = msg
            .ts_kv_list
            .into_iter()
            .flat_map(|entry| {
                let ts = entry.ts;
                entry.kv.into_iter().map(move |kv| (ts, kv))
            })
            .map(|(ts, kv)| {
                self.ctx.telemetry.enqueue(TsRecord {
                    tenant_id: self.tenant_id,
                    entity_id: self.entity_id,
                    ts,
                    kv,
                })
            })
            .collect();
        track_completion("timeseries", handles);
    }

    fn save_client_attributes(&mut self, msg: PostAttributeMsg) {
        let now = now_millis();
        let mut handles = Vec::with_capacity(msg.kv.len());
        for kv in msg.kv {
            self.client_attributes
                .insert(kv.key.clone(), kv.value.clone());
            handles.push(self.ctx.attributes.enqueue(AttributeRecord {
                tenant_id: self.tenant_id,
                entity_id: self.entity_id,
                scope: AttributeScope::Client,
                kv,
                last_update_ts: now,
            }));
        }
        track_completion("attributes", handles);
    }

    fn on_shared_update(&mut self, kv: Vec<KeyValue>) {
        let now = now_millis();
        let mut handles = Vec::with_capacity(kv.len());
        for item in &kv {
            self.shared_attributes
                .insert(item.key.clone(), item.value.clone());
            handles.push(self.ctx.attributes.enqueue(AttributeRecord {
                tenant_id: self.tenant_id,
                entity_id: self.entity_id,
                scope: AttributeScope::Shared,
                kv: item.clone(),
                last_update_ts: now,
            }));
        }
        track_completion("attributes", handles);

        let notification = ToTransportMsg::AttributeUpdate(AttributeUpdateNotificationMsg {
            shared_updated: kv,
            shared_deleted: Vec::new(),
        });
        for session in self.sessions.values().filter(|s| s.attributes) {
            self.ctx.replies.deliver(&session.info, notification.clone());
        }
    }

    fn reply_attributes(&mut self, session: &SessionInfo, request: GetAttributeRequestMsg) {
        let everything = request.client_keys.is_empty() && request.shared_keys.is_empty();
        let pick = |source: &BTreeMap<String, KvValue>, keys: &[String]| -> Vec<KeyValue> {
            if everything {
                source
                    .iter()
                    .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
                    .collect()
            } else {
                keys.iter()
                    .filter_map(|k| source.get(k).map(|v| KeyValue::new(k.clone(), v.clone())))
                    .collect()
            }
        };
        let response = GetAttributeResponseMsg {
            request_id: request.request_id,
            client_attributes: pick(&self.client_attributes, &request.client_keys),
            shared_attributes: pick(&self.shared_attributes, &request.shared_keys),
            error: None,
        };
        self.ctx
            .replies
            .deliver(session, ToTransportMsg::GetAttributesResponse(response));
    }

    fn reply_server_rpc(&mut self, session: &SessionInfo, request: ToServerRpcRequestMsg) {
        debug!(device = %self.entity_id, method = %request.method_name, "[actors] Server RPC without handler");
        let response = ToServerRpcResponseMsg {
            request_id: request.request_id,
            payload: String::new(),
            error: Some(format!("No handler for method '{}'", request.method_name)),
        };
        self.ctx
            .replies
            .deliver(session, ToTransportMsg::ToServerRpcResponse(response));
    }

    fn register_claim(&mut self, claim: ClaimDeviceMsg) {
        let expires_at = if claim.duration_ms > 0 {
            now_millis().saturating_add(claim.duration_ms)
        } else {
            0
        };
        info!(device = %self.entity_id, expires_at, "[actors] Device claim registered");
        self.claim = Some(ClaimRequest {
            secret_key: claim.secret_key,
            expires_at,
        });
    }

    fn update_subscription(&mut self, session: &SessionInfo, info: SubscriptionInfoMsg) {
        let entry = self.session_mut(session);
        entry.attributes = info.attribute_subscription;
        entry.rpc = info.rpc_subscription;
    }

    /// A claim succeeds once, with the published secret, before it expires.
    fn verify_claim(&mut self, secret_key: &str) -> Result<(), ActorError> {
        let device_id = self.entity_id.id;
        let (expired, secret_matches) = match &self.claim {
            Some(claim) => (
                claim.expires_at != 0 && claim.expires_at < now_millis(),
                claim.secret_key == secret_key,
            ),
            None => return Err(ActorError::ClaimRejected(device_id, "no claim request")),
        };
        if expired {
            self.claim = None;
            return Err(ActorError::ClaimRejected(device_id, "claim request expired"));
        }
        if !secret_matches {
            return Err(ActorError::ClaimRejected(device_id, "secret key mismatch"));
        }
        self.claim = None;
        info!(device = %self.entity_id, "[actors] Device claimed");
        Ok(())
    }

    fn on_rpc_call(&mut self, method_name: String, params: String, reply: RpcReply) {
        self.pending_rpc.retain(|_, waiting| !waiting.is_closed());

        let targets: Vec<SessionInfo> = self
            .sessions
            .values()
            .filter(|s| s.rpc)
            .map(|s| s.info.clone())
            .collect();
        if targets.is_empty() {
            let _ = reply.send(Err(ActorError::NotSubscribed(self.entity_id.id)));
            return;
        }

        let request_id = self.next_rpc_id;
        self.next_rpc_id = if request_id == i32::MAX { 1 } else { request_id + 1 };
        self.pending_rpc.insert(request_id, reply);

        let request = ToTransportMsg::ToDeviceRpcRequest(ToDeviceRpcRequestMsg {
            request_id,
            method_name,
            params,
        });
        for session in &targets {
            self.ctx.replies.deliver(session, request.clone());
        }
    }

    fn complete_rpc(&mut self, response: ToDeviceRpcResponseMsg) {
        match self.pending_rpc.remove(&response.request_id) {
            Some(waiting) => {
                let _ = waiting.send(Ok(response.payload));
            }
            None => debug!(
                device = %self.entity_id,
                request_id = response.request_id,
                "[actors] RPC response without pending call"
            ),
        }
    }
}

/// Counts queue outcomes once every handle resolved.
fn track_completion(queue: &'static str, handles: Vec<CompletionHandle>) {
    if handles.is_empty() {
        return;
    }
    QUEUE_ITEMS
        .with_label_values(&[queue, "added"])
        .inc_by(handles.len() as u64);
    tokio::spawn(async move {
        let mut saved = 0u64;
        let mut failed = 0u64;
        for outcome in join_all(handles).await {
            match outcome {
                Ok(()) => saved += 1,
                Err(e) => {
                    if failed == 0 {
                        warn!(queue, "[actors] Failed to persist: {}", e);
                    }
                    failed += 1;
                }
            }
        }
        QUEUE_ITEMS.with_label_values(&[queue, "saved"]).inc_by(saved);
        QUEUE_ITEMS.with_label_values(&[queue, "failed"]).inc_by(failed);
    });
}
