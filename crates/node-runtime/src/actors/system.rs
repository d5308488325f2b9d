//! Actor registry and the local dispatch port.

use super::device_actor::{ActorContext, DeviceActor, DeviceCommand};
use super::ports::ReplySink;
use super::records::{AttributeRecord, TsRecord};
use super::ActorError;
use async_trait::async_trait;
use dashmap::DashMap;
use shared_types::{KeyValue, TransportToDeviceMsg};
use std::sync::Arc;
use std::time::Duration;
use tg_01_cluster_routing::{LocalDispatcher, RoutingError};
use tg_04_batch_queue::PersistenceQueue;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

/// Every device actor living on this node.
pub struct DeviceActorSystem {
    actors: DashMap<Uuid, mpsc::UnboundedSender<DeviceCommand>>,
    context: Arc<ActorContext>,
}

impl DeviceActorSystem {
    /// Creates an empty runtime persisting through the given queues.
    pub fn new(
        telemetry: Arc<dyn PersistenceQueue<TsRecord>>,
        attributes: Arc<dyn PersistenceQueue<AttributeRecord>>,
        replies: Arc<dyn ReplySink>,
    ) -> Self {
        Self {
            actors: DashMap::new(),
            context: Arc::new(ActorContext {
                telemetry,
                attributes,
                replies,
            }),
        }
    }

    /// Hands `msg` to its device's actor, starting the actor if needed.
    pub fn dispatch(&self, msg: TransportToDeviceMsg) -> Result<(), ActorError> {
        let device_id = msg.session_info.device_id;
        let tenant_id = msg.session_info.tenant_id;
        let mailbox = self
            .actors
            .entry(device_id)
            .or_insert_with(|| self.spawn(device_id, tenant_id))
            .clone();
        mailbox
            .send(DeviceCommand::Transport(msg))
            .map_err(|_| {
                self.actors.remove(&device_id);
                ActorError::Stopped(device_id)
            })
    }

    /// Stores shared attributes and notifies subscribed sessions.
    pub fn update_shared_attributes(
        &self,
        device_id: Uuid,
        kv: Vec<KeyValue>,
    ) -> Result<(), ActorError> {
        self.mailbox(device_id)?
            .send(DeviceCommand::UpdateSharedAttributes(kv))
            .map_err(|_| ActorError::Stopped(device_id))
    }

    /// Sends an RPC request to the device and waits for its answer.
    pub async fn call_rpc(
        &self,
        device_id: Uuid,
        method_name: String,
        params: String,
        timeout: Duration,
    ) -> Result<String, ActorError> {
        let (reply, answer) = oneshot::channel();
        self.mailbox(device_id)?
            .send(DeviceCommand::Rpc {
                method_name,
                params,
                reply,
            })
            .map_err(|_| ActorError::Stopped(device_id))?;
        match tokio::time::timeout(timeout, answer).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ActorError::Stopped(device_id)),
            Err(_) => Err(ActorError::Timeout(timeout)),
        }
    }

    /// Claims the device with the secret it published.
    pub async fn claim(&self, device_id: Uuid, secret_key: String) -> Result<(), ActorError> {
        let (reply, answer) = oneshot::channel();
        self.mailbox(device_id)?
            .send(DeviceCommand::Claim { secret_key, reply })
            .map_err(|_| ActorError::Stopped(device_id))?;
        answer.await.map_err(|_| ActorError::Stopped(device_id))?
    }

    /// Number of live actors.
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Drops every mailbox. Actors finish their queued work and stop.
    pub fn stop_all(&self) {
        self.actors.clear();
    }

    fn mailbox(&self, device_id: Uuid) -> Result<mpsc::UnboundedSender<DeviceCommand>, ActorError> {
        self.actors
            .get(&device_id)
            .map(|mailbox| mailbox.clone())
            .ok_or(ActorError::UnknownDevice(device_id))
    }

    fn spawn(&self, device_id: Uuid, tenant_id: Uuid) -> mpsc::UnboundedSender<DeviceCommand> {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = DeviceActor::new(device_id, tenant_id, self.context.clone());
        tokio::spawn(actor.run(rx));
        debug!(device = %device_id, "[actors] Device actor started");
        tx
    }
}

#[async_trait]
impl LocalDispatcher for DeviceActorSystem {
    async fn tell(&self, msg: TransportToDeviceMsg) -> Result<(), RoutingError> {
        self.dispatch(msg)
            .map_err(|e| RoutingError::LocalDispatch(e.to_string()))
    }
}
