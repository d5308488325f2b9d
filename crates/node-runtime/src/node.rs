//! # Node Runtime
//!
//! Wires the subsystems of one gateway node and owns their tasks.
//!
//! ## Startup Sequence
//!
//! 1. Bind the cluster RPC listener. Its port makes the node id.
//! 2. Seed the routing rings from the static peer list and start the
//!    membership listener.
//! 3. Start the persistence queues and the device actor runtime.
//! 4. Bind the MQTT listener and the HTTP API.

use crate::actors::{AttributeRecord, DeviceActorSystem, ReplySink, TsRecord};
use crate::api::{self, ApiKeys, AppState};
use crate::config::NodeConfig;
use crate::credentials::InMemoryCredentialStore;
use crate::rpc::{ClusterRpcClient, ClusterRpcServer};
use crate::transport::{LocalTransportService, SessionRegistry, SessionReplyRouter};
use anyhow::{Context, Result};
use shared_bus::InMemoryEventBus;
use shared_types::ServerInstance;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tg_01_cluster_routing::{
    ClusterRoutingService, MembershipListener, MessageRouter, StaticDiscoveryService,
};
use tg_02_mqtt_transport::MqttTransportServer;
use tg_03_rate_limiting::RateLimitRegistry;
use tg_04_batch_queue::{BulkWriter, PartitionedBatchQueue, PersistenceQueue};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Addresses the node actually bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddresses {
    /// Cluster RPC listener.
    pub rpc: SocketAddr,
    /// MQTT listener.
    pub mqtt: SocketAddr,
    /// HTTP API listener.
    pub api: SocketAddr,
}

/// A running gateway node.
pub struct NodeRuntime {
    node_id: String,
    addresses: BoundAddresses,
    routing: Arc<ClusterRoutingService>,
    bus: Arc<InMemoryEventBus>,
    actors: Arc<DeviceActorSystem>,
    sessions: Arc<SessionRegistry>,
    credentials: Arc<InMemoryCredentialStore>,
    telemetry_queue: Arc<PartitionedBatchQueue<TsRecord>>,
    attribute_queue: Arc<PartitionedBatchQueue<AttributeRecord>>,
    drain_delay: Duration,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeRuntime {
    /// Starts every subsystem described by `config`.
    pub async fn start(
        config: NodeConfig,
        telemetry_writer: Arc<dyn BulkWriter<TsRecord>>,
        attribute_writer: Arc<dyn BulkWriter<AttributeRecord>>,
    ) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        info!("===========================================");
        info!("  Telemetry Gateway Node v{}", crate::VERSION);
        info!("===========================================");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        // Step 1: cluster identity
        let rpc_listener = TcpListener::bind(config.rpc.bind)
            .await
            .with_context(|| format!("Failed to bind cluster RPC on {}", config.rpc.bind))?;
        let rpc_addr = rpc_listener.local_addr()?;
        let current = ServerInstance::new(
            config.cluster.advertised_host.clone(),
            rpc_addr.port(),
            config.cluster.server_type,
        );
        let node_id = current.server_key.clone();

        // Step 2: routing
        let discovery = StaticDiscoveryService::new(current, config.cluster.peer_instances());
        let routing = Arc::new(ClusterRoutingService::init(
            config.cluster.routing_config()?,
            &discovery,
        ));
        let bus = Arc::new(InMemoryEventBus::new());
        let listener = MembershipListener::new(routing.clone(), &bus);
        tasks.push(spawn_until_shutdown(
            "Membership listener",
            listener.run(),
            shutdown_rx.clone(),
        ));

        // Step 3: persistence and actors
        let telemetry_queue = Arc::new(PartitionedBatchQueue::start(
            "timeseries",
            &config.queues,
            telemetry_writer,
        ));
        let attribute_queue = Arc::new(PartitionedBatchQueue::start(
            "attributes",
            &config.queues,
            attribute_writer,
        ));
        let sessions = Arc::new(SessionRegistry::new());
        let rpc_client = Arc::new(ClusterRpcClient::new(Duration::from_millis(
            config.rpc.connect_timeout_ms,
        )));
        let replies: Arc<dyn ReplySink> = Arc::new(SessionReplyRouter::start(
            node_id.clone(),
            sessions.clone(),
            rpc_client.clone(),
        ));
        let actors = Arc::new(DeviceActorSystem::new(
            telemetry_queue.clone(),
            attribute_queue.clone(),
            replies,
        ));

        let rpc_server = Arc::new(ClusterRpcServer::new(actors.clone(), sessions.clone()));
        tasks.push(spawn_until_shutdown(
            "Cluster RPC server",
            rpc_server.run(rpc_listener),
            shutdown_rx.clone(),
        ));

        // Step 4: device and operator ingress
        let credentials = Arc::new(InMemoryCredentialStore::from_entries(&config.devices));
        let router = MessageRouter::new(routing.clone(), actors.clone(), rpc_client);
        let transport = Arc::new(LocalTransportService::new(
            credentials.clone(),
            router,
            sessions.clone(),
            bus.clone(),
        ));
        let mqtt = Arc::new(MqttTransportServer::new(
            node_id.clone(),
            transport,
            config.transport.server_config(),
        ));
        let mqtt_listener = TcpListener::bind(config.transport.mqtt_bind)
            .await
            .with_context(|| format!("Failed to bind MQTT on {}", config.transport.mqtt_bind))?;
        let mqtt_addr = mqtt_listener.local_addr()?;
        tasks.push(spawn_until_shutdown(
            "MQTT listener",
            mqtt.clone().run(mqtt_listener),
            shutdown_rx.clone(),
        ));

        let limiter = Arc::new(RateLimitRegistry::new(&config.rate_limits)?);
        let state = AppState {
            node_id: node_id.clone(),
            routing: routing.clone(),
            credentials: credentials.clone(),
            actors: actors.clone(),
            sessions: sessions.clone(),
            telemetry_queue: telemetry_queue.clone(),
            attribute_queue: attribute_queue.clone(),
            mqtt,
            rpc_timeout: Duration::from_millis(config.api.rpc_timeout_ms),
        };
        let app = api::router(
            state,
            Arc::new(ApiKeys::from_entries(&config.api.users)),
            limiter,
        );
        let api_listener = TcpListener::bind(config.api.bind)
            .await
            .with_context(|| format!("Failed to bind HTTP API on {}", config.api.bind))?;
        let api_addr = api_listener.local_addr()?;
        tasks.push(spawn_until_shutdown(
            "HTTP API",
            async move {
                if let Err(e) = axum::serve(api_listener, app).await {
                    error!("[node] HTTP API stopped: {}", e);
                }
            },
            shutdown_rx,
        ));

        let addresses = BoundAddresses {
            rpc: rpc_addr,
            mqtt: mqtt_addr,
            api: api_addr,
        };
        info!(node = %node_id, rpc = %addresses.rpc, mqtt = %addresses.mqtt, api = %addresses.api, "[node] Node started");

        Ok(Self {
            node_id,
            addresses,
            routing,
            bus,
            actors,
            sessions,
            credentials,
            telemetry_queue,
            attribute_queue,
            drain_delay: Duration::from_millis(config.queues.max_delay_ms),
            shutdown_tx,
            tasks,
        })
    }

    /// `host:port` of the RPC listener, as peers know this node.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Bound listener addresses.
    pub fn addresses(&self) -> BoundAddresses {
        self.addresses
    }

    /// Routing rings.
    pub fn routing(&self) -> &Arc<ClusterRoutingService> {
        &self.routing
    }

    /// Bus carrying membership and session events.
    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    /// Sessions held by this node.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Device registry. Devices added here can connect right away.
    pub fn credentials(&self) -> &Arc<InMemoryCredentialStore> {
        &self.credentials
    }

    /// Device actors living on this node.
    pub fn actors(&self) -> &Arc<DeviceActorSystem> {
        &self.actors
    }

    /// Stops listeners and actors, then the queues.
    ///
    /// Actors get one queue delay to hand off their last writes. Items still
    /// queued after that are dropped with [`QueueError::Shutdown`].
    ///
    /// [`QueueError::Shutdown`]: tg_04_batch_queue::QueueError::Shutdown
    pub async fn shutdown(self) {
        info!("[node] Initiating graceful shutdown...");
        if let Err(e) = self.shutdown_tx.send(true) {
            error!("[node] Failed to send shutdown signal: {}", e);
        }
        self.actors.stop_all();
        tokio::time::sleep(self.drain_delay).await;
        self.telemetry_queue.shutdown();
        self.attribute_queue.shutdown();
        for task in self.tasks {
            let _ = task.await;
        }
        info!("[node] Node stopped");
    }
}

fn spawn_until_shutdown<F>(
    name: &'static str,
    task: F,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = task => {}
            _ = shutdown.changed() => {
                info!("[node] {} received shutdown signal", name);
            }
        }
    })
}
