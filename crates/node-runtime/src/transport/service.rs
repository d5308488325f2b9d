//! Transport service backed by the local credential store, the message
//! router and the session registry.

use super::SessionRegistry;
use crate::credentials::InMemoryCredentialStore;
use async_trait::async_trait;
use shared_bus::{ClusterEvent, EventPublisher, InMemoryEventBus};
use shared_types::{
    DeviceCredentialsResult, DeviceInfo, DeviceToTransportMsg, SessionInfo, TransportToDeviceMsg,
};
use std::sync::Arc;
use tg_01_cluster_routing::{MessageRouter, RouteDecision};
use tg_02_mqtt_transport::{TransportError, TransportService};
use tg_telemetry::{ACTIVE_SESSIONS, ROUTING_DECISIONS};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// [`TransportService`] for a gateway node.
pub struct LocalTransportService {
    credentials: Arc<InMemoryCredentialStore>,
    router: MessageRouter,
    sessions: Arc<SessionRegistry>,
    bus: Arc<InMemoryEventBus>,
}

impl LocalTransportService {
    /// Wires the service.
    pub fn new(
        credentials: Arc<InMemoryCredentialStore>,
        router: MessageRouter,
        sessions: Arc<SessionRegistry>,
        bus: Arc<InMemoryEventBus>,
    ) -> Self {
        Self {
            credentials,
            router,
            sessions,
            bus,
        }
    }
}

fn lookup_result(device: Option<DeviceInfo>) -> DeviceCredentialsResult {
    match device {
        Some(device) => DeviceCredentialsResult::found(device),
        None => DeviceCredentialsResult::rejected(),
    }
}

#[async_trait]
impl TransportService for LocalTransportService {
    async fn validate_token(&self, token: &str) -> Result<DeviceCredentialsResult, TransportError> {
        Ok(lookup_result(self.credentials.find_by_token(token)))
    }

    async fn validate_x509(
        &self,
        fingerprint: &str,
    ) -> Result<DeviceCredentialsResult, TransportError> {
        Ok(lookup_result(self.credentials.find_by_fingerprint(fingerprint)))
    }

    async fn get_or_create_device(
        &self,
        gateway: &DeviceInfo,
        device_name: &str,
        device_type: &str,
    ) -> Result<DeviceInfo, TransportError> {
        if !gateway.kind.is_gateway() {
            return Err(TransportError::DeviceLookup(format!(
                "{} is not a gateway",
                gateway.device_name
            )));
        }
        if device_name.is_empty() {
            return Err(TransportError::DeviceLookup("empty device name".into()));
        }
        Ok(self
            .credentials
            .get_or_create_child(gateway, device_name, device_type))
    }

    async fn process(&self, msg: TransportToDeviceMsg) -> Result<(), TransportError> {
        match self.router.route(msg).await {
            Ok(RouteDecision::Local) => {
                ROUTING_DECISIONS.with_label_values(&["local"]).inc();
                Ok(())
            }
            Ok(RouteDecision::Remote(_)) => {
                ROUTING_DECISIONS.with_label_values(&["remote"]).inc();
                Ok(())
            }
            Err(e) => {
                ROUTING_DECISIONS.with_label_values(&["failed"]).inc();
                warn!("[tg-02] Failed to route envelope: {}", e);
                Err(TransportError::Forward(e.to_string()))
            }
        }
    }

    async fn register_session(
        &self,
        session: &SessionInfo,
        listener: UnboundedSender<DeviceToTransportMsg>,
    ) {
        self.sessions.register(session, listener);
        ACTIVE_SESSIONS.inc();
        debug!(session = %session.session_id, device = %session.device_name, "[tg-02] Session registered");
        self.bus
            .publish(ClusterEvent::SessionOpened {
                session_id: session.session_id,
                device_id: session.device_id,
            })
            .await;
    }

    async fn deregister_session(&self, session: &SessionInfo) {
        if self.sessions.deregister(session.session_id).is_none() {
            return;
        }
        ACTIVE_SESSIONS.dec();
        debug!(session = %session.session_id, device = %session.device_name, "[tg-02] Session deregistered");
        self.bus
            .publish(ClusterEvent::SessionClosed {
                session_id: session.session_id,
                device_id: session.device_id,
            })
            .await;
    }

    fn report_activity(&self, session: &SessionInfo) {
        self.sessions.touch(session.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::DeviceCredentialEntry;
    use shared_bus::EventFilter;
    use shared_types::{
        DeviceKind, EntityId, ServerInstance, ServerType, SessionEvent, TransportPayload,
    };
    use tg_01_cluster_routing::{
        ClusterRoutingApi, ClusterRoutingService, MockLocalDispatcher, MockRemoteSender,
        RoutingConfig,
    };
    use tokio::sync::mpsc;
    use uuid::Uuid;

    struct Fixture {
        service: LocalTransportService,
        routing: Arc<ClusterRoutingService>,
        local: Arc<MockLocalDispatcher>,
        remote: Arc<MockRemoteSender>,
        bus: Arc<InMemoryEventBus>,
    }

    fn fixture(remote_fails: bool) -> Fixture {
        let entries = vec![DeviceCredentialEntry {
            name: "gw".into(),
            device_type: "gateway".into(),
            tenant_id: Uuid::from_u128(1),
            customer_id: None,
            device_id: None,
            access_token: Some("GW_TOKEN".into()),
            certificate_fingerprint: Some("ab12".into()),
            gateway: true,
        }];
        let routing = Arc::new(ClusterRoutingService::new(
            RoutingConfig::default(),
            ServerInstance::new("127.0.0.1", 7070, ServerType::Core),
        ));
        let local = Arc::new(MockLocalDispatcher::default());
        let remote = Arc::new(MockRemoteSender {
            fail: remote_fails,
            ..Default::default()
        });
        let bus = Arc::new(InMemoryEventBus::new());
        let router = MessageRouter::new(routing.clone(), local.clone(), remote.clone());
        let service = LocalTransportService::new(
            Arc::new(InMemoryCredentialStore::from_entries(&entries)),
            router,
            Arc::new(SessionRegistry::new()),
            bus.clone(),
        );
        Fixture {
            service,
            routing,
            local,
            remote,
            bus,
        }
    }

    fn envelope(device_id: Uuid) -> TransportToDeviceMsg {
        let device = DeviceInfo {
            tenant_id: Uuid::from_u128(1),
            customer_id: None,
            device_id,
            device_name: "d".into(),
            device_type: "default".into(),
            kind: DeviceKind::Standard,
        };
        TransportToDeviceMsg::new(
            SessionInfo::for_device("127.0.0.1:7070", &device),
            TransportPayload::SessionEvent(SessionEvent::Open),
        )
    }

    fn remote_device(routing: &ClusterRoutingService) -> Uuid {
        (1..10_000u128)
            .map(Uuid::from_u128)
            .find(|id| routing.resolve(&EntityId::device(*id)).is_some())
            .unwrap()
    }

    #[tokio::test]
    async fn test_credentials() {
        let f = fixture(false);
        let found = f.service.validate_token("GW_TOKEN").await.unwrap();
        assert_eq!(found.device_info.unwrap().device_name, "gw");
        assert!(f.service.validate_token("nope").await.unwrap().device_info.is_none());
        assert!(f.service.validate_x509("AB12").await.unwrap().device_info.is_some());
    }

    #[tokio::test]
    async fn test_children_only_behind_gateways() {
        let f = fixture(false);
        let gateway = f.service.validate_token("GW_TOKEN").await.unwrap().device_info.unwrap();
        let child = f
            .service
            .get_or_create_device(&gateway, "sensor-1", "sensor")
            .await
            .unwrap();
        let again = f
            .service
            .get_or_create_device(&gateway, "sensor-1", "sensor")
            .await
            .unwrap();
        assert_eq!(child.device_id, again.device_id);

        assert!(matches!(
            f.service.get_or_create_device(&child, "x", "default").await,
            Err(TransportError::DeviceLookup(_))
        ));
    }

    #[tokio::test]
    async fn test_single_node_routes_locally() {
        let f = fixture(false);
        f.service.process(envelope(Uuid::from_u128(5))).await.unwrap();
        assert_eq!(f.local.received.lock().len(), 1);
        assert!(f.remote.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_devices_go_remote() {
        let f = fixture(false);
        f.routing
            .add_node(&ServerInstance::new("10.0.0.2", 7070, ServerType::Core));
        let device_id = remote_device(&f.routing);

        f.service.process(envelope(device_id)).await.unwrap();
        let sent = f.remote.sent.lock();
        assert_eq!(sent[0].0.host, "10.0.0.2");
        assert!(f.local.received.lock().is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_is_a_forward_error() {
        let f = fixture(true);
        f.routing
            .add_node(&ServerInstance::new("10.0.0.2", 7070, ServerType::Core));
        let device_id = remote_device(&f.routing);

        assert!(matches!(
            f.service.process(envelope(device_id)).await,
            Err(TransportError::Forward(_))
        ));
    }

    #[tokio::test]
    async fn test_session_lifecycle_is_published() {
        let f = fixture(false);
        let mut events = f.bus.subscribe(EventFilter::all());
        let session = envelope(Uuid::from_u128(5)).session_info;
        let (tx, _rx) = mpsc::unbounded_channel();

        f.service.register_session(&session, tx).await;
        f.service.deregister_session(&session).await;
        f.service.deregister_session(&session).await;

        assert!(matches!(
            events.recv().await,
            Some(ClusterEvent::SessionOpened { session_id, .. }) if session_id == session.session_id
        ));
        assert!(matches!(
            events.recv().await,
            Some(ClusterEvent::SessionClosed { .. })
        ));
        assert!(events.try_recv().unwrap().is_none());
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_log_lines_carry_subsystem_tag() {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let f = fixture(true);
        f.routing
            .add_node(&ServerInstance::new("10.0.0.2", 7070, ServerType::Core));
        let session = envelope(Uuid::from_u128(5)).session_info;
        let (tx, _rx) = mpsc::unbounded_channel();
        f.service.register_session(&session, tx).await;
        f.service.deregister_session(&session).await;
        let _ = f.service.process(envelope(remote_device(&f.routing))).await;

        let output = String::from_utf8(buffer.0.lock().clone()).unwrap();
        let lines: Vec<&str> = output.lines().filter(|l| l.contains("[tg-02]")).collect();
        assert!(lines.iter().any(|l| l.contains("Session registered")));
        assert!(lines.iter().any(|l| l.contains("Session deregistered")));
        assert!(lines.iter().any(|l| l.contains("Failed to route envelope")));
    }
}
