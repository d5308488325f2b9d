//! # MQTT Session Handler
//!
//! Per-connection state machine: authenticates CONNECT, dispatches PUBLISH
//! by topic, tracks subscriptions and pushes device bound messages.
//!
//! ```text
//! UNAUTHENTICATED --CONNECT--> AUTHENTICATING --valid--> CONNECTED
//!        |                          |                        |
//!        +------ anything else -----+----- refused ----------+--> DISCONNECTED
//! ```
//!
//! Any packet other than CONNECT before the session is connected closes the
//! connection without a reply.

use crate::adaptor::{JsonMqttAdaptor, OutboundPublish};
use crate::domain::topics::{
    BASE_GATEWAY_API_TOPIC, DEVICE_ATTRIBUTES_REQUEST_TOPIC_PREFIX, DEVICE_ATTRIBUTES_TOPIC,
    DEVICE_CLAIM_TOPIC, DEVICE_RPC_REQUESTS_SUB_TOPIC, DEVICE_RPC_REQUESTS_TOPIC,
    DEVICE_RPC_RESPONSE_TOPIC, DEVICE_TELEMETRY_TOPIC, GATEWAY_ATTRIBUTES_REQUEST_TOPIC,
    GATEWAY_ATTRIBUTES_TOPIC, GATEWAY_CLAIM_TOPIC, GATEWAY_CONNECT_TOPIC,
    GATEWAY_DISCONNECT_TOPIC, GATEWAY_RPC_TOPIC, GATEWAY_TELEMETRY_TOPIC,
    PASSIVE_SUBSCRIPTION_TOPICS,
};
use crate::domain::{
    AdaptorError, ConnectPacket, ConnectReturnCode, Packet, PublishPacket, QoS, Reaction,
    SessionState, TopicQosMap, TransportError, SUBACK_FAILURE,
};
use crate::handler::gateway::GatewaySessionHandler;
use crate::ports::{PacketHandler, TransportService};
use async_trait::async_trait;
use sha3::{Digest, Sha3_256};
use shared_types::{
    DeviceCredentialsResult, DeviceInfo, DeviceToTransportMsg, SessionEvent, SessionInfo,
    SubscribeToAttributeUpdatesMsg, SubscribeToRpcMsg, ToTransportMsg, TransportPayload,
    TransportToDeviceMsg,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Hex SHA3-256 of a DER certificate, the key X.509 credentials are stored under.
pub fn certificate_fingerprint(der: &[u8]) -> String {
    hex::encode(Sha3_256::digest(der))
}

/// State of one device connection.
pub struct MqttSessionHandler {
    node_id: String,
    transport: Arc<dyn TransportService>,
    listener: UnboundedSender<DeviceToTransportMsg>,
    adaptor: JsonMqttAdaptor,
    state: SessionState,
    session_id: Uuid,
    session_info: Option<SessionInfo>,
    device: Option<DeviceInfo>,
    qos_map: TopicQosMap,
    gateway: Option<GatewaySessionHandler>,
    peer_certificate: Option<Vec<u8>>,
    keep_alive: Option<Duration>,
    next_packet_id: u16,
}

impl MqttSessionHandler {
    /// Handler for a new connection. Device bound messages for this session
    /// and its gateway children are delivered to `listener`.
    pub fn new(
        node_id: impl Into<String>,
        transport: Arc<dyn TransportService>,
        listener: UnboundedSender<DeviceToTransportMsg>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            transport,
            listener,
            adaptor: JsonMqttAdaptor,
            state: SessionState::default(),
            session_id: Uuid::new_v4(),
            session_info: None,
            device: None,
            qos_map: TopicQosMap::new(),
            gateway: None,
            peer_certificate: None,
            keep_alive: None,
            next_packet_id: 1,
        }
    }

    /// Authenticate by client certificate instead of access token.
    pub fn with_peer_certificate(mut self, der: Vec<u8>) -> Self {
        self.peer_certificate = Some(der);
        self
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session id, fixed for the lifetime of the connection.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// The authenticated device.
    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    /// Gateway sub-sessions, when the device is a gateway.
    pub fn gateway(&self) -> Option<&GatewaySessionHandler> {
        self.gateway.as_ref()
    }

    /// Subscriptions granted so far.
    pub fn subscriptions(&self) -> &TopicQosMap {
        &self.qos_map
    }

    // =========================================================================
    // CONNECT
    // =========================================================================

    async fn process_connect(&mut self, connect: ConnectPacket) -> Reaction {
        info!(
            "[tg-02] [{}] Processing connect msg for client: {}",
            self.session_id, connect.client_id
        );
        self.keep_alive =
            (connect.keep_alive > 0).then(|| Duration::from_secs(u64::from(connect.keep_alive)));
        self.state = SessionState::Authenticating;

        let validation = match self.peer_certificate.clone() {
            Some(der) => {
                let fingerprint = certificate_fingerprint(&der);
                self.transport.validate_x509(&fingerprint).await
            }
            None => match connect.username.as_deref() {
                Some(token) if !token.is_empty() => self.transport.validate_token(token).await,
                _ => return self.refuse(ConnectReturnCode::BadUserNameOrPassword),
            },
        };

        match validation {
            Err(e) => {
                debug!("[tg-02] [{}] Failed to process credentials: {}", self.session_id, e);
                self.refuse(ConnectReturnCode::ServerUnavailable)
            }
            Ok(DeviceCredentialsResult {
                device_info: None, ..
            }) => self.refuse(ConnectReturnCode::NotAuthorized),
            Ok(DeviceCredentialsResult {
                device_info: Some(device),
                ..
            }) => self.on_device_validated(device).await,
        }
    }

    fn refuse(&mut self, code: ConnectReturnCode) -> Reaction {
        info!("[tg-02] [{}] Connection refused: {:?}", self.session_id, code);
        self.state = SessionState::Disconnected;
        Reaction::reply(Packet::connack(code)).and_close()
    }

    async fn on_device_validated(&mut self, device: DeviceInfo) -> Reaction {
        let mut session = SessionInfo::for_device(self.node_id.clone(), &device);
        session.session_id = self.session_id;

        self.forward_quietly(&session, TransportPayload::SessionEvent(SessionEvent::Open))
            .await;
        self.transport
            .register_session(&session, self.listener.clone())
            .await;
        if device.kind.is_gateway() {
            self.gateway = Some(GatewaySessionHandler::new(
                device.clone(),
                session.clone(),
                self.transport.clone(),
                self.listener.clone(),
            ));
        }

        info!(
            "[tg-02] [{}] Client connected as device {} ({})",
            self.session_id, device.device_name, device.device_id
        );
        self.session_info = Some(session);
        self.device = Some(device);
        self.state = SessionState::Connected;
        Reaction::reply(Packet::connack(ConnectReturnCode::Accepted))
    }

    // =========================================================================
    // PUBLISH
    // =========================================================================

    async fn process_publish(&mut self, publish: PublishPacket) -> Reaction {
        let msg_id = publish.message_id();
        trace!(
            "[tg-02] [{}] Processing publish msg [{}][{}]",
            self.session_id,
            publish.topic,
            msg_id
        );
        if publish.topic.starts_with(BASE_GATEWAY_API_TOPIC) {
            self.process_gateway_publish(publish).await
        } else {
            self.process_device_publish(publish).await
        }
    }

    fn convert_device_publish(
        &self,
        session: &SessionInfo,
        topic: &str,
        payload: &[u8],
    ) -> Result<Option<TransportPayload>, AdaptorError> {
        let adaptor = &self.adaptor;
        let converted = if topic == DEVICE_TELEMETRY_TOPIC {
            TransportPayload::PostTelemetry(adaptor.convert_to_post_telemetry(payload)?)
        } else if topic == DEVICE_ATTRIBUTES_TOPIC {
            TransportPayload::PostAttributes(adaptor.convert_to_post_attributes(payload)?)
        } else if topic.starts_with(DEVICE_ATTRIBUTES_REQUEST_TOPIC_PREFIX) {
            TransportPayload::GetAttributes(adaptor.convert_to_get_attributes(topic, payload)?)
        } else if topic.starts_with(DEVICE_RPC_RESPONSE_TOPIC) {
            TransportPayload::ToDeviceRpcResponse(
                adaptor.convert_to_device_rpc_response(topic, payload)?,
            )
        } else if topic.starts_with(DEVICE_RPC_REQUESTS_TOPIC) {
            TransportPayload::ToServerRpcRequest(
                adaptor.convert_to_server_rpc_request(topic, payload)?,
            )
        } else if topic == DEVICE_CLAIM_TOPIC {
            TransportPayload::ClaimDevice(
                adaptor.convert_to_claim_device(session.device_id, payload)?,
            )
        } else {
            return Ok(None);
        };
        Ok(Some(converted))
    }

    async fn process_device_publish(&mut self, publish: PublishPacket) -> Reaction {
        let Some(session) = self.session_info.clone() else {
            return Reaction::close();
        };
        let msg_id = publish.message_id();
        let payload = match self.convert_device_publish(&session, &publish.topic, &publish.payload)
        {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(
                    "[tg-02] [{}] Ignoring publish to unknown topic {}",
                    self.session_id, publish.topic
                );
                return Reaction::none();
            }
            Err(e) => {
                warn!(
                    "[tg-02] [{}] Failed to process publish msg [{}][{}]: {}",
                    self.session_id, publish.topic, msg_id, e
                );
                info!(
                    "[tg-02] [{}] Closing current session due to invalid publish msg",
                    self.session_id
                );
                self.disconnect().await;
                return Reaction::close();
            }
        };

        match self
            .transport
            .process(TransportToDeviceMsg::new(session, payload))
            .await
        {
            Ok(()) => Self::ack(msg_id),
            Err(e) => {
                debug!("[tg-02] [{}] Failed to publish msg: {}", self.session_id, e);
                self.disconnect().await;
                Reaction::close()
            }
        }
    }

    async fn process_gateway_publish(&mut self, publish: PublishPacket) -> Reaction {
        let msg_id = publish.message_id();
        let Some(gateway) = self.gateway.as_mut() else {
            debug!(
                "[tg-02] [{}] Gateway topic {} from a non-gateway device",
                self.session_id, publish.topic
            );
            return Reaction::none();
        };
        let payload = &publish.payload[..];
        let result = match publish.topic.as_str() {
            GATEWAY_TELEMETRY_TOPIC => gateway.on_telemetry(payload).await,
            GATEWAY_CLAIM_TOPIC => gateway.on_claim(payload).await,
            GATEWAY_ATTRIBUTES_TOPIC => gateway.on_attributes(payload).await,
            GATEWAY_ATTRIBUTES_REQUEST_TOPIC => gateway.on_attributes_request(payload).await,
            GATEWAY_RPC_TOPIC => gateway.on_rpc_response(payload).await,
            GATEWAY_CONNECT_TOPIC => gateway.on_connect(payload).await,
            GATEWAY_DISCONNECT_TOPIC => gateway.on_disconnect(payload).await,
            _ => return Reaction::none(),
        };

        match result {
            Ok(()) => Self::ack(msg_id),
            Err(e @ (TransportError::Adaptor(_) | TransportError::DeviceLookup(_))) => {
                warn!(
                    "[tg-02] [{}] Failed to process gateway publish msg [{}][{}]: {}",
                    self.session_id, publish.topic, msg_id, e
                );
                Reaction::none()
            }
            Err(e) => {
                debug!("[tg-02] [{}] Failed to publish msg: {}", self.session_id, e);
                self.disconnect().await;
                Reaction::close()
            }
        }
    }

    fn ack(msg_id: u16) -> Reaction {
        if msg_id > 0 {
            Reaction::reply(Packet::PubAck(msg_id))
        } else {
            Reaction::none()
        }
    }

    // =========================================================================
    // SUBSCRIBE / UNSUBSCRIBE
    // =========================================================================

    async fn process_subscribe(&mut self, packet_id: u16, topics: Vec<(String, QoS)>) -> Reaction {
        trace!("[tg-02] [{}] Processing subscription [{}]", self.session_id, packet_id);
        let Some(session) = self.session_info.clone() else {
            return Reaction::close();
        };
        let mut return_codes = Vec::with_capacity(topics.len());
        for (topic, requested) in topics {
            let forwarded = match topic.as_str() {
                DEVICE_ATTRIBUTES_TOPIC => Some(TransportPayload::SubscribeToAttributes(
                    SubscribeToAttributeUpdatesMsg { unsubscribe: false },
                )),
                DEVICE_RPC_REQUESTS_SUB_TOPIC => Some(TransportPayload::SubscribeToRpc(
                    SubscribeToRpcMsg { unsubscribe: false },
                )),
                t if PASSIVE_SUBSCRIPTION_TOPICS.contains(&t) => None,
                _ => {
                    warn!(
                        "[tg-02] [{}] Failed to subscribe to [{}][{:?}]",
                        self.session_id, topic, requested
                    );
                    return_codes.push(SUBACK_FAILURE);
                    continue;
                }
            };
            if let Some(payload) = forwarded {
                if let Err(e) = self
                    .transport
                    .process(TransportToDeviceMsg::new(session.clone(), payload))
                    .await
                {
                    warn!(
                        "[tg-02] [{}] Failed to subscribe to [{}][{:?}]: {}",
                        self.session_id, topic, requested, e
                    );
                    return_codes.push(SUBACK_FAILURE);
                    continue;
                }
            }
            let granted = requested.granted();
            self.qos_map.insert(&topic, granted);
            return_codes.push(granted.as_u8());
        }
        Reaction::reply(Packet::SubAck {
            packet_id,
            return_codes,
        })
    }

    async fn process_unsubscribe(&mut self, packet_id: u16, topics: Vec<String>) -> Reaction {
        let Some(session) = self.session_info.clone() else {
            return Reaction::close();
        };
        for topic in topics {
            self.qos_map.remove(&topic);
            let payload = match topic.as_str() {
                DEVICE_ATTRIBUTES_TOPIC => TransportPayload::SubscribeToAttributes(
                    SubscribeToAttributeUpdatesMsg { unsubscribe: true },
                ),
                DEVICE_RPC_REQUESTS_SUB_TOPIC => {
                    TransportPayload::SubscribeToRpc(SubscribeToRpcMsg { unsubscribe: true })
                }
                _ => continue,
            };
            if let Err(e) = self
                .transport
                .process(TransportToDeviceMsg::new(session.clone(), payload))
                .await
            {
                warn!(
                    "[tg-02] [{}] Failed to process unsubscription [{}] to [{}]: {}",
                    self.session_id, packet_id, topic, e
                );
            }
        }
        Reaction::reply(Packet::UnsubAck(packet_id))
    }

    // =========================================================================
    // DISCONNECT
    // =========================================================================

    /// Tears the session down. Only the first call after CONNECT has effect.
    async fn disconnect(&mut self) {
        let was_connected = self.state.is_connected();
        self.state = SessionState::Disconnected;
        if !was_connected {
            return;
        }
        info!("[tg-02] [{}] Client disconnected", self.session_id);
        if let Some(session) = self.session_info.clone() {
            self.forward_quietly(&session, TransportPayload::SessionEvent(SessionEvent::Closed))
                .await;
            self.transport.deregister_session(&session).await;
        }
        if let Some(gateway) = self.gateway.as_mut() {
            gateway.on_gateway_disconnect().await;
        }
    }

    async fn forward_quietly(&self, session: &SessionInfo, payload: TransportPayload) {
        let kind = payload.kind();
        if let Err(e) = self
            .transport
            .process(TransportToDeviceMsg::new(session.clone(), payload))
            .await
        {
            warn!(
                "[tg-02] [{}] Failed to forward {}: {}",
                self.session_id, kind, e
            );
        }
    }

    fn check_connected(&mut self, packet: &Packet) -> bool {
        if self.state.is_connected() {
            return true;
        }
        info!(
            "[tg-02] [{}] Closing current session due to invalid msg order: {}",
            self.session_id,
            packet.name()
        );
        self.state = SessionState::Disconnected;
        false
    }

    // =========================================================================
    // DEVICE BOUND
    // =========================================================================

    fn next_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        id
    }

    fn to_publish(&mut self, (topic, payload): OutboundPublish) -> Packet {
        let qos = self.qos_map.qos_for(&topic).unwrap_or(QoS::AtLeastOnce);
        let packet_id = (qos > QoS::AtMostOnce).then(|| self.next_packet_id());
        Packet::Publish(PublishPacket {
            topic,
            qos,
            packet_id,
            dup: false,
            retain: false,
            payload,
        })
    }
}

#[async_trait]
impl PacketHandler for MqttSessionHandler {
    async fn on_packet(&mut self, packet: Packet) -> Reaction {
        match packet {
            Packet::Connect(connect) => {
                if self.state == SessionState::Unauthenticated {
                    self.process_connect(connect).await
                } else {
                    warn!(
                        "[tg-02] [{}] Duplicate CONNECT in state {}",
                        self.session_id, self.state
                    );
                    self.disconnect().await;
                    Reaction::close()
                }
            }
            other if !self.check_connected(&other) => Reaction::close(),
            Packet::Publish(publish) => self.process_publish(publish).await,
            Packet::Subscribe { packet_id, topics } => {
                self.process_subscribe(packet_id, topics).await
            }
            Packet::Unsubscribe { packet_id, topics } => {
                self.process_unsubscribe(packet_id, topics).await
            }
            Packet::PingReq => {
                if let Some(session) = &self.session_info {
                    self.transport.report_activity(session);
                }
                if let Some(gateway) = &self.gateway {
                    gateway.report_activity();
                }
                Reaction::reply(Packet::PingResp)
            }
            Packet::Disconnect => {
                self.disconnect().await;
                Reaction::close()
            }
            other => {
                trace!(
                    "[tg-02] [{}] Ignoring {} from client",
                    self.session_id,
                    other.name()
                );
                Reaction::none()
            }
        }
    }

    async fn on_command(&mut self, msg: DeviceToTransportMsg) -> Reaction {
        if !self.state.is_connected() {
            return Reaction::none();
        }
        if let ToTransportMsg::SessionClose { message } = &msg.msg {
            if msg.session_id == self.session_id {
                debug!(
                    "[tg-02] [{}] Received the remote command to close the session: {}",
                    self.session_id, message
                );
                self.disconnect().await;
                return Reaction::close();
            }
        }

        let outbound = if msg.session_id == self.session_id {
            self.adaptor.convert_to_publish(&msg.msg)
        } else {
            self.gateway
                .as_ref()
                .and_then(|gateway| gateway.convert_to_publish(&msg))
        };
        match outbound {
            Some(publish) => Reaction::reply(self.to_publish(publish)),
            None => {
                trace!(
                    "[tg-02] [{}] No wire form for message to session {}",
                    self.session_id,
                    msg.session_id
                );
                Reaction::none()
            }
        }
    }

    async fn on_transport_closed(&mut self) {
        self.disconnect().await;
    }

    fn keep_alive(&self) -> Option<Duration> {
        self.keep_alive
    }
}
