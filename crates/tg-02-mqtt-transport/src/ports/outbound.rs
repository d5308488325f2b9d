//! # Outbound Port
//!
//! The transport service: credential checks, gateway child provisioning,
//! forwarding to device actors and the live session registry.

use crate::domain::TransportError;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{
    DeviceCredentialsResult, DeviceInfo, DeviceToTransportMsg, SessionInfo, TransportToDeviceMsg,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Transport service - outbound port.
#[async_trait]
pub trait TransportService: Send + Sync {
    /// Looks up the device owning an access token.
    async fn validate_token(&self, token: &str) -> Result<DeviceCredentialsResult, TransportError>;

    /// Looks up the device owning a certificate fingerprint.
    async fn validate_x509(
        &self,
        fingerprint: &str,
    ) -> Result<DeviceCredentialsResult, TransportError>;

    /// Resolves a device behind a gateway, creating it on first sight.
    async fn get_or_create_device(
        &self,
        gateway: &DeviceInfo,
        device_name: &str,
        device_type: &str,
    ) -> Result<DeviceInfo, TransportError>;

    /// Forwards an envelope to the actor owning its device.
    async fn process(&self, msg: TransportToDeviceMsg) -> Result<(), TransportError>;

    /// Makes a session reachable for device bound messages.
    async fn register_session(
        &self,
        session: &SessionInfo,
        listener: UnboundedSender<DeviceToTransportMsg>,
    );

    /// Removes a session from the registry.
    async fn deregister_session(&self, session: &SessionInfo);

    /// Records activity for a session.
    fn report_activity(&self, session: &SessionInfo);
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// In-memory transport service recording every call.
#[derive(Default)]
pub struct MockTransportService {
    /// Token to device.
    pub tokens: Mutex<HashMap<String, DeviceInfo>>,
    /// Fingerprint to device.
    pub certificates: Mutex<HashMap<String, DeviceInfo>>,
    /// Children created behind gateways, by name.
    pub children: Mutex<HashMap<String, DeviceInfo>>,
    /// Forwarded envelopes, in order.
    pub processed: Mutex<Vec<TransportToDeviceMsg>>,
    /// Live sessions and their listeners.
    pub sessions: Mutex<HashMap<Uuid, UnboundedSender<DeviceToTransportMsg>>>,
    /// Deregistered session ids, in order.
    pub deregistered: Mutex<Vec<Uuid>>,
    /// Sessions reported active, in order.
    pub activity: Mutex<Vec<Uuid>>,
    /// Fail validation calls when set.
    pub fail_validation: AtomicBool,
    /// Fail `process` calls when set.
    pub fail_forward: AtomicBool,
}

impl MockTransportService {
    /// Mock accepting `token` for `device`.
    pub fn with_token(token: &str, device: DeviceInfo) -> Self {
        let mock = Self::default();
        mock.tokens.lock().insert(token.to_string(), device);
        mock
    }

    /// Payloads forwarded so far.
    pub fn processed_kinds(&self) -> Vec<&'static str> {
        self.processed
            .lock()
            .iter()
            .map(|m| m.payload.kind())
            .collect()
    }

    fn check_validation(&self) -> Result<(), TransportError> {
        if self.fail_validation.load(Ordering::SeqCst) {
            return Err(TransportError::Validation("mock failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TransportService for MockTransportService {
    async fn validate_token(&self, token: &str) -> Result<DeviceCredentialsResult, TransportError> {
        self.check_validation()?;
        Ok(match self.tokens.lock().get(token) {
            Some(device) => DeviceCredentialsResult::found(device.clone()),
            None => DeviceCredentialsResult::rejected(),
        })
    }

    async fn validate_x509(
        &self,
        fingerprint: &str,
    ) -> Result<DeviceCredentialsResult, TransportError> {
        self.check_validation()?;
        Ok(match self.certificates.lock().get(fingerprint) {
            Some(device) => DeviceCredentialsResult::found(device.clone()),
            None => DeviceCredentialsResult::rejected(),
        })
    }

    async fn get_or_create_device(
        &self,
        gateway: &DeviceInfo,
        device_name: &str,
        device_type: &str,
    ) -> Result<DeviceInfo, TransportError> {
        let mut children = self.children.lock();
        let child = children
            .entry(device_name.to_string())
            .or_insert_with(|| DeviceInfo {
                tenant_id: gateway.tenant_id,
                customer_id: gateway.customer_id,
                device_id: Uuid::new_v4(),
                device_name: device_name.to_string(),
                device_type: device_type.to_string(),
                kind: Default::default(),
            });
        Ok(child.clone())
    }

    async fn process(&self, msg: TransportToDeviceMsg) -> Result<(), TransportError> {
        if self.fail_forward.load(Ordering::SeqCst) {
            return Err(TransportError::Forward("mock failure".into()));
        }
        self.processed.lock().push(msg);
        Ok(())
    }

    async fn register_session(
        &self,
        session: &SessionInfo,
        listener: UnboundedSender<DeviceToTransportMsg>,
    ) {
        self.sessions.lock().insert(session.session_id, listener);
    }

    async fn deregister_session(&self, session: &SessionInfo) {
        self.sessions.lock().remove(&session.session_id);
        self.deregistered.lock().push(session.session_id);
    }

    fn report_activity(&self, session: &SessionInfo) {
        self.activity.lock().push(session.session_id);
    }
}
