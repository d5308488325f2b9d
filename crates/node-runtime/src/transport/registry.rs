//! Sessions connected to this node.

use crate::actors::now_millis;
use dashmap::DashMap;
use serde::Serialize;
use shared_types::{DeviceToTransportMsg, SessionInfo};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

struct SessionEntry {
    info: SessionInfo,
    listener: UnboundedSender<DeviceToTransportMsg>,
    last_activity_time: i64,
}

/// Row of the session listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session id.
    pub session_id: Uuid,
    /// Device the session speaks for.
    pub device_id: Uuid,
    /// Device name.
    pub device_name: String,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Last report, epoch milliseconds.
    pub last_activity_time: i64,
}

/// Session id to listener map.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionEntry>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a session.
    pub fn register(&self, info: &SessionInfo, listener: UnboundedSender<DeviceToTransportMsg>) {
        self.sessions.insert(
            info.session_id,
            SessionEntry {
                info: info.clone(),
                listener,
                last_activity_time: now_millis(),
            },
        );
    }

    /// Removes a session, returning it if it was registered.
    pub fn deregister(&self, session_id: Uuid) -> Option<SessionInfo> {
        self.sessions.remove(&session_id).map(|(_, entry)| entry.info)
    }

    /// Stamps the session's activity time.
    pub fn touch(&self, session_id: Uuid) {
        if let Some(mut entry) = self.sessions.get_mut(&session_id) {
            entry.last_activity_time = now_millis();
        }
    }

    /// Hands `msg` to its session. False when the session is gone.
    pub fn deliver(&self, msg: DeviceToTransportMsg) -> bool {
        let Some(entry) = self.sessions.get(&msg.session_id) else {
            return false;
        };
        entry.listener.send(msg).is_ok()
    }

    /// Registered session count.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Every session, oldest activity first.
    pub fn snapshot(&self) -> Vec<SessionSummary> {
        let mut rows: Vec<SessionSummary> = self
            .sessions
            .iter()
            .map(|entry| SessionSummary {
                session_id: entry.info.session_id,
                device_id: entry.info.device_id,
                device_name: entry.info.device_name.clone(),
                tenant_id: entry.info.tenant_id,
                last_activity_time: entry.last_activity_time,
            })
            .collect();
        rows.sort_by_key(|row| row.last_activity_time);
        rows
    }
}
