//! Where device actors send replies.

use parking_lot::Mutex;
use shared_types::{SessionInfo, ToTransportMsg};
use uuid::Uuid;

/// Delivers a message to the session that owns a connection, wherever that
/// session lives in the cluster.
pub trait ReplySink: Send + Sync {
    /// Sends `msg` to `session`. Unknown sessions drop the message.
    fn deliver(&self, session: &SessionInfo, msg: ToTransportMsg);
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Mock sink recording every reply.
#[derive(Default)]
pub struct MockReplySink {
    /// Session id and message, in order.
    pub delivered: Mutex<Vec<(Uuid, ToTransportMsg)>>,
}

impl ReplySink for MockReplySink {
    fn deliver(&self, session: &SessionInfo, msg: ToTransportMsg) {
        self.delivered.lock().push((session.session_id, msg));
    }
}
