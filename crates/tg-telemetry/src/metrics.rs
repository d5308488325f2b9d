//! Prometheus metrics for the gateway.
//!
//! All metrics follow the naming convention: `tg_<subsystem>_<metric>`

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CLUSTER ROUTING METRICS (Subsystem 1)
    // =========================================================================

    /// Ring members by server type
    pub static ref RING_MEMBERS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("tg_routing_ring_members", "Servers present in the hash ring"),
        &["server_type"]
    ).expect("metric creation failed");

    /// Routing decisions
    pub static ref ROUTING_DECISIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("tg_routing_decisions_total", "Envelopes routed by outcome"),
        &["outcome"]  // outcome: local/remote/failed
    ).expect("metric creation failed");

    /// Envelopes exchanged with other nodes
    pub static ref CLUSTER_RPC_MESSAGES: IntCounterVec = IntCounterVec::new(
        Opts::new("tg_routing_rpc_messages_total", "Cluster RPC envelopes"),
        &["direction", "outcome"]  // direction: sent/received, outcome: ok/error
    ).expect("metric creation failed");

    // =========================================================================
    // MQTT TRANSPORT METRICS (Subsystem 2)
    // =========================================================================

    /// Open TCP connections
    pub static ref ACTIVE_CONNECTIONS: IntGauge = IntGauge::new(
        "tg_transport_active_connections",
        "Open MQTT connections"
    ).expect("metric creation failed");

    /// Registered device sessions, gateway children included
    pub static ref ACTIVE_SESSIONS: IntGauge = IntGauge::new(
        "tg_transport_active_sessions",
        "Device sessions registered on this node"
    ).expect("metric creation failed");

    // =========================================================================
    // RATE LIMIT METRICS (Subsystem 3)
    // =========================================================================

    /// Rejected requests
    pub static ref RATE_LIMIT_REJECTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("tg_ratelimit_rejections_total", "Requests rejected by rate limits"),
        &["entity_type"]  // entity_type: TENANT/CUSTOMER
    ).expect("metric creation failed");

    // =========================================================================
    // BATCH QUEUE METRICS (Subsystem 4)
    // =========================================================================

    /// Queue item outcomes
    pub static ref QUEUE_ITEMS: IntCounterVec = IntCounterVec::new(
        Opts::new("tg_queue_items_total", "Items handled by persistence queues"),
        &["queue", "outcome"]  // outcome: added/saved/failed
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry. Safe to call twice.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Routing
        Box::new(RING_MEMBERS.clone()),
        Box::new(ROUTING_DECISIONS.clone()),
        Box::new(CLUSTER_RPC_MESSAGES.clone()),
        // Transport
        Box::new(ACTIVE_CONNECTIONS.clone()),
        Box::new(ACTIVE_SESSIONS.clone()),
        // Rate limits
        Box::new(RATE_LIMIT_REJECTIONS.clone()),
        // Queues
        Box::new(QUEUE_ITEMS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_twice() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_encoded_output_names_metrics() {
        register_metrics().unwrap();
        QUEUE_ITEMS.with_label_values(&["ts", "saved"]).inc_by(3);
        RING_MEMBERS.with_label_values(&["CORE"]).set(2);

        let text = encode_metrics().unwrap();
        assert!(text.contains("tg_queue_items_total{outcome=\"saved\",queue=\"ts\"}"));
        assert!(text.contains("tg_routing_ring_members{server_type=\"CORE\"} 2"));
    }

    #[test]
    fn test_gauge_set() {
        ACTIVE_CONNECTIONS.set(42);
        assert_eq!(ACTIVE_CONNECTIONS.get(), 42);
    }
}
