//! # Telemetry
//!
//! Observability for the gateway node.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with an `EnvFilter`, plain or JSON output
//! - **Metrics**: Prometheus registry rendered by `GET /metrics`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tg_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> Result<(), tg_telemetry::TelemetryError> {
//!     init_telemetry(&TelemetryConfig::from_env())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TG_SERVICE_NAME` | `telemetry-gateway` | Service name in log lines |
//! | `TG_LOG_LEVEL` | `info` | Log filter, falls back to `RUST_LOG` |
//! | `TG_JSON_LOGS` | `false` (`true` in containers) | JSON formatted logs |

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, ACTIVE_CONNECTIONS, ACTIVE_SESSIONS, CLUSTER_RPC_MESSAGES,
    QUEUE_ITEMS, RATE_LIMIT_REJECTIONS, RING_MEMBERS, ROUTING_DECISIONS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The log filter could not be parsed.
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// A global subscriber was already installed.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Registering or encoding metrics failed.
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Registers the metrics, then installs the log subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_logging(config)?;
    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Telemetry initialized"
    );
    Ok(())
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_inc_macro() {
        metric_inc!(ROUTING_DECISIONS, &["local"]);
        assert!(ROUTING_DECISIONS.with_label_values(&["local"]).get() >= 1);
    }
}
