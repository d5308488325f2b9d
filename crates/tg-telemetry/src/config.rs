//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to the startup line
    pub service_name: String,

    /// `EnvFilter` directive (trace, debug, info, `tg_02_mqtt_transport=debug`, ...)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "telemetry-gateway".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TG_SERVICE_NAME`: Service name (default: telemetry-gateway)
    /// - `TG_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `TG_JSON_LOGS`: JSON logs (default: false in dev, true in containers)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self::from_lookup(|name| env::var(name).ok(), is_container)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>, is_container: bool) -> Self {
        let defaults = Self::default();
        Self {
            service_name: lookup("TG_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: lookup("TG_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log_level),
            json_logs: lookup("TG_JSON_LOGS")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(is_container),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "telemetry-gateway");
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
    }

    #[test]
    fn test_log_level_prefers_tg_variable() {
        let config = TelemetryConfig::from_lookup(
            lookup(&[("TG_LOG_LEVEL", "debug"), ("RUST_LOG", "warn")]),
            false,
        );
        assert_eq!(config.log_level, "debug");

        let config = TelemetryConfig::from_lookup(lookup(&[("RUST_LOG", "warn")]), false);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_json_logs_follow_container_unless_set() {
        assert!(TelemetryConfig::from_lookup(lookup(&[]), true).json_logs);
        assert!(!TelemetryConfig::from_lookup(lookup(&[("TG_JSON_LOGS", "false")]), true).json_logs);
        assert!(TelemetryConfig::from_lookup(lookup(&[("TG_JSON_LOGS", "1")]), false).json_logs);
    }
}
