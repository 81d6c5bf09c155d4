//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Node identifier, for telling runtimes apart in shared logs
    pub node_id: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive
    pub log_level: String,

    /// Whether to write logs to stdout
    pub console_output: bool,

    /// Whether to format logs as JSON
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "mal-runtime".to_string(),
            node_id: "local".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

fn flag(value: &str) -> bool {
    let value = value.to_lowercase();
    value == "true" || value == "1"
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OTEL_SERVICE_NAME`: Service name (default: mal-runtime)
    /// - `MAL_NODE_ID`: Node identifier (default: local)
    /// - `MAL_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `MAL_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `MAL_JSON_LOGS`: Enable JSON logs (default: true in containers)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();
        let defaults = Self::default();

        Self {
            service_name: env::var("OTEL_SERVICE_NAME").unwrap_or(defaults.service_name),

            node_id: env::var("MAL_NODE_ID").unwrap_or(defaults.node_id),

            log_level: env::var("MAL_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            console_output: env::var("MAL_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: env::var("MAL_JSON_LOGS")
                .map(|v| flag(&v))
                .unwrap_or(is_container),
        }
    }

    /// Configuration for a named node.
    pub fn for_node(node_id: &str) -> Self {
        let mut config = Self::from_env();
        config.node_id = node_id.to_string();
        config
    }

    /// Service name including the node, unless it is the default node.
    pub fn full_service_name(&self) -> String {
        if self.node_id == "local" {
            self.service_name.clone()
        } else {
            format!("{}-{}", self.service_name, self.node_id)
        }
    }
}
