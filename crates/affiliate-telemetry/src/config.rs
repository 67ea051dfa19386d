//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to startup logs
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "affiliate-service".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SERVICE_NAME`: Service name (default: affiliate-service)
    /// - `AFFILIATE_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `AFFILIATE_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `AFFILIATE_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "affiliate-service".to_string()),

            log_level: env::var("AFFILIATE_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("AFFILIATE_CONSOLE_OUTPUT")
                .map(|v| !v.eq_ignore_ascii_case("false") && v != "0")
                .unwrap_or(true),

            json_logs: env::var("AFFILIATE_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(is_container),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "affiliate-service");
        assert_eq!(config.log_level, "info");
        assert!(config.console_output);
        assert!(!config.json_logs);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("yes"));
        assert!(!parse_flag("false"));
    }
}
