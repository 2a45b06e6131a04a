//! Configuration module.
//!
//! Loads configuration from TOML files with environment variable
//! substitution.
//!
//! # Example
//!
//! ```toml
//! [server]
//! port = 8080
//!
//! [broker]
//! url = "${BROKER_URL}"
//!
//! [dispatch]
//! log_strategy = "rpc"
//!
//! [listener]
//! patterns = ["log.INFO", "log.ERROR", "log.WARNING"]
//! ```

use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Which adapter serves the log action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogStrategy {
    Http,
    #[default]
    Rpc,
    Grpc,
    Queue,
}

impl fmt::Display for LogStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogStrategy::Http => "http",
            LogStrategy::Rpc => "rpc",
            LogStrategy::Grpc => "grpc",
            LogStrategy::Queue => "queue",
        };
        f.write_str(s)
    }
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub targets: TargetsConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub listener: ListenerConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

/// Broker configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_url")]
    pub url: String,

    /// Startup connection attempt cap; exceeding it is fatal
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            connect_attempts: default_connect_attempts(),
        }
    }
}

fn default_broker_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_connect_attempts() -> u32 {
    5
}

/// Downstream target addresses
#[derive(Debug, Deserialize, Clone)]
pub struct TargetsConfig {
    #[serde(default = "default_auth_url")]
    pub auth: String,

    #[serde(default = "default_logger_url")]
    pub logger: String,

    #[serde(default = "default_mailer_url")]
    pub mailer: String,

    /// host:port of the classic RPC surface
    #[serde(default = "default_logger_rpc")]
    pub logger_rpc: String,

    /// URI of the typed log service
    #[serde(default = "default_logger_grpc")]
    pub logger_grpc: String,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            auth: default_auth_url(),
            logger: default_logger_url(),
            mailer: default_mailer_url(),
            logger_rpc: default_logger_rpc(),
            logger_grpc: default_logger_grpc(),
        }
    }
}

fn default_auth_url() -> String {
    "http://auth-service/authenticate".to_string()
}

fn default_logger_url() -> String {
    "http://logger-service/log".to_string()
}

fn default_mailer_url() -> String {
    "http://mailer-service/send".to_string()
}

fn default_logger_rpc() -> String {
    "logger-service:5001".to_string()
}

fn default_logger_grpc() -> String {
    "http://logger-service:50001".to_string()
}

/// Dispatch configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    #[serde(default)]
    pub log_strategy: LogStrategy,

    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    #[serde(default = "default_grpc_deadline_ms")]
    pub grpc_deadline_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            log_strategy: LogStrategy::default(),
            http_timeout_ms: default_http_timeout_ms(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            grpc_deadline_ms: default_grpc_deadline_ms(),
        }
    }
}

fn default_http_timeout_ms() -> u64 {
    10000
}

fn default_rpc_timeout_ms() -> u64 {
    10000
}

fn default_grpc_deadline_ms() -> u64 {
    1000
}

/// Listener configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ListenerConfig {
    #[serde(default)]
    pub name: Option<String>,

    /// Routing-key patterns bound on the exchange
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,

    /// Bound on concurrently running event handlers
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            name: None,
            patterns: default_patterns(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

fn default_patterns() -> Vec<String> {
    vec![
        "log.INFO".to_string(),
        "log.ERROR".to_string(),
        "log.WARNING".to_string(),
    ]
}

fn default_max_in_flight() -> usize {
    64
}

impl RelayConfig {
    /// Load configuration from the default path or RELAY_CONFIG env var.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            env::var("RELAY_CONFIG").unwrap_or_else(|_| "config/relay.toml".to_string());

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            info!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        let content = substitute_env_vars(&content);

        let config: RelayConfig = toml::from_str(&content)?;

        config.validate()?;

        info!(
            log_strategy = %config.dispatch.log_strategy,
            patterns = config.listener.patterns.len(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("auth", &self.targets.auth),
            ("logger", &self.targets.logger),
            ("mailer", &self.targets.mailer),
            ("logger_grpc", &self.targets.logger_grpc),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "Target '{}' must start with http:// or https://",
                    name
                )));
            }
        }

        if self.targets.logger_rpc.is_empty() {
            return Err(ConfigError::ValidationError(
                "Target 'logger_rpc' must not be empty".to_string(),
            ));
        }

        if self.broker.connect_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "broker.connect_attempts must be at least 1".to_string(),
            ));
        }

        if self.listener.patterns.is_empty()
            || self.listener.patterns.iter().any(|p| p.is_empty())
        {
            return Err(ConfigError::ValidationError(
                "listener.patterns must contain non-empty routing keys".to_string(),
            ));
        }

        if self.listener.max_in_flight == 0 {
            return Err(ConfigError::ValidationError(
                "listener.max_in_flight must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                caps[0].to_string()
            }
        }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("RELAY_TEST_VAR", "nats://broker:4222");
        let input = "url = \"${RELAY_TEST_VAR}\"";
        let output = substitute_env_vars(input);
        assert_eq!(output, "url = \"nats://broker:4222\"");
        env::remove_var("RELAY_TEST_VAR");
    }

    #[test]
    fn test_env_var_not_set() {
        let input = "url = \"${RELAY_NONEXISTENT_VAR}\"";
        let output = substitute_env_vars(input);
        assert_eq!(output, "url = \"${RELAY_NONEXISTENT_VAR}\"");
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.broker.url, "nats://localhost:4222");
        assert_eq!(config.broker.connect_attempts, 5);
        assert_eq!(config.dispatch.log_strategy, LogStrategy::Rpc);
        assert_eq!(config.listener.patterns.len(), 3);
        assert_eq!(config.listener.max_in_flight, 64);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [server]
            port = 9000
        "#;

        let config: RelayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.broker.url, "nats://localhost:4222");
    }

    #[test]
    fn test_parse_log_strategy() {
        for (raw, expected) in [
            ("http", LogStrategy::Http),
            ("rpc", LogStrategy::Rpc),
            ("grpc", LogStrategy::Grpc),
            ("queue", LogStrategy::Queue),
        ] {
            let toml = format!("[dispatch]\nlog_strategy = \"{raw}\"");
            let config: RelayConfig = toml::from_str(&toml).unwrap();
            assert_eq!(config.dispatch.log_strategy, expected);
        }

        assert!(toml::from_str::<RelayConfig>("[dispatch]\nlog_strategy = \"carrier-pigeon\"")
            .is_err());
    }

    #[test]
    fn test_parse_listener_section() {
        let toml = r#"
            [listener]
            patterns = ["log.ERROR"]
            max_in_flight = 8
        "#;

        let config: RelayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.listener.patterns, vec!["log.ERROR".to_string()]);
        assert_eq!(config.listener.max_in_flight, 8);
    }

    #[test]
    fn test_validation_rejects_bad_target() {
        let toml = r#"
            [targets]
            auth = "auth-service/authenticate"
        "#;

        let config: RelayConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_patterns() {
        let toml = r#"
            [listener]
            patterns = []
        "#;

        let config: RelayConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let toml = r#"
            [listener]
            max_in_flight = 0
        "#;

        let config: RelayConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }
}
