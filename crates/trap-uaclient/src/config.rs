// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client runtime configuration.
//!
//! All limits that govern a connection (reconnect interval, container
//! capacity, connection count) are explicit fields fixed at construction.
//!
//! # Loading Pipeline
//!
//! 1. Parse a YAML/TOML/JSON file (format chosen by extension)
//! 2. Apply environment variable overrides
//! 3. Validate
//!
//! ```text
//! TRAP_UA_ENDPOINT=opc.tcp://plc-1:4840
//! TRAP_UA_RECONNECT_INTERVAL=10s
//! TRAP_UA_CONTAINER_CAPACITY=5000
//! TRAP_UA_MAX_CONNECTIONS=8
//! ```
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use trap_uaclient::config::ClientConfig;
//!
//! let config = ClientConfig::builder()
//!     .endpoint("opc.tcp://localhost:4840")
//!     .reconnect_interval(Duration::from_secs(5))
//!     .container_capacity(10_000)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.max_connections, 20);
//! ```

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigurationError, UaClientError, UaClientResult};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "TRAP_UA";

// =============================================================================
// ClientConfig
// =============================================================================

/// Configuration shared by the registry and every connection it creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server endpoint URL (e.g., "opc.tcp://localhost:4840").
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Prefix for session names; the session is named `{prefix}.{name}`.
    #[serde(default = "default_session_name_prefix")]
    pub session_name_prefix: String,

    /// Retry interval handed to the session layer when reconnecting.
    #[serde(default = "default_reconnect_interval")]
    #[serde(with = "humantime_serde")]
    pub reconnect_interval: Duration,

    /// Maximum monitored points per subscription container.
    #[serde(default = "default_container_capacity")]
    pub container_capacity: usize,

    /// Maximum concurrent connections held by a registry.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Session settings.
    #[serde(default)]
    pub session: SessionSettings,

    /// Subscription container settings.
    #[serde(default)]
    pub container: ContainerSettings,

    /// Monitored point settings.
    #[serde(default)]
    pub point: PointSettings,

    /// Capacity of the state-changed and error broadcast streams.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_endpoint() -> String {
    "opc.tcp://localhost:4840".to_string()
}

fn default_session_name_prefix() -> String {
    "TRAP.Worker".to_string()
}

fn default_reconnect_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_container_capacity() -> usize {
    10_000
}

fn default_max_connections() -> usize {
    20
}

fn default_event_capacity() -> usize {
    256
}

impl ClientConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Creates a configuration with just the endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Returns the full session name for a logical name.
    pub fn session_name(&self, name: &str) -> String {
        if self.session_name_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.session_name_prefix, name)
        }
    }

    /// Validates this configuration.
    pub fn validate(&self) -> Result<(), UaClientError> {
        if self.endpoint.is_empty() {
            return Err(ConfigurationError::missing_field("endpoint").into());
        }
        if !self.endpoint.starts_with("opc.tcp://") {
            return Err(ConfigurationError::invalid_endpoint(
                &self.endpoint,
                "Endpoint must start with opc.tcp://",
            )
            .into());
        }
        if self.reconnect_interval.is_zero() {
            return Err(ConfigurationError::invalid_value(
                "reconnect_interval",
                "must be greater than 0",
            )
            .into());
        }
        if self.container_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "container_capacity",
                "must be greater than 0",
            )
            .into());
        }
        if self.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "max_connections",
                "must be greater than 0",
            )
            .into());
        }
        if self.event_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "event_capacity",
                "must be greater than 0",
            )
            .into());
        }
        if self.session.session_timeout.is_zero() {
            return Err(ConfigurationError::invalid_value(
                "session.session_timeout",
                "must be greater than 0",
            )
            .into());
        }
        if self.container.publishing_interval.is_zero() {
            return Err(ConfigurationError::invalid_value(
                "container.publishing_interval",
                "must be greater than 0",
            )
            .into());
        }
        Ok(())
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Loads, overrides from the environment, and validates a config file.
    ///
    /// The format is determined by the file extension:
    /// `.yaml`/`.yml`, `.toml` or `.json`.
    pub fn from_file(path: impl AsRef<Path>) -> UaClientResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading client configuration");

        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: ClientConfig = parse_str(&content, format)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration content without touching the
    /// environment.
    pub fn from_str_format(content: &str, format: ConfigFormat) -> UaClientResult<Self> {
        let config: ClientConfig = parse_str(content, format)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `TRAP_UA_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> UaClientResult<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup keyed by variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> UaClientResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = |name: &str| format!("{}_{}", ENV_PREFIX, name);

        if let Some(value) = lookup(&key("ENDPOINT")) {
            debug!(endpoint = %value, "Endpoint overridden from environment");
            self.endpoint = value;
        }
        if let Some(value) = lookup(&key("RECONNECT_INTERVAL")) {
            self.reconnect_interval = humantime_serde::re::humantime::parse_duration(&value).map_err(|e| {
                ConfigurationError::invalid_value(key("RECONNECT_INTERVAL"), e.to_string())
            })?;
        }
        if let Some(value) = lookup(&key("CONTAINER_CAPACITY")) {
            self.container_capacity = value.parse().map_err(|_| {
                ConfigurationError::invalid_value(key("CONTAINER_CAPACITY"), "expected a number")
            })?;
        }
        if let Some(value) = lookup(&key("MAX_CONNECTIONS")) {
            self.max_connections = value.parse().map_err(|_| {
                ConfigurationError::invalid_value(key("MAX_CONNECTIONS"), "expected a number")
            })?;
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            session_name_prefix: default_session_name_prefix(),
            reconnect_interval: default_reconnect_interval(),
            container_capacity: default_container_capacity(),
            max_connections: default_max_connections(),
            session: SessionSettings::default(),
            container: ContainerSettings::default(),
            point: PointSettings::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

// =============================================================================
// ClientConfigBuilder
// =============================================================================

/// Builder for `ClientConfig`.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    endpoint: Option<String>,
    session_name_prefix: Option<String>,
    reconnect_interval: Option<Duration>,
    container_capacity: Option<usize>,
    max_connections: Option<usize>,
    session: Option<SessionSettings>,
    container: Option<ContainerSettings>,
    point: Option<PointSettings>,
    event_capacity: Option<usize>,
}

impl ClientConfigBuilder {
    /// Sets the server endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the session name prefix.
    pub fn session_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.session_name_prefix = Some(prefix.into());
        self
    }

    /// Sets the reconnect retry interval.
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = Some(interval);
        self
    }

    /// Sets the per-container point capacity.
    pub fn container_capacity(mut self, capacity: usize) -> Self {
        self.container_capacity = Some(capacity);
        self
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Sets the session settings.
    pub fn session(mut self, settings: SessionSettings) -> Self {
        self.session = Some(settings);
        self
    }

    /// Sets the container settings.
    pub fn container(mut self, settings: ContainerSettings) -> Self {
        self.container = Some(settings);
        self
    }

    /// Sets the point settings.
    pub fn point(mut self, settings: PointSettings) -> Self {
        self.point = Some(settings);
        self
    }

    /// Sets the event stream capacity.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<ClientConfig, UaClientError> {
        let config = ClientConfig {
            endpoint: self.endpoint.unwrap_or_else(default_endpoint),
            session_name_prefix: self
                .session_name_prefix
                .unwrap_or_else(default_session_name_prefix),
            reconnect_interval: self
                .reconnect_interval
                .unwrap_or_else(default_reconnect_interval),
            container_capacity: self
                .container_capacity
                .unwrap_or_else(default_container_capacity),
            max_connections: self.max_connections.unwrap_or_else(default_max_connections),
            session: self.session.unwrap_or_default(),
            container: self.container.unwrap_or_default(),
            point: self.point.unwrap_or_default(),
            event_capacity: self.event_capacity.unwrap_or_else(default_event_capacity),
        };

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// SessionSettings
// =============================================================================

/// Settings passed to the session layer when a session is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Timeout for individual service calls.
    #[serde(default = "default_operation_timeout")]
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Requested session timeout.
    #[serde(default = "default_session_timeout")]
    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Keep-alive interval.
    #[serde(default = "default_keep_alive_interval")]
    #[serde(with = "humantime_serde")]
    pub keep_alive_interval: Duration,
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_keep_alive_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            operation_timeout: default_operation_timeout(),
            session_timeout: default_session_timeout(),
            keep_alive_interval: default_keep_alive_interval(),
        }
    }
}

// =============================================================================
// ContainerSettings
// =============================================================================

/// Settings for server-side subscription containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSettings {
    /// Publishing interval.
    #[serde(default = "default_publishing_interval")]
    #[serde(with = "humantime_serde")]
    pub publishing_interval: Duration,

    /// Priority (0-255, higher is more important).
    #[serde(default = "default_priority")]
    pub priority: u8,

    /// Publishing enabled.
    #[serde(default = "default_true")]
    pub publishing_enabled: bool,
}

fn default_publishing_interval() -> Duration {
    Duration::from_millis(10)
}

fn default_priority() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            publishing_interval: default_publishing_interval(),
            priority: default_priority(),
            publishing_enabled: true,
        }
    }
}

// =============================================================================
// PointSettings
// =============================================================================

/// Settings for monitored points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSettings {
    /// Sampling interval.
    #[serde(default = "default_sampling_interval")]
    #[serde(with = "humantime_serde")]
    pub sampling_interval: Duration,

    /// Server-side queue size.
    #[serde(default)]
    pub queue_size: u32,

    /// Discard policy when the queue is full.
    #[serde(default = "default_true")]
    pub discard_oldest: bool,
}

fn default_sampling_interval() -> Duration {
    Duration::from_millis(10)
}

impl Default for PointSettings {
    fn default() -> Self {
        Self {
            sampling_interval: default_sampling_interval(),
            queue_size: 0,
            discard_oldest: true,
        }
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> Result<Self, ConfigurationError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigurationError::invalid_value(
                "format",
                format!("unsupported extension '{}'", other),
            )),
            None => Err(ConfigurationError::invalid_value("format", "no file extension")),
        }
    }

    /// Returns the format name.
    pub fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

fn parse_str<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> UaClientResult<T> {
    let parsed = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| ConfigurationError::parse(format.name(), e))?,
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigurationError::parse(format.name(), e))?
        }
        ConfigFormat::Json => serde_json::from_str(content)
            .map_err(|e| ConfigurationError::parse(format.name(), e))?,
    };
    Ok(parsed)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, "opc.tcp://localhost:4840");
        assert_eq!(config.reconnect_interval, Duration::from_secs(5));
        assert_eq!(config.container_capacity, 10_000);
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.container.publishing_interval, Duration::from_millis(10));
        assert_eq!(config.container.priority, 1);
        assert_eq!(config.point.queue_size, 0);
        assert!(config.point.discard_oldest);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_name() {
        let config = ClientConfig::default();
        assert_eq!(config.session_name("line1"), "TRAP.Worker.line1");

        let bare = ClientConfig::builder().session_name_prefix("").build().unwrap();
        assert_eq!(bare.session_name("line1"), "line1");
    }

    #[test]
    fn test_builder_validation() {
        assert!(ClientConfig::builder().endpoint("http://x").build().is_err());
        assert!(ClientConfig::builder().container_capacity(0).build().is_err());
        assert!(ClientConfig::builder().max_connections(0).build().is_err());
        assert!(ClientConfig::builder()
            .reconnect_interval(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
endpoint: "opc.tcp://plc:4840"
reconnect_interval: 2s
container_capacity: 2
container:
  publishing_interval: 250ms
"#;
        let config = ClientConfig::from_str_format(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.endpoint, "opc.tcp://plc:4840");
        assert_eq!(config.reconnect_interval, Duration::from_secs(2));
        assert_eq!(config.container_capacity, 2);
        assert_eq!(config.container.publishing_interval, Duration::from_millis(250));
        assert_eq!(config.max_connections, 20);
    }

    #[test]
    fn test_parse_toml_and_json() {
        let toml = r#"
endpoint = "opc.tcp://plc:4840"
max_connections = 4
"#;
        let config = ClientConfig::from_str_format(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.max_connections, 4);

        let json = r#"{"endpoint": "opc.tcp://plc:4840", "reconnect_interval": "1m"}"#;
        let config = ClientConfig::from_str_format(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.reconnect_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_parse_invalid_content() {
        let err = ClientConfig::from_str_format("endpoint: [", ConfigFormat::Yaml).unwrap_err();
        assert_eq!(err.category(), "configuration");

        let err = ClientConfig::from_str_format(r#"{"container_capacity": 0}"#, ConfigFormat::Json)
            .unwrap_err();
        assert!(err.to_string().contains("container_capacity"));
    }

    #[test]
    fn test_from_file() {
        let mut file = Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "endpoint: \"opc.tcp://file-host:4840\"").unwrap();
        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.container_capacity, 10_000);

        let unknown = Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(ClientConfig::from_file(unknown.path()).is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TRAP_UA_ENDPOINT", "opc.tcp://override:4840"),
            ("TRAP_UA_RECONNECT_INTERVAL", "10s"),
            ("TRAP_UA_CONTAINER_CAPACITY", "500"),
        ]
        .into_iter()
        .collect();

        let mut config = ClientConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.endpoint, "opc.tcp://override:4840");
        assert_eq!(config.reconnect_interval, Duration::from_secs(10));
        assert_eq!(config.container_capacity, 500);
        assert_eq!(config.max_connections, 20);

        let mut config = ClientConfig::default();
        let err = config
            .apply_overrides(|key| (key == "TRAP_UA_MAX_CONNECTIONS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("TRAP_UA_MAX_CONNECTIONS"));
    }
}
