//! TOML Configuration File Support
//!
//! Client configuration is read from `~/.config/chatstream/client.toml`
//! (following `$XDG_CONFIG_HOME`) and overridden by environment variables.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! co_hosted = false
//! local_endpoint = "http://localhost:8080"
//! origin = "https://kb.example.com"
//!
//! [transport]
//! connect_timeout_ms = 10000
//! tcp_keepalive_secs = 30
//! event_buffer = 100
//!
//! [state]
//! state_file = "/home/me/.local/share/chatstream/state.json"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::RequestBuilder;

/// Default absolute endpoint when the client is not co-hosted
pub const DEFAULT_LOCAL_ENDPOINT: &str = "http://localhost:8080";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[server]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Served from the same origin as the API (paths stay relative)
    pub co_hosted: Option<bool>,
    /// Absolute API endpoint used when not co-hosted
    pub local_endpoint: Option<String>,
    /// Origin that relative paths are resolved against
    pub origin: Option<String>,
}

/// `[transport]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportToml {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
    /// TCP keep-alive interval in seconds (0 = disabled)
    pub tcp_keepalive_secs: Option<u64>,
    /// Capacity of the per-exchange event channel
    pub event_buffer: Option<usize>,
}

/// `[state]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateToml {
    /// JSON file holding persisted client state
    pub state_file: Option<PathBuf>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Server section
    pub server: ServerToml,
    /// Transport section
    pub transport: TransportToml,
    /// State section
    pub state: StateToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Served from the same origin as the API
    pub co_hosted: bool,
    /// Absolute API endpoint used when not co-hosted
    pub local_endpoint: String,
    /// Origin for resolving relative request paths
    pub origin: Option<String>,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// TCP keep-alive interval in seconds (0 = disabled)
    pub tcp_keepalive_secs: u64,
    /// Capacity of the per-exchange event channel
    pub event_buffer: usize,
    /// Persisted client state file
    pub state_file: PathBuf,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    /// Source of configuration values
    pub(crate) source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            co_hosted: false,
            local_endpoint: DEFAULT_LOCAL_ENDPOINT.to_string(),
            origin: None,
            connect_timeout_ms: 10_000,
            tcp_keepalive_secs: 30,
            event_buffer: 100,
            state_file: default_state_path(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Base URL prefixed to request paths: empty when co-hosted
    #[must_use]
    pub fn base_url(&self) -> &str {
        if self.co_hosted {
            ""
        } else {
            &self.local_endpoint
        }
    }

    /// A request builder for this deployment
    #[must_use]
    pub fn request_builder(&self) -> RequestBuilder {
        RequestBuilder::new(self.base_url())
    }

    /// Check the values for consistency
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for an unusable endpoint or
    /// an empty event buffer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.co_hosted
            && !(self.local_endpoint.starts_with("http://")
                || self.local_endpoint.starts_with("https://"))
        {
            return Err(ConfigError::ValidationError(format!(
                "local_endpoint must be an http(s) URL, got {:?}",
                self.local_endpoint
            )));
        }
        if self.co_hosted && self.origin.is_none() {
            return Err(ConfigError::ValidationError(
                "co_hosted requires origin: relative request paths need a page origin".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "event_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/chatstream/client.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chatstream").join("client.toml"))
}

/// Get the default state file path
///
/// Returns `$XDG_DATA_HOME/chatstream/state.json`, falling back to the
/// working directory.
#[must_use]
pub fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("chatstream"))
        .unwrap_or_default()
        .join("state.json")
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the result fails validation. A missing config file is not an error.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the result fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ClientToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok());
    config.validate()?;

    Ok(config)
}

fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    if let Some(co_hosted) = toml.server.co_hosted {
        config.co_hosted = co_hosted;
    }
    if let Some(ref endpoint) = toml.server.local_endpoint {
        config.local_endpoint = endpoint.clone();
    }
    if toml.server.origin.is_some() {
        config.origin = toml.server.origin.clone();
    }

    if let Some(timeout) = toml.transport.connect_timeout_ms {
        config.connect_timeout_ms = timeout;
    }
    if let Some(keepalive) = toml.transport.tcp_keepalive_secs {
        config.tcp_keepalive_secs = keepalive;
    }
    if let Some(buffer) = toml.transport.event_buffer {
        config.event_buffer = buffer;
    }

    if let Some(ref state_file) = toml.state.state_file {
        config.state_file = state_file.clone();
    }
}

/// Apply environment overrides, reading variables through `var`
fn apply_env_config(config: &mut ClientConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(co_hosted) = var("CHATSTREAM_CO_HOSTED") {
        config.co_hosted = co_hosted != "0" && co_hosted.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
    if let Some(endpoint) = var("CHATSTREAM_LOCAL_ENDPOINT") {
        config.local_endpoint = endpoint;
        config.source = ConfigSource::Env;
    }
    if let Some(origin) = var("CHATSTREAM_ORIGIN") {
        config.origin = Some(origin);
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = var("CHATSTREAM_CONNECT_TIMEOUT") {
        if let Ok(ms) = timeout.parse::<u64>() {
            config.connect_timeout_ms = ms;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(state_file) = var("CHATSTREAM_STATE_FILE") {
        config.state_file = PathBuf::from(state_file);
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Co-hosted override
    pub co_hosted: Option<bool>,
    /// Local endpoint override
    pub local_endpoint: Option<String>,
    /// Origin override
    pub origin: Option<String>,
    /// State file override
    pub state_file: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set local endpoint override
    #[must_use]
    pub fn with_local_endpoint(mut self, endpoint: String) -> Self {
        self.local_endpoint = Some(endpoint);
        self
    }

    /// Set state file override
    #[must_use]
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = Some(path);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ClientConfig) {
        if self.co_hosted.is_some()
            || self.local_endpoint.is_some()
            || self.origin.is_some()
            || self.state_file.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(co_hosted) = self.co_hosted {
            config.co_hosted = co_hosted;
        }
        if let Some(ref endpoint) = self.local_endpoint {
            config.local_endpoint = endpoint.clone();
        }
        if self.origin.is_some() {
            config.origin = self.origin.clone();
        }
        if let Some(ref path) = self.state_file {
            config.state_file = path.clone();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(!config.co_hosted);
        assert_eq!(config.base_url(), "http://localhost:8080");
        assert_eq!(config.event_buffer, 100);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_co_hosted_base_is_relative() {
        let config = ClientConfig {
            co_hosted: true,
            ..Default::default()
        };
        assert_eq!(config.base_url(), "");
        assert_eq!(config.request_builder().base(), "");
    }

    #[test]
    fn test_parse_toml() {
        let toml_content = r#"
[server]
local_endpoint = "http://kb.internal:9000"
origin = "https://kb.example.com"

[transport]
connect_timeout_ms = 2500
event_buffer = 16

[state]
state_file = "/tmp/kb-state.json"
"#;
        let config: ClientToml = toml::from_str(toml_content).unwrap();
        let mut resolved = ClientConfig::default();
        apply_toml_config(&mut resolved, &config);

        assert_eq!(resolved.base_url(), "http://kb.internal:9000");
        assert_eq!(resolved.origin.as_deref(), Some("https://kb.example.com"));
        assert_eq!(resolved.connect_timeout_ms, 2500);
        assert_eq!(resolved.event_buffer, 16);
        assert_eq!(resolved.tcp_keepalive_secs, 30);
        assert_eq!(resolved.state_file, PathBuf::from("/tmp/kb-state.json"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file
            .write_all(b"[server]\nco_hosted = true\norigin = \"https://kb.example.com\"\n")
            .unwrap();

        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.config_file_path.as_deref(), Some(file.path()));
        assert!(matches!(
            config.source(),
            ConfigSource::File | ConfigSource::Env
        ));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[server\nco_hosted = ").unwrap();

        let result = load_config_from_path(Some(file.path().to_path_buf()));
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from_path(Some(dir.path().join("nope.toml"))).unwrap();
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("CHATSTREAM_CO_HOSTED", "true"),
            ("CHATSTREAM_CONNECT_TIMEOUT", "not-a-number"),
            ("CHATSTREAM_STATE_FILE", "/var/lib/kb/state.json"),
        ]
        .into_iter()
        .collect();

        let mut config = ClientConfig::default();
        apply_toml_config(
            &mut config,
            &toml::from_str("[server]\nco_hosted = false\n").unwrap(),
        );
        apply_env_config(&mut config, |k| env.get(k).map(|v| (*v).to_string()));

        assert!(config.co_hosted);
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.state_file, PathBuf::from("/var/lib/kb/state.json"));
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_validation() {
        let config = ClientConfig {
            local_endpoint: "localhost:8080".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let config = ClientConfig {
            event_buffer: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_co_hosted_requires_origin() {
        let config = ClientConfig {
            co_hosted: true,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(ref msg)) if msg.contains("origin")
        ));

        let config = ClientConfig {
            co_hosted: true,
            origin: Some("https://kb.example.com".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_co_hosted_file_without_origin_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[server]\nco_hosted = true\n").unwrap();

        let result = load_config_from_path(Some(file.path().to_path_buf()));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = ClientConfig::default();
        ConfigOverrides::new()
            .with_local_endpoint("https://kb.example.com".to_string())
            .with_state_file(PathBuf::from("/tmp/s.json"))
            .apply(&mut config);

        assert_eq!(config.base_url(), "https://kb.example.com");
        assert_eq!(config.state_file, PathBuf::from("/tmp/s.json"));
        assert_eq!(config.source(), ConfigSource::Cli);

        let mut config = ClientConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }
}
