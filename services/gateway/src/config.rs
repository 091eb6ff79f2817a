//! Gateway configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: `/etc/thingbridge/gateway.toml`.
//!
//! # Required fields
//! - `schema_version = 1`
//! - `cloud.base_url`

use serde::Deserialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Config types (deserialized from TOML)
// ---------------------------------------------------------------------------

/// Top-level gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub schema_version: u32,
    pub socket: SocketConfig,
    pub cloud: CloudConfig,
}

#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Unix socket path the things connect to.
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (with Option for optional fields)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    socket: Option<RawSocketConfig>,
    cloud: Option<RawCloudConfig>,
}

#[derive(Debug, Deserialize)]
struct RawSocketConfig {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCloudConfig {
    base_url: Option<String>,
    timeout_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load gateway config from a custom path.
pub fn load_config_from_path(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

/// Load gateway config from the default path `/etc/thingbridge/gateway.toml`.
pub fn load_config() -> Result<GatewayConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/thingbridge/gateway.toml"))
}

/// Load gateway config from a TOML string.
pub fn load_config_from_str(toml_str: &str) -> Result<GatewayConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    // Validate schema_version
    let schema_version = raw
        .schema_version
        .ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!(
            "schema_version must be 1, got {}",
            schema_version
        )));
    }

    // Socket defaults
    let socket = match raw.socket {
        Some(s) => SocketConfig {
            path: s
                .path
                .unwrap_or_else(|| "/run/thingbridge/gateway.sock".to_owned()),
        },
        None => SocketConfig {
            path: "/run/thingbridge/gateway.sock".to_owned(),
        },
    };

    // Validate cloud
    let raw_cloud = raw
        .cloud
        .ok_or_else(|| ConfigError::MissingField("cloud".to_owned()))?;
    let base_url = raw_cloud
        .base_url
        .ok_or_else(|| ConfigError::MissingField("cloud.base_url".to_owned()))?;
    if base_url.is_empty() {
        return Err(ConfigError::InvalidValue(
            "cloud.base_url must not be empty".to_owned(),
        ));
    }
    let timeout_ms = raw_cloud.timeout_ms.unwrap_or(5000);
    if timeout_ms == 0 {
        return Err(ConfigError::InvalidValue(
            "cloud.timeout_ms must be positive".to_owned(),
        ));
    }

    Ok(GatewayConfig {
        schema_version,
        socket,
        cloud: CloudConfig {
            base_url,
            timeout_ms,
        },
    })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    MissingField(String),
    InvalidValue(String),
    Io(String),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingField(s) => write!(f, "Missing config field: {}", s),
            ConfigError::InvalidValue(s) => write!(f, "Invalid config value: {}", s),
            ConfigError::Io(s) => write!(f, "IO error: {}", s),
            ConfigError::Parse(s) => write!(f, "TOML parse error: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
