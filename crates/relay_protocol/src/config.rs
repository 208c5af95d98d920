//! YAML configuration schema (spec §6) and its load-time validation.
//!
//! Deserialization is permissive (`serde(default)` everywhere sensible, and
//! serde_yaml silently tolerates unknown keys by default) — spec §6 calls
//! for unknown keys to be tolerated, not rejected. Validation beyond "does
//! this parse" happens explicitly in [`Config::validate`], which is where
//! the config-load-time refusals from spec §8 (channel 8, ambiguous
//! meshnet name, missing required fields) live.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("matrix.homeserver is required")]
    MissingHomeserver,
    #[error("matrix.bot_user_id is required")]
    MissingBotUserId,
    #[error("matrix.access_token is required unless a credentials file is configured")]
    MissingCredentials,
    #[error("matrix_rooms[{index}].id {id:?} is not a valid room id or alias (must start with '!' or '#')")]
    InvalidRoomId { index: usize, id: String },
    #[error("matrix_rooms[{index}].meshtastic_channel {channel} is out of range (must be 0-7)")]
    ChannelOutOfRange { index: usize, channel: i64 },
    #[error("meshtastic.connection_type {0:?} is not one of serial, tcp, ble, network")]
    InvalidConnectionType(String),
    #[error("meshtastic.{field} is required for connection_type {connection_type:?}")]
    MissingTransportField {
        connection_type: String,
        field: &'static str,
    },
    #[error("meshtastic.meshnet_name {0:?} must not contain '/' (ambiguous in cross-mesh attribution)")]
    AmbiguousMeshnetName(String),
    #[error("matrix.e2ee.enabled is true but this build was compiled without the e2ee feature")]
    E2eeNotCompiled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Serial,
    Tcp,
    Ble,
    /// Deprecated alias of `Tcp`, accepted with a warning (spec §6).
    Network,
}

impl ConnectionType {
    pub fn normalized(self) -> ConnectionType {
        match self {
            ConnectionType::Network => ConnectionType::Tcp,
            other => other,
        }
    }

    pub fn is_deprecated_alias(self) -> bool {
        matches!(self, ConnectionType::Network)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct E2eeConfig {
    #[serde(default)]
    pub enabled: bool,
    pub store_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    pub homeserver: String,
    pub access_token: Option<String>,
    pub bot_user_id: String,
    #[serde(default)]
    pub e2ee: E2eeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixRoomConfig {
    pub id: String,
    pub meshtastic_channel: i64,
}

fn default_message_delay() -> f64 {
    2.1
}

fn default_meshnet_name() -> String {
    "default".to_string()
}

fn default_timeout() -> f64 {
    60.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshtasticConfig {
    pub connection_type: ConnectionType,
    pub serial_port: Option<String>,
    pub host: Option<String>,
    pub ble_address: Option<String>,
    #[serde(default = "default_broadcast_enabled")]
    pub broadcast_enabled: bool,
    #[serde(default)]
    pub detection_sensor: bool,
    #[serde(default = "default_message_delay")]
    pub message_delay: f64,
    #[serde(default = "default_meshnet_name")]
    pub meshnet_name: String,
    #[serde(default = "default_timeout")]
    pub timeout: f64,
}

fn default_broadcast_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MsgMapConfig {
    #[serde(default)]
    pub wipe_on_restart: bool,
    pub msgs_to_keep: Option<i64>,
}

fn default_pool_enabled() -> bool {
    true
}
fn default_max_connections() -> u32 {
    10
}
fn default_max_idle_time() -> u64 {
    300
}
fn default_pool_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_pool_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_max_idle_time")]
    pub max_idle_time: u64,
    #[serde(default = "default_pool_timeout")]
    pub timeout: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: default_pool_enabled(),
            max_connections: default_max_connections(),
            max_idle_time: default_max_idle_time(),
            timeout: default_pool_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub msg_map: MsgMapConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub channels: Vec<u8>,
    /// Plugin-specific keys the core doesn't interpret.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: LogLevel::default(), file: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub matrix: MatrixConfig,
    #[serde(default)]
    pub matrix_rooms: Vec<MatrixRoomConfig>,
    pub meshtastic: MeshtasticConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub plugins: HashMap<String, PluginConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate a config file. A present credentials file (checked
    /// by the caller, since path resolution is a CLI/paths concern) may
    /// stand in for `matrix.access_token`; pass `has_credentials_file` to
    /// account for that when validating.
    pub fn load_from_path(path: &Path, has_credentials_file: bool) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text, has_credentials_file)
    }

    pub fn load_from_str(text: &str, has_credentials_file: bool) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate(has_credentials_file)?;
        Ok(config)
    }

    pub fn validate(&self, has_credentials_file: bool) -> Result<(), ConfigError> {
        if self.matrix.homeserver.trim().is_empty() {
            return Err(ConfigError::MissingHomeserver);
        }
        if self.matrix.bot_user_id.trim().is_empty() {
            return Err(ConfigError::MissingBotUserId);
        }
        if self.matrix.access_token.is_none() && !has_credentials_file {
            return Err(ConfigError::MissingCredentials);
        }

        for (index, room) in self.matrix_rooms.iter().enumerate() {
            if !(room.id.starts_with('!') || room.id.starts_with('#')) {
                return Err(ConfigError::InvalidRoomId { index, id: room.id.clone() });
            }
            if !(0..=7).contains(&room.meshtastic_channel) {
                return Err(ConfigError::ChannelOutOfRange {
                    index,
                    channel: room.meshtastic_channel,
                });
            }
        }

        let connection_type = self.meshtastic.connection_type;
        match connection_type.normalized() {
            ConnectionType::Serial => {
                if self.meshtastic.serial_port.is_none() {
                    return Err(ConfigError::MissingTransportField {
                        connection_type: "serial".into(),
                        field: "serial_port",
                    });
                }
            }
            ConnectionType::Tcp => {
                if self.meshtastic.host.is_none() {
                    return Err(ConfigError::MissingTransportField {
                        connection_type: "tcp".into(),
                        field: "host",
                    });
                }
            }
            ConnectionType::Ble => {
                if self.meshtastic.ble_address.is_none() {
                    return Err(ConfigError::MissingTransportField {
                        connection_type: "ble".into(),
                        field: "ble_address",
                    });
                }
            }
            ConnectionType::Network => unreachable!("normalized() maps Network to Tcp"),
        }

        if self.meshtastic.meshnet_name.contains('/') {
            return Err(ConfigError::AmbiguousMeshnetName(
                self.meshtastic.meshnet_name.clone(),
            ));
        }

        if self.matrix.e2ee.enabled && !cfg!(feature = "e2ee") {
            return Err(ConfigError::E2eeNotCompiled);
        }

        Ok(())
    }

    /// `message_delay`/`response_delay` clamp floor per spec §4.4/§4.8/§8.
    /// Clamping itself (with the one-shot-per-distinct-value warning) is
    /// the pacer's job at runtime, not a config-load error; `validate`
    /// does not reject a low `message_delay`.
    pub fn message_delay(&self) -> f64 {
        self.meshtastic.message_delay
    }
}

pub const MESSAGE_DELAY_FLOOR: f64 = 2.1;

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> String {
        r#"
matrix:
  homeserver: "https://matrix.example.org"
  access_token: "tok"
  bot_user_id: "@bot:example.org"
matrix_rooms:
  - id: "!abc:example.org"
    meshtastic_channel: 0
meshtastic:
  connection_type: serial
  serial_port: /dev/ttyUSB0
"#
        .to_string()
    }

    #[test]
    fn minimal_config_parses_and_validates() {
        let config = Config::load_from_str(&minimal_yaml(), false).unwrap();
        assert_eq!(config.matrix.homeserver, "https://matrix.example.org");
        assert_eq!(config.meshtastic.meshnet_name, "default");
        assert_eq!(config.meshtastic.message_delay, 2.1);
    }

    #[test]
    fn missing_access_token_without_credentials_file_fails() {
        let yaml = minimal_yaml().replace("access_token: \"tok\"\n", "");
        let err = Config::load_from_str(&yaml, false).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredentials));
    }

    #[test]
    fn credentials_file_substitutes_for_access_token() {
        let yaml = minimal_yaml().replace("access_token: \"tok\"\n", "");
        let config = Config::load_from_str(&yaml, true).unwrap();
        assert!(config.matrix.access_token.is_none());
    }

    #[test]
    fn channel_8_is_refused() {
        let yaml = minimal_yaml().replace("meshtastic_channel: 0", "meshtastic_channel: 8");
        let err = Config::load_from_str(&yaml, false).unwrap_err();
        assert!(matches!(err, ConfigError::ChannelOutOfRange { channel: 8, .. }));
    }

    #[test]
    fn channel_7_is_accepted() {
        let yaml = minimal_yaml().replace("meshtastic_channel: 0", "meshtastic_channel: 7");
        assert!(Config::load_from_str(&yaml, false).is_ok());
    }

    #[test]
    fn serial_without_port_is_refused() {
        let yaml = minimal_yaml().replace("  serial_port: /dev/ttyUSB0\n", "");
        let err = Config::load_from_str(&yaml, false).unwrap_err();
        assert!(matches!(err, ConfigError::MissingTransportField { .. }));
    }

    #[test]
    fn meshnet_name_with_slash_is_refused() {
        let yaml = format!("{}  meshnet_name: \"a/b\"\n", minimal_yaml());
        let err = Config::load_from_str(&yaml, false).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousMeshnetName(_)));
    }

    #[test]
    fn network_connection_type_is_deprecated_tcp_alias() {
        let yaml = minimal_yaml()
            .replace("connection_type: serial", "connection_type: network")
            .replace("  serial_port: /dev/ttyUSB0\n", "  host: 192.168.1.50\n");
        let config = Config::load_from_str(&yaml, false).unwrap();
        assert!(config.meshtastic.connection_type.is_deprecated_alias());
        assert_eq!(config.meshtastic.connection_type.normalized(), ConnectionType::Tcp);
    }

    #[test]
    fn e2ee_enabled_without_the_feature_is_refused() {
        let yaml = minimal_yaml().replacen("matrix:\n", "matrix:\n  e2ee:\n    enabled: true\n", 1);
        let err = Config::load_from_str(&yaml, false).unwrap_err();
        assert!(matches!(err, ConfigError::E2eeNotCompiled));
    }

    #[test]
    fn unknown_top_level_keys_are_tolerated() {
        let yaml = format!("{}\nunknown_section:\n  foo: bar\n", minimal_yaml());
        assert!(Config::load_from_str(&yaml, false).is_ok());
    }
}
