//! Configuration loading — TOML file with environment variable overrides.
//!
//! Reads `linkhub.toml` from the working directory, or the file named by
//! `LINKHUB_CONFIG`. Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::collections::HashSet;
use std::time::Duration;

use linkhub_adapter_mqtt::MqttConfig;
use linkhub_domain::address::Address;
use serde::Deserialize;

const DEFAULT_PATH: &str = "linkhub.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Modem settings.
    pub modem: ModemConfig,
    /// MQTT broker and topic templates.
    pub mqtt: MqttConfig,
    /// Devices attached to the modem, in the order they are created.
    pub devices: Vec<DeviceConfig>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Modem configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// Address of the modem itself.
    pub address: Address,
    /// JSON file holding the modem link database.
    pub db_path: String,
    /// How long to wait for a reply before failing a command.
    pub reply_timeout_ms: u64,
}

/// One configured device.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceConfig {
    Dimmer {
        address: Address,
        #[serde(default)]
        name: Option<String>,
    },
    /// Several dimmers controlling one load, kept in sync.
    NWayDimmer {
        primary: Address,
        secondaries: Vec<Address>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default = "default_group")]
        group: u8,
    },
    BatterySensor {
        address: Address,
        #[serde(default)]
        name: Option<String>,
    },
}

fn default_group() -> u8 {
    1
}

impl DeviceConfig {
    /// Every physical address the entry creates a device for.
    #[must_use]
    pub fn addresses(&self) -> Vec<Address> {
        match self {
            Self::Dimmer { address, .. } | Self::BatterySensor { address, .. } => vec![*address],
            Self::NWayDimmer {
                primary,
                secondaries,
                ..
            } => {
                let mut addresses = vec![*primary];
                for addr in secondaries {
                    if !addresses.contains(addr) {
                        addresses.push(*addr);
                    }
                }
                addresses
            }
        }
    }
}

impl Config {
    /// Load configuration from `linkhub.toml` (or `LINKHUB_CONFIG`), then
    /// apply environment-variable overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// result is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("LINKHUB_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("LINKHUB_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Ok(val) = std::env::var("LINKHUB_MQTT_PORT") {
            if let Ok(port) = val.parse() {
                self.mqtt.broker_port = port;
            }
        }
        if let Ok(val) = std::env::var("LINKHUB_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.modem.reply_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "reply_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.mqtt.enabled && self.mqtt.broker_port == 0 {
            return Err(ConfigError::Validation(
                "mqtt broker_port must be non-zero".to_string(),
            ));
        }
        self.mqtt
            .qos()
            .map_err(|err| ConfigError::Validation(err.to_string()))?;

        let mut seen = HashSet::new();
        for addr in self.devices.iter().flat_map(DeviceConfig::addresses) {
            if addr == self.modem.address {
                return Err(ConfigError::Validation(format!(
                    "device {addr} uses the modem address"
                )));
            }
            if !seen.insert(addr) {
                return Err(ConfigError::Validation(format!(
                    "device {addr} is configured more than once"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.modem.reply_timeout_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "linkhubd=info,linkhub=info".to_string(),
        }
    }
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            address: Address::new(0x44, 0x85, 0x11),
            db_path: "modem_db.json".to_string(),
            reply_timeout_ms: 5000,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
