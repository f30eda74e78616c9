//! Configuration for Uplink
//!
//! Provides configuration file handling and validation.
//! Supports JSON and TOML file formats stored in a platform-specific
//! directory (`<config dir>/uplink/`), overridable with `UPLINK_CONFIG`.
//!
//! Configuration is organized into logical sections:
//! - Event bus (queue depth, dispatcher name)
//! - WiFi (reconnect cadence, credential list capacity and file)
//! - MQTT (broker, identity, reconnect cadence)
//! - Provisioning (BLE device name, long-press threshold)

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use uplink_communication::reconnect::{DEFAULT_RECONNECT_INTERVAL_MS, DEFAULT_STEP_INTERVAL_MS};
use uplink_communication::{
    MqttManagerConfig, ReconnectConfig, WifiManagerConfig, DEFAULT_MAX_CREDENTIALS,
};
use uplink_core::EventBusConfig;

use crate::error::{ConfigError, SettingsError, SettingsResult};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "UPLINK_CONFIG";

const APP_DIR: &str = "uplink";
const CONFIG_FILE: &str = "config.toml";
const CREDENTIALS_FILE: &str = "wifi_credentials.json";

/// URI schemes accepted for the broker address
const BROKER_SCHEMES: &[&str] = &["mqtt://", "mqtts://", "tcp://", "ssl://", "ws://", "wss://"];

/// Event bus settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusSettings {
    /// Maximum number of queued events
    pub queue_size: usize,
    /// Dispatcher thread name
    pub dispatcher_name: String,
}

impl Default for BusSettings {
    fn default() -> Self {
        let defaults = EventBusConfig::default();
        Self {
            queue_size: defaults.queue_size,
            dispatcher_name: defaults.dispatcher_name,
        }
    }
}

impl BusSettings {
    pub fn to_bus_config(&self) -> EventBusConfig {
        EventBusConfig {
            queue_size: self.queue_size,
            dispatcher_name: self.dispatcher_name.clone(),
        }
    }
}

/// WiFi station settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiSettings {
    /// Delay after a failure before retrying; negative disables auto-retry
    pub reconnect_interval_ms: i32,
    /// Reconnect step cadence; 0 disables the background step
    pub step_interval_ms: u32,
    /// Capacity of the saved credential list
    pub max_credentials: usize,
    /// Credential file; defaults to the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<PathBuf>,
}

impl Default for WifiSettings {
    fn default() -> Self {
        Self {
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            step_interval_ms: DEFAULT_STEP_INTERVAL_MS,
            max_credentials: DEFAULT_MAX_CREDENTIALS,
            credentials_file: None,
        }
    }
}

impl WifiSettings {
    pub fn to_manager_config(&self) -> WifiManagerConfig {
        WifiManagerConfig {
            reconnect: ReconnectConfig {
                reconnect_interval_ms: self.reconnect_interval_ms,
                step_interval_ms: self.step_interval_ms,
            },
            max_credentials: self.max_credentials,
        }
    }

    /// Where the credential list is persisted
    pub fn credentials_path(&self) -> SettingsResult<PathBuf> {
        match &self.credentials_file {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join(CREDENTIALS_FILE)),
        }
    }
}

/// MQTT session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttSettings {
    /// Broker address, e.g. `mqtt://192.168.1.10:1883`
    pub broker_uri: String,
    /// Client id; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub keepalive_sec: u16,
    pub reconnect_interval_ms: i32,
    pub step_interval_ms: u32,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker_uri: "mqtt://localhost:1883".to_string(),
            client_id: None,
            username: None,
            password: None,
            keepalive_sec: uplink_communication::managers::DEFAULT_KEEPALIVE_SEC,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            step_interval_ms: DEFAULT_STEP_INTERVAL_MS,
        }
    }
}

impl MqttSettings {
    pub fn to_manager_config(&self) -> MqttManagerConfig {
        MqttManagerConfig {
            broker_uri: self.broker_uri.clone(),
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            keepalive_sec: self.keepalive_sec,
            reconnect: ReconnectConfig {
                reconnect_interval_ms: self.reconnect_interval_ms,
                step_interval_ms: self.step_interval_ms,
            },
        }
    }
}

/// BLE provisioning settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    /// BLE advertising name
    pub device_name: String,
    /// Hold time that turns a button press into a provisioning request
    pub long_press_ms: u32,
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            device_name: uplink_communication::managers::DEFAULT_DEVICE_NAME.to_string(),
            long_press_ms: 1000,
        }
    }
}

/// Complete application configuration
///
/// Aggregates all settings sections and provides file I/O operations.
/// Missing sections fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub bus: BusSettings,
    #[serde(default)]
    pub wifi: WifiSettings,
    #[serde(default)]
    pub mqtt: MqttSettings,
    #[serde(default)]
    pub provisioning: ProvisioningSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(other.unwrap_or("<none>").to_string()).into()),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::LoadError(format!("{}: {}", path.display(), e)))?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, otherwise return the defaults
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating the parent directory
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SettingsError::ConfigDirectory(format!("{}: {}", parent.display(), e))
            })?;
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        tracing::debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        // Bus
        if self.bus.queue_size == 0 {
            return Err(out_of_range("bus.queue_size", self.bus.queue_size));
        }
        if self.bus.dispatcher_name.trim().is_empty() {
            return Err(ConfigError::MissingKey("bus.dispatcher_name".to_string()).into());
        }

        // WiFi
        if self.wifi.max_credentials == 0 {
            return Err(out_of_range("wifi.max_credentials", self.wifi.max_credentials));
        }

        // MQTT
        let broker = self.mqtt.broker_uri.trim();
        if broker.is_empty() {
            return Err(ConfigError::MissingKey("mqtt.broker_uri".to_string()).into());
        }
        if !BROKER_SCHEMES.iter().any(|scheme| broker.starts_with(scheme)) {
            return Err(SettingsError::InvalidSetting {
                key: "mqtt.broker_uri".to_string(),
                reason: format!("unsupported scheme in '{}'", broker),
            });
        }
        if self.mqtt.keepalive_sec == 0 {
            return Err(out_of_range("mqtt.keepalive_sec", self.mqtt.keepalive_sec));
        }

        // Provisioning
        if self.provisioning.device_name.trim().is_empty() {
            return Err(ConfigError::MissingKey("provisioning.device_name".to_string()).into());
        }
        if self.provisioning.long_press_ms == 0 {
            return Err(out_of_range(
                "provisioning.long_press_ms",
                self.provisioning.long_press_ms,
            ));
        }

        Ok(())
    }
}

fn out_of_range(key: &str, value: impl ToString) -> SettingsError {
    ConfigError::ValueOutOfRange {
        key: key.to_string(),
        value: value.to_string(),
    }
    .into()
}

/// Platform config directory for Uplink
pub fn config_dir() -> SettingsResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or_else(|| ConfigError::UnsupportedPlatform(std::env::consts::OS.to_string()).into())
}

/// `<config dir>/uplink/config.toml`
pub fn default_config_path() -> SettingsResult<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Config path from `UPLINK_CONFIG`, falling back to the default path
pub fn resolve_config_path() -> SettingsResult<PathBuf> {
    resolve_with(std::env::var_os(CONFIG_ENV_VAR))
}

fn resolve_with(env_value: Option<OsString>) -> SettingsResult<PathBuf> {
    match env_value.filter(|v| !v.is_empty()) {
        Some(path) => Ok(PathBuf::from(path)),
        None => default_config_path(),
    }
}
