//! Uplink Settings Crate
//!
//! Handles application configuration and the file-backed credential store.

pub mod config;
pub mod error;
pub mod store;

pub use config::{
    config_dir, default_config_path, resolve_config_path, BusSettings, Config, MqttSettings,
    ProvisioningSettings, WifiSettings, CONFIG_ENV_VAR,
};
pub use error::{ConfigError, SettingsError, SettingsResult};
pub use store::JsonFileKvStore;
