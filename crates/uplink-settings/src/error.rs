//! Error types for the settings crate.

use std::io;
use thiserror::Error;

/// Errors from reading, writing or checking the device configuration.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The config file exists but could not be read.
    #[error("Failed to load settings: {0}")]
    LoadError(String),

    /// The config file could not be written.
    #[error("Failed to save settings: {0}")]
    SaveError(String),

    /// A value parsed but is not usable, e.g. a broker URI without a scheme.
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    /// The directory holding the config file could not be created.
    #[error("Config directory error: {0}")]
    ConfigDirectory(String),

    /// Reading the credential store file failed.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Validation and path resolution failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required value is empty.
    #[error("Missing configuration key: {0}")]
    MissingKey(String),

    /// The file extension is neither `.json` nor `.toml`.
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Value out of range for '{key}': {value}")]
    ValueOutOfRange { key: String, value: String },

    /// No per-user config directory on this platform.
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

/// Result type alias for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;
