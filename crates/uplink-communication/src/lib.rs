//! # Uplink Communication
//!
//! Connectivity managers for Uplink.
//! Wraps the WiFi station driver, the MQTT protocol client and the BLE
//! provisioning stack behind traits, keeps each link alive with a
//! fixed-interval reconnect policy, and persists WiFi credentials.

pub mod credentials;
pub mod drivers;
pub mod managers;
pub mod reconnect;
pub mod task;

pub use credentials::{CredentialList, WifiCredential, DEFAULT_MAX_CREDENTIALS};

pub use drivers::{
    EventSink, KvStore, MemoryKvStore, MqttClient, MqttClientEvent, MqttClientOptions,
    NoOpMqttClient, NoOpProvisioner, NoOpWifiDriver, Provisioner, ProvisionerEvent, WifiDriver,
    WifiDriverEvent, WifiStatus,
};

pub use managers::{
    MqttManager, MqttManagerConfig, ProvisioningManager, WifiManager, WifiManagerConfig,
};

pub use reconnect::{LinkPhase, ReconnectConfig, ReconnectPolicy, StepAction};
pub use task::PeriodicTask;
