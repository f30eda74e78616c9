//! Connectivity managers.
//!
//! Each manager owns one external collaborator, subscribes to the command
//! events it serves and publishes its link changes on the bus.

pub mod mqtt;
pub mod provisioning;
pub mod wifi;

pub use mqtt::{default_client_id, MqttManager, MqttManagerConfig, DEFAULT_KEEPALIVE_SEC};
pub use provisioning::{ProvisioningManager, DEFAULT_DEVICE_NAME};
pub use wifi::{WifiManager, WifiManagerConfig};
