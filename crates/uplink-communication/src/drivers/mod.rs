//! External collaborator interfaces.
//!
//! The radio, BLE stack, MQTT protocol client and persistent storage live
//! outside this crate. Each is reached through a trait; the no-op and
//! in-memory implementations here let the stack run on a host.
//!
//! Drivers report asynchronous results through an [`EventSink`] handed to
//! them at start-up. A sink may be called from any thread, including from
//! inside a driver call.

pub mod kv;
pub mod mqtt;
pub mod provisioner;
pub mod wifi;

use std::sync::Arc;

/// Callback through which a driver reports its events
pub type EventSink<T> = Arc<dyn Fn(T) + Send + Sync>;

pub use kv::{KvStore, MemoryKvStore};
pub use mqtt::{MqttClient, MqttClientEvent, MqttClientOptions, NoOpMqttClient};
pub use provisioner::{NoOpProvisioner, Provisioner, ProvisionerEvent};
pub use wifi::{NoOpWifiDriver, WifiDriver, WifiDriverEvent, WifiStatus};
