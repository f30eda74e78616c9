//! BLE provisioning (BluFi) interface.

use uplink_core::event_bus::AccessPoint;
use uplink_core::ConnectionError;

use super::EventSink;

/// Requests coming from the phone over BLE
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionerEvent {
    /// Phone connected.
    BleConnected,
    /// Phone disconnected.
    BleDisconnected,
    /// Station credentials received.
    StaConfig { ssid: String, password: String },
    /// Phone asks the device to join the configured network.
    ConnectRequest,
    /// Phone asks the device to leave the network.
    DisconnectRequest,
    /// Phone asks for nearby access points.
    ScanRequest,
    /// Phone asks for the current link status.
    WifiStatusRequest,
    /// Application specific bytes.
    CustomData(Vec<u8>),
}

/// BLE provisioning stack
pub trait Provisioner: Send {
    /// Start advertising under `device_name`; requests go to `sink`
    fn init(&mut self, device_name: &str, sink: EventSink<ProvisionerEvent>) -> Result<(), ConnectionError>;

    /// Stop advertising and release the BLE stack
    fn deinit(&mut self) -> Result<(), ConnectionError>;

    fn send_wifi_list(&mut self, aps: &[AccessPoint]) -> Result<(), ConnectionError>;

    /// Report the station link; `ssid` is `None` when not connected
    fn send_connect_report(&mut self, connected: bool, ssid: Option<&str>) -> Result<(), ConnectionError>;

    fn send_custom_data(&mut self, data: &[u8]) -> Result<(), ConnectionError>;

    fn is_ble_connected(&self) -> bool;
}

/// Provisioner without a radio
#[derive(Debug, Default)]
pub struct NoOpProvisioner {
    active: bool,
}

impl NoOpProvisioner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Provisioner for NoOpProvisioner {
    fn init(&mut self, device_name: &str, _sink: EventSink<ProvisionerEvent>) -> Result<(), ConnectionError> {
        tracing::debug!("NoOp provisioner: advertising as {}", device_name);
        self.active = true;
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), ConnectionError> {
        self.active = false;
        Ok(())
    }

    fn send_wifi_list(&mut self, _aps: &[AccessPoint]) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn send_connect_report(&mut self, _connected: bool, _ssid: Option<&str>) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn send_custom_data(&mut self, _data: &[u8]) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn is_ble_connected(&self) -> bool {
        false
    }
}
