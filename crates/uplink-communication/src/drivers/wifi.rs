//! WiFi station driver interface.

use std::net::Ipv4Addr;
use uplink_core::event_bus::{AccessPoint, WifiConnectedInfo, WifiIpInfo};
use uplink_core::ConnectionError;

use super::EventSink;

/// Asynchronous notifications from the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiDriverEvent {
    /// Station interface is up.
    StaStarted,
    /// Station interface is down.
    StaStopped,
    /// Associated with an access point.
    Connected(WifiConnectedInfo),
    /// Association lost or attempt failed.
    Disconnected { reason: u8 },
    /// DHCP lease obtained.
    GotIp(WifiIpInfo),
    /// DHCP lease lost.
    LostIp,
    /// Scan finished.
    ScanDone(Vec<AccessPoint>),
}

/// Link snapshot reported by the driver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WifiStatus {
    pub connected: bool,
    pub ssid: Option<String>,
    pub rssi: Option<i8>,
    pub ip: Option<Ipv4Addr>,
}

/// WiFi station radio
///
/// Calls start an operation and return; results arrive on the sink.
pub trait WifiDriver: Send {
    /// Bring the station interface up; events go to `sink` from now on
    fn start(&mut self, sink: EventSink<WifiDriverEvent>) -> Result<(), ConnectionError>;

    /// Bring the station interface down
    fn stop(&mut self) -> Result<(), ConnectionError>;

    /// Start associating with `ssid`
    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), ConnectionError>;

    /// Drop the current association
    fn disconnect(&mut self) -> Result<(), ConnectionError>;

    /// Start a scan; results arrive as `ScanDone`
    fn scan(&mut self) -> Result<(), ConnectionError>;

    /// Current link snapshot
    fn status(&self) -> WifiStatus;
}

/// Driver that accepts every call and never reports anything
#[derive(Debug, Default)]
pub struct NoOpWifiDriver {
    started: bool,
}

impl NoOpWifiDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WifiDriver for NoOpWifiDriver {
    fn start(&mut self, _sink: EventSink<WifiDriverEvent>) -> Result<(), ConnectionError> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ConnectionError> {
        self.started = false;
        Ok(())
    }

    fn connect(&mut self, ssid: &str, _password: &str) -> Result<(), ConnectionError> {
        tracing::debug!("NoOp WiFi driver: connect to {}", ssid);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn scan(&mut self) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn status(&self) -> WifiStatus {
        WifiStatus::default()
    }
}
