//! BLE provisioning manager.
//!
//! Bridges a [`Provisioner`] (the BluFi stack) to the WiFi manager and the
//! bus: credentials received over BLE are handed to the WiFi manager and
//! announced as `provisioning::RECV_CONFIG` / `provisioning::CONFIG_DONE`.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use uplink_core::event_bus::{
    provisioning, wifi, Event, EventBus, EventSource, ProvisionedConfig, ScanResult, USER_BASE,
};
use uplink_core::{ConnectionError, HandlerRef, Result};

use super::wifi::WifiManager;
use crate::credentials::WifiCredential;
use crate::drivers::{EventSink, Provisioner, ProvisionerEvent};

const COMPONENT: &str = "provisioning_manager";

/// Default BLE advertising name
pub const DEFAULT_DEVICE_NAME: &str = "UPLINK";

#[derive(Debug, Default)]
struct ProvisioningState {
    running: bool,
    pending: Option<WifiCredential>,
}

/// BLE provisioning manager
pub struct ProvisioningManager {
    weak_self: Weak<Self>,
    bus: Arc<EventBus>,
    wifi: Arc<WifiManager>,
    device_name: String,
    provisioner: Mutex<Box<dyn Provisioner>>,
    state: Mutex<ProvisioningState>,
    handler: Mutex<Option<HandlerRef>>,
}

impl ProvisioningManager {
    pub fn new(
        bus: Arc<EventBus>,
        wifi: Arc<WifiManager>,
        provisioner: Box<dyn Provisioner>,
        device_name: impl Into<String>,
    ) -> Arc<Self> {
        let device_name = device_name.into();
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            bus,
            wifi,
            device_name: if device_name.is_empty() {
                DEFAULT_DEVICE_NAME.to_string()
            } else {
                device_name
            },
            provisioner: Mutex::new(provisioner),
            state: Mutex::new(ProvisioningState::default()),
            handler: Mutex::new(None),
        })
    }

    /// Start advertising; a second call while running is a no-op
    pub fn start(&self) -> Result<()> {
        if self.state.lock().running {
            tracing::debug!("Provisioning already running");
            return Ok(());
        }

        let weak = self.weak_self.clone();
        let sink: EventSink<ProvisionerEvent> = Arc::new(move |event| {
            if let Some(manager) = weak.upgrade() {
                manager.on_provisioner_event(event);
            }
        });
        self.provisioner.lock().init(&self.device_name, sink)?;

        let weak = self.weak_self.clone();
        let handler = self.bus.subscribe_fn(wifi::SCAN_DONE, move |event| {
            if let Some(manager) = weak.upgrade() {
                manager.on_wifi_event(event);
            }
        })?;
        self.bus.subscribe(wifi::GOT_IP, Arc::clone(&handler))?;
        self.bus.subscribe(wifi::DISCONNECTED, Arc::clone(&handler))?;
        *self.handler.lock() = Some(handler);

        self.state.lock().running = true;
        tracing::info!("Provisioning started as {}", self.device_name);
        self.post(provisioning::INIT_DONE);
        Ok(())
    }

    /// Stop advertising and release the BLE stack
    pub fn stop(&self) -> Result<()> {
        if !self.state.lock().running {
            return Err(ConnectionError::not_running(COMPONENT).into());
        }

        if let Some(handler) = self.handler.lock().take() {
            if let Err(e) = self.bus.unsubscribe_all(&handler) {
                tracing::debug!("Provisioning unsubscribe skipped: {}", e);
            }
        }
        if let Err(e) = self.provisioner.lock().deinit() {
            tracing::warn!("Provisioner deinit failed: {}", e);
        }

        {
            let mut state = self.state.lock();
            state.running = false;
            state.pending = None;
        }
        tracing::info!("Provisioning stopped");
        self.post(provisioning::DEINIT_DONE);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn is_ble_connected(&self) -> bool {
        self.provisioner.lock().is_ble_connected()
    }

    fn post(&self, id: uplink_core::EventId) {
        if let Err(e) = self.bus.post(id, EventSource::PROVISIONING) {
            tracing::warn!("Failed to publish {}: {}", id, e);
        }
    }

    /// Feed one request from the phone into the manager
    pub fn on_provisioner_event(&self, event: ProvisionerEvent) {
        match event {
            ProvisionerEvent::BleConnected => {
                tracing::info!("BLE client connected");
                self.post(provisioning::CONNECTED);
            }
            ProvisionerEvent::BleDisconnected => {
                tracing::info!("BLE client disconnected");
                self.post(provisioning::DISCONNECTED);
            }
            ProvisionerEvent::StaConfig { ssid, password } => {
                tracing::info!("Received STA config for {}", ssid);
                let config = ProvisionedConfig { ssid: ssid.clone() };
                self.state.lock().pending = Some(WifiCredential { ssid, password });
                if let Err(e) = self.bus.post_payload(
                    provisioning::RECV_CONFIG,
                    EventSource::PROVISIONING,
                    &config,
                ) {
                    tracing::warn!("Failed to publish RECV_CONFIG: {}", e);
                }
            }
            ProvisionerEvent::ConnectRequest => {
                let Some(credential) = self.state.lock().pending.clone() else {
                    tracing::warn!("Connect requested before any STA config");
                    return;
                };
                tracing::info!("Connect requested for {}", credential.ssid);
                if let Err(e) = self.wifi.connect(&credential.ssid, &credential.password) {
                    tracing::warn!("WiFi connect from provisioning failed: {}", e);
                }
                let config = ProvisionedConfig {
                    ssid: credential.ssid,
                };
                if let Err(e) = self.bus.post_payload(
                    provisioning::CONFIG_DONE,
                    EventSource::PROVISIONING,
                    &config,
                ) {
                    tracing::warn!("Failed to publish CONFIG_DONE: {}", e);
                }
            }
            ProvisionerEvent::DisconnectRequest => {
                tracing::info!("Disconnect requested");
                if let Err(e) = self.wifi.disconnect() {
                    tracing::warn!("WiFi disconnect from provisioning failed: {}", e);
                }
            }
            ProvisionerEvent::ScanRequest => {
                tracing::info!("WiFi list requested");
                if let Err(e) = self.wifi.scan() {
                    tracing::warn!("WiFi scan failed: {}", e);
                    self.send_wifi_list(&ScanResult::default());
                }
            }
            ProvisionerEvent::WifiStatusRequest => {
                self.send_connect_report(self.wifi.is_connected());
            }
            ProvisionerEvent::CustomData(data) => {
                tracing::info!("Received {} bytes of custom data", data.len());
                if let Err(e) = self.bus.post_data(USER_BASE, EventSource::PROVISIONING, &data) {
                    tracing::warn!("Failed to publish custom data: {}", e);
                }
            }
        }
    }

    /// Send application bytes to the phone
    pub fn send_custom_data(&self, data: &[u8]) -> Result<()> {
        if !self.is_running() {
            return Err(ConnectionError::not_running(COMPONENT).into());
        }
        Ok(self.provisioner.lock().send_custom_data(data)?)
    }

    fn send_wifi_list(&self, result: &ScanResult) {
        if let Err(e) = self.provisioner.lock().send_wifi_list(&result.aps) {
            tracing::warn!("Failed to send WiFi list: {}", e);
        }
    }

    fn send_connect_report(&self, connected: bool) {
        let ssid = if connected { self.wifi.active_ssid() } else { None };
        if let Err(e) = self
            .provisioner
            .lock()
            .send_connect_report(connected, ssid.as_deref())
        {
            tracing::warn!("Failed to send connect report: {}", e);
        }
    }

    fn on_wifi_event(&self, event: &Event) {
        match event.id {
            wifi::SCAN_DONE => {
                let result = event.decode_payload::<ScanResult>().unwrap_or_default();
                self.send_wifi_list(&result);
            }
            wifi::GOT_IP => self.send_connect_report(true),
            wifi::DISCONNECTED => self.send_connect_report(false),
            _ => {}
        }
    }
}

impl std::fmt::Debug for ProvisioningManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningManager")
            .field("device_name", &self.device_name)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
