//! WiFi station manager.
//!
//! Wraps a [`WifiDriver`], keeps the saved credential list, translates driver
//! notifications into bus events and retries lost links on a fixed interval.

use parking_lot::Mutex;
use std::net::Ipv4Addr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use uplink_core::event_bus::{
    cmd, wifi, AccessPoint, Event, EventBus, EventSource, ScanResult, WifiDisconnectedInfo,
    WifiIpInfo,
};
use uplink_core::{ConnectionError, HandlerRef, Result};

use crate::credentials::{CredentialList, WifiCredential, DEFAULT_MAX_CREDENTIALS};
use crate::drivers::{EventSink, KvStore, WifiDriver, WifiDriverEvent, WifiStatus};
use crate::reconnect::{LinkPhase, ReconnectConfig, ReconnectPolicy, StepAction};
use crate::task::PeriodicTask;

const COMPONENT: &str = "wifi_manager";

/// WiFi manager configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiManagerConfig {
    /// Retry cadence. A `step_interval_ms` of 0 disables the background step
    /// task; the owner then calls [`WifiManager::step`] itself.
    pub reconnect: ReconnectConfig,
    /// Capacity of the saved credential list.
    pub max_credentials: usize,
}

impl Default for WifiManagerConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            max_credentials: DEFAULT_MAX_CREDENTIALS,
        }
    }
}

#[derive(Debug)]
struct WifiState {
    initialized: bool,
    policy: ReconnectPolicy,
    link_up: bool,
    ip: Option<WifiIpInfo>,
    active: Option<WifiCredential>,
    last_scan: Vec<AccessPoint>,
}

/// WiFi station manager
pub struct WifiManager {
    bus: Arc<EventBus>,
    config: WifiManagerConfig,
    driver: Mutex<Box<dyn WifiDriver>>,
    credentials: Mutex<CredentialList>,
    state: Mutex<WifiState>,
    handler: Mutex<Option<HandlerRef>>,
    task: Mutex<Option<PeriodicTask>>,
}

impl WifiManager {
    /// Create an uninitialized manager
    pub fn new(
        bus: Arc<EventBus>,
        driver: Box<dyn WifiDriver>,
        store: Box<dyn KvStore>,
        config: WifiManagerConfig,
    ) -> Arc<Self> {
        let credentials = CredentialList::new(store, config.max_credentials);
        Arc::new(Self {
            bus,
            driver: Mutex::new(driver),
            credentials: Mutex::new(credentials),
            state: Mutex::new(WifiState {
                initialized: false,
                policy: ReconnectPolicy::new(config.reconnect),
                link_up: false,
                ip: None,
                active: None,
                last_scan: Vec::new(),
            }),
            handler: Mutex::new(None),
            task: Mutex::new(None),
            config,
        })
    }

    /// Start the station interface and listen for WiFi commands
    pub fn init(self: &Arc<Self>) -> Result<()> {
        if self.state.lock().initialized {
            return Err(ConnectionError::already_initialized(COMPONENT).into());
        }

        let active = match self.credentials.lock().latest() {
            Ok(latest) => latest,
            Err(e) => {
                tracing::warn!("Failed to load saved WiFi credentials: {}", e);
                None
            }
        };
        if let Some(credential) = &active {
            tracing::info!("Using saved WiFi network {}", credential.ssid);
        }

        let weak = Arc::downgrade(self);
        let sink: EventSink<WifiDriverEvent> = Arc::new(move |event| {
            if let Some(manager) = weak.upgrade() {
                manager.on_driver_event(event);
            }
        });
        self.driver.lock().start(sink)?;

        let weak = Arc::downgrade(self);
        let handler = self.bus.subscribe_fn(cmd::WIFI_CONNECT, move |event| {
            if let Some(manager) = weak.upgrade() {
                manager.on_command(event);
            }
        })?;
        self.bus
            .subscribe(cmd::WIFI_DISCONNECT, Arc::clone(&handler))?;
        *self.handler.lock() = Some(handler);

        {
            let mut state = self.state.lock();
            state.initialized = true;
            state.active = active;
            state.policy = ReconnectPolicy::new(self.config.reconnect);
        }

        if self.config.reconnect.step_interval_ms > 0 {
            let task = self.spawn_step_task()?;
            *self.task.lock() = Some(task);
        }

        tracing::info!("WiFi manager initialized");
        Ok(())
    }

    fn spawn_step_task(self: &Arc<Self>) -> Result<PeriodicTask> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = Duration::from_millis(u64::from(self.config.reconnect.step_interval_ms));
        let task = PeriodicTask::spawn("wifi_mgr", period, move || {
            if let Some(manager) = weak.upgrade() {
                let now = manager.bus.now_ms();
                manager.step(now);
            }
        })?;
        Ok(task)
    }

    /// Stop the interface and drop every bus subscription
    pub fn deinit(&self) -> Result<()> {
        if !self.state.lock().initialized {
            return Err(ConnectionError::not_initialized(COMPONENT).into());
        }

        if let Some(handler) = self.handler.lock().take() {
            if let Err(e) = self.bus.unsubscribe_all(&handler) {
                tracing::debug!("WiFi manager unsubscribe skipped: {}", e);
            }
        }
        if let Some(mut task) = self.task.lock().take() {
            task.stop();
        }
        self.state.lock().policy.mark_idle();
        if let Err(e) = self.driver.lock().stop() {
            tracing::warn!("WiFi driver stop failed: {}", e);
        }

        let mut state = self.state.lock();
        state.initialized = false;
        state.link_up = false;
        state.ip = None;
        state.policy.reset_backoff();
        tracing::info!("WiFi manager deinitialized");
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.state.lock().initialized {
            Ok(())
        } else {
            Err(ConnectionError::not_initialized(COMPONENT).into())
        }
    }

    /// Save `ssid`/`password` and connect to it right away
    pub fn connect(&self, ssid: &str, password: &str) -> Result<()> {
        self.ensure_initialized()?;
        if ssid.is_empty() {
            return Err(ConnectionError::invalid_arg("SSID must not be empty").into());
        }

        if let Err(e) = self.credentials.lock().save(ssid, password) {
            tracing::warn!("Failed to persist WiFi credentials for {}: {}", ssid, e);
        }

        self.state.lock().active = Some(WifiCredential::new(ssid, password));
        self.connect_now();
        Ok(())
    }

    /// Connect using the active credentials (most recently saved)
    ///
    /// Does nothing while an attempt is already running or the link is up.
    pub fn start_connect(&self) -> Result<()> {
        self.ensure_initialized()?;
        if matches!(self.phase(), LinkPhase::Connecting | LinkPhase::Connected) {
            tracing::debug!("WiFi connect already in progress");
            return Ok(());
        }

        let has_active = self.state.lock().active.is_some();
        if !has_active {
            let latest = self.credentials.lock().latest()?;
            match latest {
                Some(credential) => self.state.lock().active = Some(credential),
                None => {
                    tracing::warn!("No saved WiFi credentials, waiting for provisioning");
                    return Err(ConnectionError::invalid_arg("no saved WiFi credentials").into());
                }
            }
        }

        self.connect_now();
        Ok(())
    }

    /// Explicit attempt that ignores the retry interval
    fn connect_now(&self) {
        let now = self.bus.now_ms();
        let credential = {
            let mut state = self.state.lock();
            state.policy.restart();
            state.policy.begin_attempt(now);
            state.active.clone()
        };
        self.attempt(now, credential);
    }

    /// Drop the link and stop retrying
    pub fn disconnect(&self) -> Result<()> {
        self.ensure_initialized()?;
        self.state.lock().policy.mark_idle();
        self.driver.lock().disconnect()?;
        tracing::info!("WiFi disconnect requested");
        Ok(())
    }

    /// Start a scan; results are published as `wifi::SCAN_DONE`
    pub fn scan(&self) -> Result<()> {
        self.ensure_initialized()?;
        self.driver.lock().scan()?;
        Ok(())
    }

    /// One reconnect step at tick `now`
    pub fn step(&self, now: u32) {
        let (action, credential) = {
            let mut state = self.state.lock();
            if !state.initialized {
                return;
            }
            let action = state.policy.step(now);
            (action, state.active.clone())
        };
        if action == StepAction::Connect {
            self.attempt(now, credential);
        }
    }

    fn attempt(&self, now: u32, credential: Option<WifiCredential>) {
        let Some(credential) = credential else {
            tracing::warn!("WiFi reconnect skipped: no credentials");
            self.state.lock().policy.mark_idle();
            return;
        };

        tracing::info!("Connecting to WiFi network {}", credential.ssid);
        let result = self
            .driver
            .lock()
            .connect(&credential.ssid, &credential.password);
        if let Err(e) = result {
            tracing::warn!("WiFi connect attempt failed: {}", e);
            self.state.lock().policy.on_error(now);
        }
    }

    fn on_command(&self, event: &Event) {
        let result = match event.id {
            cmd::WIFI_CONNECT => match event.decode_payload::<WifiCredential>() {
                Ok(credential) => {
                    tracing::info!("Received WIFI_CONNECT command for {}", credential.ssid);
                    self.connect(&credential.ssid, &credential.password)
                }
                Err(_) => {
                    tracing::info!("Received WIFI_CONNECT command");
                    self.start_connect()
                }
            },
            cmd::WIFI_DISCONNECT => {
                tracing::info!("Received WIFI_DISCONNECT command");
                self.disconnect()
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            tracing::warn!("WiFi command {} failed: {}", event.id, e);
        }
    }

    /// Feed one driver notification into the manager
    pub fn on_driver_event(&self, event: WifiDriverEvent) {
        let now = self.bus.now_ms();
        let published = match event {
            WifiDriverEvent::StaStarted => {
                tracing::info!("STA started");
                self.bus.post(wifi::STA_START, EventSource::WIFI)
            }
            WifiDriverEvent::StaStopped => {
                tracing::info!("STA stopped");
                self.bus.post(wifi::STA_STOP, EventSource::WIFI)
            }
            WifiDriverEvent::Connected(info) => {
                tracing::info!("Connected to AP {}", info.ssid);
                {
                    let mut state = self.state.lock();
                    state.link_up = true;
                    state.policy.on_connected();
                }
                self.bus.post_payload(wifi::CONNECTED, EventSource::WIFI, &info)
            }
            WifiDriverEvent::Disconnected { reason } => {
                tracing::warn!("Disconnected from AP, reason: {}", reason);
                {
                    let mut state = self.state.lock();
                    state.link_up = false;
                    state.ip = None;
                    if state.policy.phase() != LinkPhase::Idle {
                        state.policy.on_disconnected(now);
                    }
                }
                self.bus.post_payload(
                    wifi::DISCONNECTED,
                    EventSource::WIFI,
                    &WifiDisconnectedInfo { reason },
                )
            }
            WifiDriverEvent::GotIp(info) => {
                tracing::info!("Got IP: {}", info.ip);
                self.state.lock().ip = Some(info.clone());
                self.bus.post_payload(wifi::GOT_IP, EventSource::WIFI, &info)
            }
            WifiDriverEvent::LostIp => {
                tracing::warn!("Lost IP");
                self.state.lock().ip = None;
                self.bus.post(wifi::LOST_IP, EventSource::WIFI)
            }
            WifiDriverEvent::ScanDone(aps) => {
                tracing::info!("Scan done, {} access point(s)", aps.len());
                let result = ScanResult { aps };
                self.state.lock().last_scan = result.aps.clone();
                self.bus.post_payload(wifi::SCAN_DONE, EventSource::WIFI, &result)
            }
        };

        if let Err(e) = published {
            tracing::warn!("Failed to publish WiFi event: {}", e);
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// Associated and holding an IP address
    pub fn is_connected(&self) -> bool {
        let state = self.state.lock();
        state.link_up && state.ip.is_some()
    }

    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.state.lock().ip.as_ref().map(|info| info.ip)
    }

    pub fn phase(&self) -> LinkPhase {
        self.state.lock().policy.phase()
    }

    pub fn active_ssid(&self) -> Option<String> {
        self.state.lock().active.as_ref().map(|c| c.ssid.clone())
    }

    /// Access points from the most recent scan
    pub fn last_scan(&self) -> Vec<AccessPoint> {
        self.state.lock().last_scan.clone()
    }

    /// Saved credentials, oldest first
    pub fn saved_credentials(&self) -> Result<Vec<WifiCredential>> {
        Ok(self.credentials.lock().load_all()?)
    }

    /// Driver link snapshot
    pub fn status(&self) -> WifiStatus {
        self.driver.lock().status()
    }
}

impl std::fmt::Debug for WifiManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiManager")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
