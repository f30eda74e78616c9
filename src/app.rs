//! Application wiring
//!
//! Owns the bus and every connectivity component, starts them in dependency
//! order and tears them down in reverse.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use uplink_communication::{
    KvStore, MqttClient, MqttManager, NoOpMqttClient, NoOpProvisioner, NoOpWifiDriver,
    ProvisioningManager, Provisioner, WifiDriver, WifiManager,
};
use uplink_core::event_bus::{button, cmd};
use uplink_core::{ClockRef, Event, EventBus, EventSource, HandlerRef};
use uplink_settings::{Config, JsonFileKvStore};

use crate::bringup::{AppState, BringUp, BringUpHooks};
use crate::button::{ButtonAction, ButtonMonitor};
use crate::display::{StatusBoard, StatusRenderer, StatusView, TracingRenderer};

/// Collaborators the application runs against
pub struct AppParts {
    pub wifi_driver: Box<dyn WifiDriver>,
    pub mqtt_client: Box<dyn MqttClient>,
    pub provisioner: Box<dyn Provisioner>,
    pub renderer: Arc<dyn StatusRenderer>,
    /// Credential storage; `None` opens the JSON file named by the config.
    pub credential_store: Option<Box<dyn KvStore>>,
}

impl Default for AppParts {
    fn default() -> Self {
        Self {
            wifi_driver: Box::new(NoOpWifiDriver::new()),
            mqtt_client: Box::new(NoOpMqttClient::new()),
            provisioner: Box::new(NoOpProvisioner::new()),
            renderer: Arc::new(TracingRenderer),
            credential_store: None,
        }
    }
}

/// Connects the bring-up machine to the managers
struct AppHooks {
    wifi: Weak<WifiManager>,
    provisioning: Weak<ProvisioningManager>,
}

impl BringUpHooks for AppHooks {
    fn start_wifi_connect(&self) {
        let Some(wifi) = self.wifi.upgrade() else {
            return;
        };
        if let Err(e) = wifi.start_connect() {
            tracing::warn!("WiFi connect not started: {}", e);
        }
    }

    fn start_provisioning(&self) {
        if let Some(provisioning) = self.provisioning.upgrade() {
            if let Err(e) = provisioning.start() {
                tracing::error!("Failed to start provisioning: {}", e);
            }
        }
    }

    fn stop_provisioning(&self) {
        if let Some(provisioning) = self.provisioning.upgrade() {
            if provisioning.is_running() {
                if let Err(e) = provisioning.stop() {
                    tracing::warn!("Failed to stop provisioning: {}", e);
                }
            }
        }
    }
}

/// The running device
pub struct App {
    config: Config,
    bus: Arc<EventBus>,
    wifi: Arc<WifiManager>,
    mqtt: Arc<MqttManager>,
    provisioning: Arc<ProvisioningManager>,
    bringup: BringUp,
    display: StatusBoard,
    button: Mutex<ButtonMonitor>,
    button_handler: Mutex<Option<HandlerRef>>,
}

impl App {
    /// Build every component; nothing runs until [`App::start`]
    pub fn new(config: Config, parts: AppParts, clock: ClockRef) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let store: Box<dyn KvStore> = match parts.credential_store {
            Some(store) => store,
            None => {
                let path = config.wifi.credentials_path()?;
                Box::new(
                    JsonFileKvStore::open(&path)
                        .with_context(|| format!("Failed to open {}", path.display()))?,
                )
            }
        };

        let bus = Arc::new(EventBus::new(config.bus.to_bus_config(), clock));
        let wifi = WifiManager::new(
            Arc::clone(&bus),
            parts.wifi_driver,
            store,
            config.wifi.to_manager_config(),
        );
        let mqtt = MqttManager::new(
            Arc::clone(&bus),
            parts.mqtt_client,
            config.mqtt.to_manager_config(),
        );
        let provisioning = ProvisioningManager::new(
            Arc::clone(&bus),
            Arc::clone(&wifi),
            parts.provisioner,
            config.provisioning.device_name.clone(),
        );

        let hooks = Arc::new(AppHooks {
            wifi: Arc::downgrade(&wifi),
            provisioning: Arc::downgrade(&provisioning),
        });
        let bringup = BringUp::new(Arc::clone(&bus), hooks)?;
        let display = StatusBoard::new(Arc::clone(&bus), parts.renderer);

        Ok(Self {
            button: Mutex::new(ButtonMonitor::new(config.provisioning.long_press_ms)),
            button_handler: Mutex::new(None),
            config,
            bus,
            wifi,
            mqtt,
            provisioning,
            bringup,
            display,
        })
    }

    /// Bring the bus, managers and state machine up
    pub fn start(&self) -> Result<()> {
        tracing::info!("========================================");
        tracing::info!("  Uplink {} starting", crate::VERSION);
        tracing::info!("========================================");

        self.bus.init().context("Failed to start event bus")?;
        tracing::info!("Event bus initialized");

        self.wifi.init().context("Failed to start WiFi manager")?;
        tracing::info!("WiFi manager initialized");

        self.mqtt.init().context("Failed to start MQTT manager")?;
        tracing::info!("MQTT manager initialized");

        self.display.attach()?;

        // Long press re-enters provisioning
        let weak_bus = Arc::downgrade(&self.bus);
        let handler = self.bus.subscribe_fn(button::LONG_PRESS, move |_: &Event| {
            if let Some(bus) = weak_bus.upgrade() {
                if let Err(e) = bus.post(cmd::BLUFI_START, EventSource::BUTTON) {
                    tracing::warn!("Failed to request provisioning: {}", e);
                }
            }
        })?;
        *self.button_handler.lock() = Some(handler);

        self.bringup.start().context("Failed to start state machine")?;
        tracing::info!("App state machine started");
        Ok(())
    }

    /// Tear everything down; failures are logged and the rest still stops
    pub fn shutdown(&self) {
        tracing::info!("Shutting down");

        if let Err(e) = self.bringup.stop() {
            tracing::debug!("State machine stop: {}", e);
        }
        if let Some(handler) = self.button_handler.lock().take() {
            if let Err(e) = self.bus.unsubscribe_all(&handler) {
                tracing::debug!("Button handler: {}", e);
            }
        }
        if let Err(e) = self.display.detach() {
            tracing::debug!("Display detach: {}", e);
        }
        if self.provisioning.is_running() {
            if let Err(e) = self.provisioning.stop() {
                tracing::warn!("Provisioning stop: {}", e);
            }
        }
        if let Err(e) = self.mqtt.deinit() {
            tracing::debug!("MQTT deinit: {}", e);
        }
        if let Err(e) = self.wifi.deinit() {
            tracing::debug!("WiFi deinit: {}", e);
        }
        if let Err(e) = self.bus.deinit() {
            tracing::debug!("Event bus deinit: {}", e);
        }
    }

    /// Feed one boot button sample stamped with the bus clock
    pub fn sample_button(&self, pressed: bool) -> Option<ButtonAction> {
        let action = self.button.lock().sample(pressed, self.bus.now_ms())?;
        if let Err(e) = self.bus.publish(action.to_event(0)) {
            tracing::warn!("Failed to publish button event: {}", e);
        }
        Some(action)
    }

    pub fn state(&self) -> AppState {
        self.bringup.state()
    }

    pub fn state_name(&self) -> &'static str {
        self.bringup.state_name()
    }

    pub fn status(&self) -> StatusView {
        self.display.view()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn bringup(&self) -> &BringUp {
        &self.bringup
    }

    pub fn wifi(&self) -> &Arc<WifiManager> {
        &self.wifi
    }

    pub fn mqtt(&self) -> &Arc<MqttManager> {
        &self.mqtt
    }

    pub fn provisioning(&self) -> &Arc<ProvisioningManager> {
        &self.provisioning
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("state", &self.state())
            .field("bringup", &self.bringup)
            .finish_non_exhaustive()
    }
}
