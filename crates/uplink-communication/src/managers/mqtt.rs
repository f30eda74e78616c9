//! MQTT session manager.
//!
//! Owns one [`MqttClient`], keeps the session alive with the fixed-interval
//! reconnect policy and mirrors session changes onto the bus.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use uplink_core::event_bus::{cmd, mqtt, wifi, Event, EventBus, EventSource, MqttPublishRequest};
use uplink_core::{ConnectionError, HandlerRef, Result};
use uuid::Uuid;

use crate::drivers::{EventSink, MqttClient, MqttClientEvent, MqttClientOptions};
use crate::reconnect::{LinkPhase, ReconnectConfig, ReconnectPolicy, StepAction};
use crate::task::PeriodicTask;

const COMPONENT: &str = "mqtt_manager";

/// Default keepalive handed to the client
pub const DEFAULT_KEEPALIVE_SEC: u16 = 60;

/// MQTT manager configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttManagerConfig {
    /// Broker address, e.g. `mqtt://broker.local:1883`. Required.
    pub broker_uri: String,
    /// Client id; generated when absent or empty.
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keepalive_sec: u16,
    /// Retry cadence. A `step_interval_ms` of 0 disables the background task.
    pub reconnect: ReconnectConfig,
}

impl Default for MqttManagerConfig {
    fn default() -> Self {
        Self {
            broker_uri: String::new(),
            client_id: None,
            username: None,
            password: None,
            keepalive_sec: DEFAULT_KEEPALIVE_SEC,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Client id used when the configuration does not name one
pub fn default_client_id() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("uplink-{}", &simple[..12])
}

#[derive(Debug)]
struct MqttState {
    initialized: bool,
    policy: ReconnectPolicy,
    options: Option<MqttClientOptions>,
}

/// MQTT session manager
pub struct MqttManager {
    weak_self: Weak<Self>,
    bus: Arc<EventBus>,
    config: MqttManagerConfig,
    client: Mutex<Box<dyn MqttClient>>,
    state: Mutex<MqttState>,
    handler: Mutex<Option<HandlerRef>>,
    task: Mutex<Option<PeriodicTask>>,
}

impl MqttManager {
    /// Create an uninitialized manager
    pub fn new(bus: Arc<EventBus>, client: Box<dyn MqttClient>, config: MqttManagerConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            bus,
            client: Mutex::new(client),
            state: Mutex::new(MqttState {
                initialized: false,
                policy: ReconnectPolicy::new(config.reconnect),
                options: None,
            }),
            handler: Mutex::new(None),
            task: Mutex::new(None),
            config,
        })
    }

    /// Validate the configuration, subscribe to bus events and make the
    /// first connection attempt
    pub fn init(self: &Arc<Self>) -> Result<()> {
        if self.state.lock().initialized {
            return Err(ConnectionError::already_initialized(COMPONENT).into());
        }
        if self.config.broker_uri.trim().is_empty() {
            tracing::error!("Broker URI is required");
            return Err(ConnectionError::invalid_arg("broker URI is required").into());
        }

        let client_id = match self.config.client_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => default_client_id(),
        };
        let options = MqttClientOptions {
            broker_uri: self.config.broker_uri.clone(),
            client_id,
            username: self.config.username.clone(),
            password: self.config.password.clone(),
            keepalive_sec: if self.config.keepalive_sec > 0 {
                self.config.keepalive_sec
            } else {
                DEFAULT_KEEPALIVE_SEC
            },
        };

        let weak = Arc::downgrade(self);
        let handler = self.bus.subscribe_fn(wifi::GOT_IP, move |event| {
            if let Some(manager) = weak.upgrade() {
                manager.on_bus_event(event);
            }
        })?;
        for filter in [
            wifi::DISCONNECTED,
            cmd::MQTT_CONNECT,
            cmd::MQTT_DISCONNECT,
            cmd::MQTT_PUBLISH,
        ] {
            self.bus.subscribe(filter, Arc::clone(&handler))?;
        }
        *self.handler.lock() = Some(handler);

        {
            let mut state = self.state.lock();
            state.initialized = true;
            state.options = Some(options);
            state.policy = ReconnectPolicy::new(self.config.reconnect);
        }

        if self.config.reconnect.step_interval_ms > 0 {
            let weak = Arc::downgrade(self);
            let period = Duration::from_millis(u64::from(self.config.reconnect.step_interval_ms));
            let task = PeriodicTask::spawn("mqtt_mgr", period, move || {
                if let Some(manager) = weak.upgrade() {
                    let now = manager.bus.now_ms();
                    manager.step(now);
                }
            })?;
            *self.task.lock() = Some(task);
        }

        self.set_phase(LinkPhase::Disconnected);
        tracing::info!("Start initial connection...");
        self.connect_now();
        tracing::info!("MQTT manager initialized");
        Ok(())
    }

    /// Unsubscribe, stop the step task and close the session
    pub fn deinit(&self) -> Result<()> {
        if !self.state.lock().initialized {
            return Err(ConnectionError::not_initialized(COMPONENT).into());
        }

        if let Some(handler) = self.handler.lock().take() {
            if let Err(e) = self.bus.unsubscribe_all(&handler) {
                tracing::debug!("MQTT manager unsubscribe skipped: {}", e);
            }
        }
        if let Some(mut task) = self.task.lock().take() {
            task.stop();
        }
        self.state.lock().policy.mark_idle();
        if let Err(e) = self.client.lock().stop() {
            tracing::warn!("MQTT client stop failed: {}", e);
        }

        let mut state = self.state.lock();
        state.initialized = false;
        state.policy.reset_backoff();
        tracing::info!("MQTT manager deinitialized");
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.state.lock().initialized {
            Ok(())
        } else {
            Err(ConnectionError::not_initialized(COMPONENT).into())
        }
    }

    /// Update the phase and publish the matching bus event
    fn set_phase(&self, phase: LinkPhase) {
        self.state.lock().policy.set_phase(phase);
        self.publish_phase(phase);
    }

    fn publish_phase(&self, phase: LinkPhase) {
        let id = match phase {
            LinkPhase::Connecting => mqtt::CONNECTING,
            LinkPhase::Connected => mqtt::CONNECTED,
            LinkPhase::Disconnected => mqtt::DISCONNECTED,
            LinkPhase::Error => mqtt::ERROR,
            LinkPhase::Idle => return,
        };
        if let Err(e) = self.bus.post(id, EventSource::MQTT) {
            tracing::warn!("Failed to publish MQTT state {}: {}", phase, e);
        }
    }

    /// Start one connection attempt with the resolved options
    fn attempt(&self, now: u32) {
        let options = match self.state.lock().options.clone() {
            Some(options) => options,
            None => return,
        };

        let weak = self.weak_self.clone();
        let sink: EventSink<MqttClientEvent> = Arc::new(move |event| {
            if let Some(manager) = weak.upgrade() {
                manager.on_client_event(event);
            }
        });

        let result = self.client.lock().start(&options, sink);
        if let Err(e) = result {
            tracing::warn!("MQTT connect attempt failed: {}", e);
            self.state.lock().policy.on_error(now);
            self.publish_phase(LinkPhase::Error);
        }
    }

    /// Re-arm the session: clear backoff and connect now
    pub fn start(&self) -> Result<()> {
        self.ensure_initialized()?;
        self.connect_now();
        Ok(())
    }

    /// Explicit attempt that ignores the retry interval
    fn connect_now(&self) {
        let now = self.bus.now_ms();
        {
            let mut state = self.state.lock();
            state.policy.restart();
            state.policy.begin_attempt(now);
        }
        tracing::info!("try connect MQTT server");
        self.publish_phase(LinkPhase::Connecting);
        self.attempt(now);
    }

    /// Close the session and stop retrying
    pub fn stop(&self) -> Result<()> {
        self.ensure_initialized()?;
        self.state.lock().policy.mark_idle();
        self.client.lock().stop()?;
        Ok(())
    }

    /// One reconnect step at tick `now`
    pub fn step(&self, now: u32) {
        let action = {
            let mut state = self.state.lock();
            if !state.initialized {
                return;
            }
            state.policy.step(now)
        };
        if action == StepAction::Connect {
            tracing::info!("try connect MQTT server");
            self.publish_phase(LinkPhase::Connecting);
            self.attempt(now);
        }
    }

    /// Publish a message, returning the client's message id
    pub fn publish(&self, topic: &str, payload: &[u8], qos: u8, retain: bool) -> Result<i32> {
        self.ensure_initialized()?;
        Ok(self.client.lock().publish(topic, payload, qos, retain)?)
    }

    pub fn subscribe(&self, topic: &str, qos: u8) -> Result<i32> {
        self.ensure_initialized()?;
        Ok(self.client.lock().subscribe(topic, qos)?)
    }

    pub fn unsubscribe(&self, topic: &str) -> Result<i32> {
        self.ensure_initialized()?;
        Ok(self.client.lock().unsubscribe(topic)?)
    }

    fn on_bus_event(&self, event: &Event) {
        let result = match event.id {
            wifi::GOT_IP => {
                tracing::info!("WiFi got IP, MQTT backoff cleared");
                let mut state = self.state.lock();
                if state.policy.phase().wants_retry() {
                    state.policy.reset_backoff();
                }
                Ok(())
            }
            wifi::DISCONNECTED => {
                tracing::warn!("WiFi disconnected, MQTT will pause");
                Ok(())
            }
            cmd::MQTT_CONNECT => {
                tracing::info!("Received MQTT_CONNECT command");
                self.start()
            }
            cmd::MQTT_DISCONNECT => {
                tracing::info!("Received MQTT_DISCONNECT command");
                self.stop()
            }
            cmd::MQTT_PUBLISH => match event.decode_payload::<MqttPublishRequest>() {
                Ok(req) => self
                    .publish(&req.topic, &req.payload, req.qos, req.retain)
                    .map(|_| ()),
                Err(e) => Err(e.into()),
            },
            _ => Ok(()),
        };
        if let Err(e) = result {
            tracing::warn!("MQTT manager failed to handle {}: {}", event.id, e);
        }
    }

    /// Feed one client notification into the manager
    pub fn on_client_event(&self, event: MqttClientEvent) {
        let now = self.bus.now_ms();
        match event {
            MqttClientEvent::Connected => {
                tracing::info!("MQTT connected");
                self.state.lock().policy.on_connected();
                self.publish_phase(LinkPhase::Connected);
            }
            MqttClientEvent::Disconnected => {
                tracing::warn!("MQTT disconnected");
                {
                    let mut state = self.state.lock();
                    if state.policy.phase() == LinkPhase::Idle {
                        return;
                    }
                    state.policy.on_disconnected(now);
                }
                self.publish_phase(LinkPhase::Disconnected);
            }
            MqttClientEvent::Error(reason) => {
                tracing::error!("MQTT error: {}", reason);
                self.state.lock().policy.on_error(now);
                self.publish_phase(LinkPhase::Error);
            }
            MqttClientEvent::Message(message) => {
                tracing::debug!("Received data: topic={}", message.topic);
                if let Err(e) = self.bus.post_payload(mqtt::DATA, EventSource::MQTT, &message) {
                    tracing::warn!("Failed to publish MQTT data: {}", e);
                }
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn is_connected(&self) -> bool {
        self.phase() == LinkPhase::Connected
    }

    pub fn phase(&self) -> LinkPhase {
        self.state.lock().policy.phase()
    }

    /// Client id in use, available after `init`
    pub fn client_id(&self) -> Option<String> {
        self.state.lock().options.as_ref().map(|o| o.client_id.clone())
    }
}

impl std::fmt::Debug for MqttManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttManager")
            .field("broker_uri", &self.config.broker_uri)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
