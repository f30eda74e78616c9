//! Top-level bring-up state machine.
//!
//! Drives the device from power-on to `Ready` (WiFi associated, IP leased,
//! MQTT session up) and back down whenever a link drops. Built on the generic
//! [`Fsm`] engine and fed by a single bus subscriber with filter `ANY`.
//!
//! ```text
//! Init --INIT_DONE--> WifiConnecting --CONNECTED--> WifiConnected --GOT_IP--> MqttConnecting
//!                          ^  |                                                   |
//!                          |  +--BLUFI_START--> BlufiConfig         mqtt CONNECTED |
//!                          |                                                       v
//!                          +-------------- wifi DISCONNECTED ------------------- Ready
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use uplink_core::event_bus::{cmd, mqtt, provisioning, system, wifi};
use uplink_core::{
    Event, EventBus, EventId, EventSource, Fsm, FsmConfig, FsmError, HandlerRef, Result, StateDef,
    Transition,
};

/// Bring-up states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppState {
    Init,
    WifiConnecting,
    /// Associated, waiting for DHCP.
    WifiConnected,
    /// IP leased, waiting for the broker.
    MqttConnecting,
    Ready,
    /// BLE provisioning active.
    BlufiConfig,
    Error,
}

impl AppState {
    pub const ALL: [AppState; 7] = [
        AppState::Init,
        AppState::WifiConnecting,
        AppState::WifiConnected,
        AppState::MqttConnecting,
        AppState::Ready,
        AppState::BlufiConfig,
        AppState::Error,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AppState::Init => "INIT",
            AppState::WifiConnecting => "WIFI_CONNECTING",
            AppState::WifiConnected => "WIFI_CONNECTED",
            AppState::MqttConnecting => "MQTT_CONNECTING",
            AppState::Ready => "READY",
            AppState::BlufiConfig => "BLUFI_CONFIG",
            AppState::Error => "ERROR",
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Side effects the state machine triggers in the connectivity managers
///
/// Called on the dispatcher thread while the machine is locked; an
/// implementation must not publish synchronously on the bus.
pub trait BringUpHooks: Send + Sync {
    /// Entered `WifiConnecting`
    fn start_wifi_connect(&self);

    /// Entered `BlufiConfig`
    fn start_provisioning(&self);

    /// Left `BlufiConfig`
    fn stop_provisioning(&self);
}

/// Data handed to every state hook
pub struct BringUpContext {
    bus: Weak<EventBus>,
    hooks: Arc<dyn BringUpHooks>,
}

impl BringUpContext {
    fn post(&self, id: EventId) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        if let Err(e) = bus.post(id, EventSource::SYSTEM) {
            tracing::warn!("Failed to publish {}: {}", id, e);
        }
    }
}

type AppFsm = Fsm<AppState, EventId, BringUpContext>;

const FSM_NAME: &str = "AppFSM";

fn build_fsm(bus: &Arc<EventBus>, hooks: Arc<dyn BringUpHooks>) -> std::result::Result<AppFsm, FsmError> {
    use AppState::*;

    let context = BringUpContext {
        bus: Arc::downgrade(bus),
        hooks,
    };

    let config = FsmConfig::new(FSM_NAME, Init, context)
        .state(StateDef::new(Init, Init.name()).on_enter(|ctx: &mut BringUpContext| {
            tracing::info!("==> INIT state");
            ctx.post(system::INIT_DONE);
        }))
        .state(
            StateDef::new(WifiConnecting, WifiConnecting.name()).on_enter(
                |ctx: &mut BringUpContext| {
                    tracing::info!("==> WIFI_CONNECTING state");
                    ctx.hooks.start_wifi_connect();
                },
            ),
        )
        .state(
            StateDef::new(WifiConnected, WifiConnected.name()).on_enter(|_: &mut BringUpContext| {
                tracing::info!("==> WIFI_CONNECTED state (waiting for IP)");
            }),
        )
        .state(
            StateDef::new(MqttConnecting, MqttConnecting.name()).on_enter(
                |_: &mut BringUpContext| {
                    tracing::info!("==> MQTT_CONNECTING state");
                },
            ),
        )
        .state(StateDef::new(Ready, Ready.name()).on_enter(|ctx: &mut BringUpContext| {
            tracing::info!("==> READY state - system is fully operational");
            ctx.post(system::READY);
        }))
        .state(
            StateDef::new(BlufiConfig, BlufiConfig.name())
                .on_enter(|ctx: &mut BringUpContext| {
                    tracing::info!("==> BLUFI_CONFIG state");
                    ctx.hooks.start_provisioning();
                })
                .on_exit(|ctx: &mut BringUpContext| {
                    tracing::info!("<== Exiting BLUFI_CONFIG state");
                    ctx.hooks.stop_provisioning();
                }),
        )
        .state(StateDef::new(Error, Error.name()).on_enter(|_: &mut BringUpContext| {
            tracing::error!("==> ERROR state");
        }))
        .transition(Transition::new(Init, system::INIT_DONE, WifiConnecting))
        .transition(Transition::new(WifiConnecting, wifi::CONNECTED, WifiConnected))
        .transition(Transition::new(WifiConnecting, cmd::BLUFI_START, BlufiConfig))
        .transition(Transition::new(WifiConnected, wifi::GOT_IP, MqttConnecting))
        .transition(Transition::new(WifiConnected, wifi::DISCONNECTED, WifiConnecting))
        .transition(Transition::new(MqttConnecting, mqtt::CONNECTED, Ready))
        .transition(Transition::new(MqttConnecting, wifi::DISCONNECTED, WifiConnecting))
        .transition(Transition::new(Ready, wifi::DISCONNECTED, WifiConnecting))
        .transition(Transition::new(Ready, mqtt::DISCONNECTED, MqttConnecting))
        .transition(Transition::new(Ready, cmd::BLUFI_START, BlufiConfig))
        .transition(Transition::new(BlufiConfig, provisioning::CONFIG_DONE, WifiConnecting))
        .transition(Transition::new(BlufiConfig, cmd::BLUFI_STOP, WifiConnecting))
        .transition(Transition::any(system::ERROR, Error));

    Fsm::new(config)
}

fn forward(fsm: &Mutex<AppFsm>, event: &Event) {
    match fsm.lock().process_event(event.id) {
        Ok(()) => {}
        Err(FsmError::NotFound { .. }) | Err(FsmError::NotAllowed { .. }) => {}
        Err(e) => tracing::debug!("Bring-up ignored {}: {}", event.id, e),
    }
}

/// Bring-up state machine bound to a bus
pub struct BringUp {
    bus: Arc<EventBus>,
    fsm: Arc<Mutex<AppFsm>>,
    handler: Mutex<Option<HandlerRef>>,
}

impl BringUp {
    /// Build the machine; nothing runs until `start`
    pub fn new(bus: Arc<EventBus>, hooks: Arc<dyn BringUpHooks>) -> Result<Self> {
        let fsm = build_fsm(&bus, hooks)?;
        tracing::info!("App state machine initialized");
        Ok(Self {
            bus,
            fsm: Arc::new(Mutex::new(fsm)),
            handler: Mutex::new(None),
        })
    }

    /// Subscribe to every event and enter `Init`
    pub fn start(&self) -> Result<()> {
        let mut handler_slot = self.handler.lock();
        if handler_slot.is_some() {
            return Err(FsmError::InvalidState {
                fsm: FSM_NAME.to_string(),
                reason: "already running".to_string(),
            }
            .into());
        }

        let fsm = Arc::clone(&self.fsm);
        let handler = self
            .bus
            .subscribe_fn(EventId::ANY, move |event: &Event| forward(&fsm, event))?;

        if let Err(e) = self.fsm.lock().start() {
            if let Err(unsub) = self.bus.unsubscribe_all(&handler) {
                tracing::debug!("Bring-up unsubscribe skipped: {}", unsub);
            }
            return Err(e.into());
        }
        *handler_slot = Some(handler);
        Ok(())
    }

    /// Unsubscribe and leave the current state
    pub fn stop(&self) -> Result<()> {
        if let Some(handler) = self.handler.lock().take() {
            if let Err(e) = self.bus.unsubscribe_all(&handler) {
                tracing::debug!("Bring-up unsubscribe skipped: {}", e);
            }
        }
        self.fsm.lock().stop()?;
        Ok(())
    }

    pub fn state(&self) -> AppState {
        self.fsm.lock().state()
    }

    pub fn state_name(&self) -> &'static str {
        self.state().name()
    }

    pub fn previous_state(&self) -> Option<AppState> {
        self.fsm.lock().previous_state()
    }

    pub fn is_running(&self) -> bool {
        self.fsm.lock().is_running()
    }

    /// Ask the machine to enter BLE provisioning
    pub fn enter_provisioning(&self) -> Result<()> {
        self.bus.post(cmd::BLUFI_START, EventSource::SYSTEM)?;
        Ok(())
    }

    /// Leave BLE provisioning without new credentials
    pub fn exit_provisioning(&self) -> Result<()> {
        self.bus.post(cmd::BLUFI_STOP, EventSource::SYSTEM)?;
        Ok(())
    }
}

impl fmt::Debug for BringUp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BringUp")
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}
