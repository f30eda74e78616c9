//! Status display subscriber
//!
//! Folds bus traffic into a [`StatusView`] and hands every change to a
//! [`StatusRenderer`]. The board only listens; it never publishes.

use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use uplink_core::event_bus::{mqtt, provisioning, system, wifi, WifiConnectedInfo, WifiIpInfo};
use uplink_core::{
    thread_safe, Event, EventBus, EventCategory, EventId, HandlerRef, Result, ThreadSafe,
};

/// WiFi link as shown on the status line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum WifiView {
    #[default]
    Disconnected,
    Connected {
        ssid: String,
        rssi: i8,
    },
}

/// Overall device condition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SystemView {
    #[default]
    Booting,
    Ready,
    Provisioning,
    Error,
}

/// Everything the status line knows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub wifi: WifiView,
    pub ip: Option<Ipv4Addr>,
    pub mqtt_connected: bool,
    pub system: SystemView,
    pub ble_connected: bool,
    pub last_event: Option<String>,
}

impl fmt::Display for StatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.wifi {
            WifiView::Disconnected => write!(f, "wifi: down")?,
            WifiView::Connected { ssid, rssi } => write!(f, "wifi: {} ({} dBm)", ssid, rssi)?,
        }
        match self.ip {
            Some(ip) => write!(f, " | ip: {}", ip)?,
            None => write!(f, " | ip: -")?,
        }
        write!(
            f,
            " | mqtt: {} | system: {:?}",
            if self.mqtt_connected { "up" } else { "down" },
            self.system
        )
    }
}

/// Output surface for the status line
pub trait StatusRenderer: Send + Sync {
    fn render(&self, view: &StatusView);
}

/// Renders the status line through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRenderer;

impl StatusRenderer for TracingRenderer {
    fn render(&self, view: &StatusView) {
        tracing::info!(target: "uplink::display", "{}", view);
    }
}

/// Bus subscriber driving the status line
pub struct StatusBoard {
    bus: Arc<EventBus>,
    view: ThreadSafe<StatusView>,
    renderer: Arc<dyn StatusRenderer>,
    handler: parking_lot::Mutex<Option<HandlerRef>>,
}

impl StatusBoard {
    pub fn new(bus: Arc<EventBus>, renderer: Arc<dyn StatusRenderer>) -> Self {
        Self {
            bus,
            view: thread_safe(StatusView::default()),
            renderer,
            handler: parking_lot::Mutex::new(None),
        }
    }

    /// Subscribe to every event; a second call is a no-op
    pub fn attach(&self) -> Result<()> {
        let mut slot = self.handler.lock();
        if slot.is_some() {
            return Ok(());
        }

        let view = Arc::clone(&self.view);
        let renderer = Arc::clone(&self.renderer);
        let handler = self.bus.subscribe_fn(EventId::ANY, move |event: &Event| {
            let snapshot = {
                let mut view = view.lock();
                if !apply(&mut view, event) {
                    return;
                }
                view.clone()
            };
            renderer.render(&snapshot);
        })?;
        *slot = Some(handler);
        tracing::info!("Status display attached");
        Ok(())
    }

    pub fn detach(&self) -> Result<()> {
        if let Some(handler) = self.handler.lock().take() {
            self.bus.unsubscribe_all(&handler)?;
            tracing::info!("Status display detached");
        }
        Ok(())
    }

    /// Copy of the current view
    pub fn view(&self) -> StatusView {
        self.view.lock().clone()
    }
}

impl fmt::Debug for StatusBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusBoard")
            .field("view", &*self.view.lock())
            .field("attached", &self.handler.lock().is_some())
            .finish()
    }
}

/// Fold one event into the view. Returns false when nothing visible changed.
fn apply(view: &mut StatusView, event: &Event) -> bool {
    let before = view.clone();
    match event.category() {
        EventCategory::Wifi => apply_wifi(view, event),
        EventCategory::Mqtt => match event.id {
            mqtt::CONNECTED => view.mqtt_connected = true,
            mqtt::DISCONNECTED => view.mqtt_connected = false,
            _ => {}
        },
        EventCategory::Provisioning => match event.id {
            provisioning::INIT_DONE => view.system = SystemView::Provisioning,
            provisioning::DEINIT_DONE if view.system == SystemView::Provisioning => {
                view.system = SystemView::Booting;
                view.ble_connected = false;
            }
            provisioning::CONNECTED => view.ble_connected = true,
            provisioning::DISCONNECTED => view.ble_connected = false,
            _ => {}
        },
        EventCategory::System => match event.id {
            system::READY => view.system = SystemView::Ready,
            system::ERROR => view.system = SystemView::Error,
            _ => {}
        },
        _ => return false,
    }

    if *view == before {
        return false;
    }
    view.last_event = Some(event.id.to_string());
    true
}

fn apply_wifi(view: &mut StatusView, event: &Event) {
    match event.id {
        wifi::CONNECTED => {
            view.wifi = match event.decode_payload::<WifiConnectedInfo>() {
                Ok(info) => WifiView::Connected {
                    ssid: info.ssid,
                    rssi: info.rssi,
                },
                Err(_) => WifiView::Connected {
                    ssid: String::new(),
                    rssi: 0,
                },
            };
        }
        wifi::DISCONNECTED => {
            view.wifi = WifiView::Disconnected;
            view.ip = None;
            view.mqtt_connected = false;
            if view.system == SystemView::Ready {
                view.system = SystemView::Booting;
            }
        }
        wifi::GOT_IP => {
            if let Ok(info) = event.decode_payload::<WifiIpInfo>() {
                view.ip = Some(info.ip);
            }
        }
        wifi::LOST_IP => view.ip = None,
        _ => {}
    }
}
