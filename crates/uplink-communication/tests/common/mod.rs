#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use uplink_communication::drivers::{
    EventSink, MqttClient, MqttClientEvent, MqttClientOptions, Provisioner, ProvisionerEvent,
    WifiDriver, WifiDriverEvent, WifiStatus,
};
use uplink_core::event_bus::AccessPoint;
use uplink_core::{ConnectionError, Event, EventBus, EventBusConfig, EventId, ManualClock};

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn bus_with_clock(start: u32) -> (Arc<EventBus>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start));
    let bus = Arc::new(EventBus::new(EventBusConfig::default(), clock.clone()));
    bus.init().unwrap();
    (bus, clock)
}

/// Records every event seen on the bus
pub struct Recorder {
    bus: Arc<EventBus>,
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn attach(bus: &Arc<EventBus>) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        bus.subscribe_fn(EventId::ANY, move |event: &Event| {
            sink.lock().push(event.clone());
        })
        .unwrap();
        Self {
            bus: Arc::clone(bus),
            events,
        }
    }

    /// Wait for the dispatcher, then return what was seen so far
    pub fn events(&self) -> Vec<Event> {
        assert!(self.bus.wait_idle(Duration::from_secs(2)));
        self.events.lock().clone()
    }

    pub fn ids(&self) -> Vec<EventId> {
        self.events().iter().map(|e| e.id).collect()
    }

    pub fn last(&self, id: EventId) -> Option<Event> {
        self.events().into_iter().rev().find(|e| e.id == id)
    }

    pub fn count(&self, id: EventId) -> usize {
        self.events().iter().filter(|e| e.id == id).count()
    }

    pub fn clear(&self) {
        assert!(self.bus.wait_idle(Duration::from_secs(2)));
        self.events.lock().clear();
    }
}

pub fn count_calls(log: &CallLog, prefix: &str) -> usize {
    log.lock().iter().filter(|c| c.starts_with(prefix)).count()
}

#[derive(Default)]
pub struct MockWifiDriver {
    pub calls: CallLog,
    pub sink: Arc<Mutex<Option<EventSink<WifiDriverEvent>>>>,
    pub fail_connect: Arc<Mutex<bool>>,
}

impl MockWifiDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles kept by the test after the driver moves into a manager
    pub fn handles(&self) -> (CallLog, Arc<Mutex<Option<EventSink<WifiDriverEvent>>>>) {
        (Arc::clone(&self.calls), Arc::clone(&self.sink))
    }
}

impl WifiDriver for MockWifiDriver {
    fn start(&mut self, sink: EventSink<WifiDriverEvent>) -> Result<(), ConnectionError> {
        self.calls.lock().push("start".into());
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ConnectionError> {
        self.calls.lock().push("stop".into());
        Ok(())
    }

    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), ConnectionError> {
        self.calls.lock().push(format!("connect:{}:{}", ssid, password));
        if *self.fail_connect.lock() {
            return Err(ConnectionError::driver("mock_wifi", "radio busy"));
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), ConnectionError> {
        self.calls.lock().push("disconnect".into());
        Ok(())
    }

    fn scan(&mut self) -> Result<(), ConnectionError> {
        self.calls.lock().push("scan".into());
        Ok(())
    }

    fn status(&self) -> WifiStatus {
        WifiStatus::default()
    }
}

#[derive(Default)]
pub struct MockMqttClient {
    pub calls: CallLog,
    pub sink: Arc<Mutex<Option<EventSink<MqttClientEvent>>>>,
    pub options: Arc<Mutex<Option<MqttClientOptions>>>,
    pub fail_start: Arc<Mutex<bool>>,
    /// Report `Disconnected` from inside `stop`, as real clients do
    pub disconnect_on_stop: bool,
}

impl MqttClient for MockMqttClient {
    fn start(
        &mut self,
        options: &MqttClientOptions,
        sink: EventSink<MqttClientEvent>,
    ) -> Result<(), ConnectionError> {
        self.calls.lock().push("start".into());
        *self.options.lock() = Some(options.clone());
        *self.sink.lock() = Some(sink);
        if *self.fail_start.lock() {
            return Err(ConnectionError::driver("mock_mqtt", "connection refused"));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ConnectionError> {
        self.calls.lock().push("stop".into());
        if self.disconnect_on_stop {
            let sink = self.sink.lock().clone();
            if let Some(sink) = sink {
                sink(MqttClientEvent::Disconnected);
            }
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: u8, retain: bool) -> Result<i32, ConnectionError> {
        self.calls.lock().push(format!(
            "publish:{}:{}:{}:{}",
            topic,
            String::from_utf8_lossy(payload),
            qos,
            retain
        ));
        Ok(7)
    }

    fn subscribe(&mut self, topic: &str, qos: u8) -> Result<i32, ConnectionError> {
        self.calls.lock().push(format!("subscribe:{}:{}", topic, qos));
        Ok(8)
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<i32, ConnectionError> {
        self.calls.lock().push(format!("unsubscribe:{}", topic));
        Ok(9)
    }
}

#[derive(Default)]
pub struct MockProvisioner {
    pub calls: CallLog,
    pub sink: Arc<Mutex<Option<EventSink<ProvisionerEvent>>>>,
}

impl Provisioner for MockProvisioner {
    fn init(&mut self, device_name: &str, sink: EventSink<ProvisionerEvent>) -> Result<(), ConnectionError> {
        self.calls.lock().push(format!("init:{}", device_name));
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), ConnectionError> {
        self.calls.lock().push("deinit".into());
        *self.sink.lock() = None;
        Ok(())
    }

    fn send_wifi_list(&mut self, aps: &[AccessPoint]) -> Result<(), ConnectionError> {
        let names: Vec<&str> = aps.iter().map(|ap| ap.ssid.as_str()).collect();
        self.calls.lock().push(format!("wifi_list:{}", names.join(",")));
        Ok(())
    }

    fn send_connect_report(&mut self, connected: bool, ssid: Option<&str>) -> Result<(), ConnectionError> {
        self.calls
            .lock()
            .push(format!("report:{}:{}", connected, ssid.unwrap_or("-")));
        Ok(())
    }

    fn send_custom_data(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        self.calls.lock().push(format!("custom:{}", data.len()));
        Ok(())
    }

    fn is_ble_connected(&self) -> bool {
        false
    }
}
