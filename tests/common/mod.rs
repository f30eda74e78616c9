#![allow(dead_code)]

use parking_lot::Mutex;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use uplink::{App, AppParts, ManualClock, StatusRenderer, StatusView};
use uplink_communication::drivers::{
    EventSink, MemoryKvStore, MqttClient, MqttClientEvent, MqttClientOptions, Provisioner,
    ProvisionerEvent, WifiDriver, WifiDriverEvent, WifiStatus,
};
use uplink_core::event_bus::{AccessPoint, WifiConnectedInfo, WifiIpInfo};
use uplink_core::ConnectionError;
use uplink_settings::Config;

pub type CallLog = Arc<Mutex<Vec<String>>>;
type Slot<T> = Arc<Mutex<Option<EventSink<T>>>>;

pub fn count_calls(log: &CallLog, prefix: &str) -> usize {
    log.lock().iter().filter(|c| c.starts_with(prefix)).count()
}

struct ScriptedWifi {
    calls: CallLog,
    sink: Slot<WifiDriverEvent>,
}

impl WifiDriver for ScriptedWifi {
    fn start(&mut self, sink: EventSink<WifiDriverEvent>) -> Result<(), ConnectionError> {
        self.calls.lock().push("start".into());
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ConnectionError> {
        self.calls.lock().push("stop".into());
        Ok(())
    }

    fn connect(&mut self, ssid: &str, _password: &str) -> Result<(), ConnectionError> {
        self.calls.lock().push(format!("connect:{}", ssid));
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

struct ScriptedMqtt {
    calls: CallLog,
    sink: Slot<MqttClientEvent>,
}

impl MqttClient for ScriptedMqtt {
    fn start(
        &mut self,
        options: &MqttClientOptions,
        sink: EventSink<MqttClientEvent>,
    ) -> Result<(), ConnectionError> {
        self.calls.lock().push(format!("start:{}", options.broker_uri));
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ConnectionError> {
        self.calls.lock().push("stop".into());
        Ok(())
    }

    fn publish(&mut self, topic: &str, _payload: &[u8], _qos: u8, _retain: bool) -> Result<i32, ConnectionError> {
        self.calls.lock().push(format!("publish:{}", topic));
        Ok(1)
    }

    fn subscribe(&mut self, topic: &str, _qos: u8) -> Result<i32, ConnectionError> {
        self.calls.lock().push(format!("subscribe:{}", topic));
        Ok(2)
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<i32, ConnectionError> {
        self.calls.lock().push(format!("unsubscribe:{}", topic));
        Ok(3)
    }
}

struct ScriptedProvisioner {
    calls: CallLog,
    sink: Slot<ProvisionerEvent>,
}

impl Provisioner for ScriptedProvisioner {
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
        self.calls.lock().push(format!("wifi_list:{}", aps.len()));
        Ok(())
    }

    fn send_connect_report(&mut self, connected: bool, _ssid: Option<&str>) -> Result<(), ConnectionError> {
        self.calls.lock().push(format!("report:{}", connected));
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

/// Keeps every rendered view
#[derive(Default)]
pub struct CapturingRenderer {
    pub frames: Mutex<Vec<StatusView>>,
}

impl StatusRenderer for CapturingRenderer {
    fn render(&self, view: &StatusView) {
        self.frames.lock().push(view.clone());
    }
}

/// An `App` on a manual clock with scripted collaborators
pub struct Harness {
    pub app: App,
    pub clock: Arc<ManualClock>,
    pub wifi_calls: CallLog,
    pub mqtt_calls: CallLog,
    pub prov_calls: CallLog,
    pub renderer: Arc<CapturingRenderer>,
    wifi_sink: Slot<WifiDriverEvent>,
    mqtt_sink: Slot<MqttClientEvent>,
    prov_sink: Slot<ProvisionerEvent>,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.wifi.step_interval_ms = 0;
    config.mqtt.step_interval_ms = 0;
    config.mqtt.broker_uri = "mqtt://broker.test:1883".to_string();
    config.provisioning.device_name = "UPLINK-TEST".to_string();
    config
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let clock = Arc::new(ManualClock::new(1000));
        let wifi_calls = CallLog::default();
        let mqtt_calls = CallLog::default();
        let prov_calls = CallLog::default();
        let wifi_sink: Slot<WifiDriverEvent> = Arc::default();
        let mqtt_sink: Slot<MqttClientEvent> = Arc::default();
        let prov_sink: Slot<ProvisionerEvent> = Arc::default();
        let renderer = Arc::new(CapturingRenderer::default());

        let parts = AppParts {
            wifi_driver: Box::new(ScriptedWifi {
                calls: Arc::clone(&wifi_calls),
                sink: Arc::clone(&wifi_sink),
            }),
            mqtt_client: Box::new(ScriptedMqtt {
                calls: Arc::clone(&mqtt_calls),
                sink: Arc::clone(&mqtt_sink),
            }),
            provisioner: Box::new(ScriptedProvisioner {
                calls: Arc::clone(&prov_calls),
                sink: Arc::clone(&prov_sink),
            }),
            renderer: renderer.clone(),
            credential_store: Some(Box::new(MemoryKvStore::new())),
        };

        let app = App::new(config, parts, clock.clone()).unwrap();
        Self {
            app,
            clock,
            wifi_calls,
            mqtt_calls,
            prov_calls,
            renderer,
            wifi_sink,
            mqtt_sink,
            prov_sink,
        }
    }

    pub fn settle(&self) {
        assert!(self.app.bus().wait_idle(Duration::from_secs(2)));
    }

    pub fn wifi_event(&self, event: WifiDriverEvent) {
        let sink = self.wifi_sink.lock().clone().expect("wifi driver not started");
        sink(event);
        self.settle();
    }

    pub fn mqtt_event(&self, event: MqttClientEvent) {
        let sink = self.mqtt_sink.lock().clone().expect("mqtt client not started");
        sink(event);
        self.settle();
    }

    pub fn provisioner_event(&self, event: ProvisionerEvent) {
        let sink = self.prov_sink.lock().clone().expect("provisioner not running");
        sink(event);
        self.settle();
    }

    pub fn wifi_up(&self, ssid: &str) {
        self.wifi_event(WifiDriverEvent::Connected(WifiConnectedInfo {
            ssid: ssid.to_string(),
            bssid: [0x24, 0x0a, 0xc4, 0, 0, 1],
            rssi: -52,
            channel: 11,
        }));
    }

    pub fn got_ip(&self) {
        self.wifi_event(WifiDriverEvent::GotIp(WifiIpInfo {
            ip: Ipv4Addr::new(10, 0, 0, 42),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
        }));
    }

    /// Start the app and drive it all the way to `Ready`
    pub fn bring_up(&self, ssid: &str) {
        self.app.start().unwrap();
        self.settle();
        self.app.wifi().connect(ssid, "secret").unwrap();
        self.wifi_up(ssid);
        self.got_ip();
        self.mqtt_event(MqttClientEvent::Connected);
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.app.shutdown();
    }
}
