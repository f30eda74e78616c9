mod common;

use common::{count_calls, Harness};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uplink::{
    App, AppParts, AppState, BringUp, BringUpHooks, ButtonAction, EventBus, EventBusConfig,
    ManualClock, SystemView, WifiView,
};
use uplink_communication::drivers::{MqttClientEvent, ProvisionerEvent, WifiDriverEvent};
use uplink_communication::KvStore;
use uplink_core::event_bus::{mqtt, system, wifi};
use uplink_core::EventSource;
use uplink_settings::JsonFileKvStore;

#[test]
fn test_start_without_credentials_waits_in_wifi_connecting() {
    let h = Harness::new();
    h.app.start().unwrap();
    h.settle();

    assert_eq!(h.app.state(), AppState::WifiConnecting);
    assert_eq!(h.app.state_name(), "WIFI_CONNECTING");
    assert_eq!(count_calls(&h.wifi_calls, "start"), 1);
    assert_eq!(count_calls(&h.wifi_calls, "connect:"), 0);
    assert_eq!(count_calls(&h.mqtt_calls, "start:mqtt://broker.test:1883"), 1);
}

#[test]
fn test_bring_up_reaches_ready() {
    let h = Harness::new();
    h.bring_up("home");

    assert_eq!(h.app.state(), AppState::Ready);
    assert_eq!(h.app.bringup().previous_state(), Some(AppState::MqttConnecting));
    assert_eq!(count_calls(&h.wifi_calls, "connect:home"), 1);

    let view = h.app.status();
    assert_eq!(view.system, SystemView::Ready);
    assert!(view.mqtt_connected);
    assert_eq!(
        view.wifi,
        WifiView::Connected {
            ssid: "home".to_string(),
            rssi: -52
        }
    );
    assert_eq!(view.ip, Some("10.0.0.42".parse().unwrap()));

    let frames = h.renderer.frames.lock();
    assert!(!frames.is_empty());
    assert_eq!(frames.last().map(|v| v.system), Some(SystemView::Ready));
}

#[test]
fn test_wifi_drop_reconnects_from_wifi_connecting() {
    let h = Harness::new();
    h.bring_up("home");

    h.wifi_event(WifiDriverEvent::Disconnected { reason: 8 });
    assert_eq!(h.app.state(), AppState::WifiConnecting);
    // Re-entering the state starts a fresh attempt
    assert_eq!(count_calls(&h.wifi_calls, "connect:home"), 2);
    assert_eq!(h.app.status().wifi, WifiView::Disconnected);
    assert_eq!(h.app.status().ip, None);

    h.wifi_up("home");
    assert_eq!(h.app.state(), AppState::WifiConnected);
    h.got_ip();
    assert_eq!(h.app.state(), AppState::MqttConnecting);
    h.mqtt_event(MqttClientEvent::Connected);
    assert_eq!(h.app.state(), AppState::Ready);
}

#[test]
fn test_mqtt_drop_waits_in_mqtt_connecting() {
    let h = Harness::new();
    h.bring_up("home");

    h.mqtt_event(MqttClientEvent::Disconnected);
    assert_eq!(h.app.state(), AppState::MqttConnecting);
    assert!(!h.app.status().mqtt_connected);

    h.mqtt_event(MqttClientEvent::Connected);
    assert_eq!(h.app.state(), AppState::Ready);
}

#[test]
fn test_wifi_drop_during_mqtt_connect() {
    let h = Harness::new();
    h.app.start().unwrap();
    h.settle();
    h.app.wifi().connect("home", "secret").unwrap();
    h.wifi_up("home");
    h.got_ip();
    assert_eq!(h.app.state(), AppState::MqttConnecting);

    h.wifi_event(WifiDriverEvent::Disconnected { reason: 2 });
    assert_eq!(h.app.state(), AppState::WifiConnecting);
}

#[test]
fn test_provisioning_round_trip() {
    let h = Harness::new();
    h.bring_up("home");

    h.app.bringup().enter_provisioning().unwrap();
    h.settle();
    assert_eq!(h.app.state(), AppState::BlufiConfig);
    assert!(h.app.provisioning().is_running());
    assert_eq!(count_calls(&h.prov_calls, "init:UPLINK-TEST"), 1);
    assert_eq!(h.app.status().system, SystemView::Provisioning);

    h.provisioner_event(ProvisionerEvent::StaConfig {
        ssid: "office".to_string(),
        password: "pw".to_string(),
    });
    h.provisioner_event(ProvisionerEvent::ConnectRequest);
    h.settle();

    assert_eq!(h.app.state(), AppState::WifiConnecting);
    assert!(!h.app.provisioning().is_running());
    assert_eq!(count_calls(&h.prov_calls, "deinit"), 1);
    assert_eq!(count_calls(&h.wifi_calls, "connect:office"), 1);

    let saved: Vec<String> = h
        .app
        .wifi()
        .saved_credentials()
        .unwrap()
        .into_iter()
        .map(|c| c.ssid)
        .collect();
    assert_eq!(saved, vec!["home", "office"]);
}

#[test]
fn test_provisioning_can_be_abandoned() {
    let h = Harness::new();
    h.app.start().unwrap();
    h.settle();

    h.app.bringup().enter_provisioning().unwrap();
    h.settle();
    assert_eq!(h.app.state(), AppState::BlufiConfig);

    h.app.bringup().exit_provisioning().unwrap();
    h.settle();
    assert_eq!(h.app.state(), AppState::WifiConnecting);
    assert_eq!(count_calls(&h.prov_calls, "deinit"), 1);
}

#[test]
fn test_long_press_enters_provisioning() {
    let h = Harness::new();
    h.bring_up("home");

    assert_eq!(h.app.sample_button(true), None);
    h.clock.advance(500);
    assert_eq!(h.app.sample_button(true), None);
    h.clock.advance(500);
    assert_eq!(
        h.app.sample_button(true),
        Some(ButtonAction::LongPress { held_ms: 1000 })
    );
    h.settle();
    assert_eq!(h.app.state(), AppState::BlufiConfig);

    // Still held: no second request
    h.clock.advance(2000);
    assert_eq!(h.app.sample_button(true), None);
    h.clock.advance(50);
    assert_eq!(
        h.app.sample_button(false),
        Some(ButtonAction::Released { held_ms: 3050 })
    );
    h.settle();
    assert_eq!(h.app.state(), AppState::BlufiConfig);
    assert_eq!(count_calls(&h.prov_calls, "init:"), 1);
}

#[test]
fn test_system_error_is_terminal() {
    let h = Harness::new();
    h.bring_up("home");

    h.app.bus().post(system::ERROR, EventSource::SYSTEM).unwrap();
    h.settle();
    assert_eq!(h.app.state(), AppState::Error);
    assert_eq!(h.app.status().system, SystemView::Error);

    h.app.bus().post(wifi::DISCONNECTED, EventSource::WIFI).unwrap();
    h.app.bus().post(system::INIT_DONE, EventSource::SYSTEM).unwrap();
    h.settle();
    assert_eq!(h.app.state(), AppState::Error);
}

#[test]
fn test_shutdown_stops_everything() {
    let h = Harness::new();
    h.bring_up("home");

    h.app.shutdown();
    assert!(!h.app.bringup().is_running());
    assert!(!h.app.bus().is_initialized());
    assert!(!h.app.wifi().is_initialized());
    assert!(!h.app.mqtt().is_initialized());
    assert_eq!(count_calls(&h.wifi_calls, "stop"), 1);
}

struct NoHooks;

impl BringUpHooks for NoHooks {
    fn start_wifi_connect(&self) {}
    fn start_provisioning(&self) {}
    fn stop_provisioning(&self) {}
}

#[test]
fn test_bring_up_sequence_on_bare_bus() {
    let bus = Arc::new(EventBus::new(
        EventBusConfig::default(),
        Arc::new(ManualClock::new(0)),
    ));
    bus.init().unwrap();
    let bringup = BringUp::new(Arc::clone(&bus), Arc::new(NoHooks)).unwrap();
    bringup.start().unwrap();

    // INIT posts its own INIT_DONE on entry
    assert!(bus.wait_idle(Duration::from_secs(2)));
    assert_eq!(bringup.state(), AppState::WifiConnecting);
    assert_eq!(bringup.previous_state(), Some(AppState::Init));

    for id in [
        wifi::CONNECTED,
        wifi::GOT_IP,
        mqtt::CONNECTED,
    ] {
        bus.post(id, EventSource::SYSTEM).unwrap();
        assert!(bus.wait_idle(Duration::from_secs(2)));
    }
    assert_eq!(bringup.state(), AppState::Ready);

    bus.post(wifi::DISCONNECTED, EventSource::WIFI).unwrap();
    assert!(bus.wait_idle(Duration::from_secs(2)));
    assert_eq!(bringup.state(), AppState::WifiConnecting);

    bringup.stop().unwrap();
    bus.deinit().unwrap();
}

#[test]
fn test_credentials_persist_to_configured_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("creds").join("wifi.json");

    let mut config = common::test_config();
    config.wifi.credentials_file = Some(path.clone());

    let app = App::new(config, AppParts::default(), Arc::new(ManualClock::new(0))).unwrap();
    app.start().unwrap();
    app.wifi().connect("attic", "hunter2").unwrap();
    app.shutdown();

    let store = JsonFileKvStore::open(&path).unwrap();
    assert_eq!(store.get("count").unwrap().as_deref(), Some("1"));
}
