//! Event record and id definitions for the event bus.
//!
//! Events are small fixed records: a 16-bit id, a 16-bit source, a
//! millisecond timestamp and an optional byte payload. Ids are partitioned by
//! category through their high byte so a subscriber can tell at a glance which
//! subsystem an event belongs to.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::error::BusError;

/// 16-bit event identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u16);

impl EventId {
    /// Reserved filter value matching every event
    pub const ANY: EventId = EventId(0xFFFF);

    /// Raw id value
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// True for the wildcard filter
    pub const fn is_any(self) -> bool {
        self.0 == Self::ANY.0
    }

    /// Check whether a subscription filter accepts this id
    pub const fn matches(self, id: EventId) -> bool {
        self.is_any() || self.0 == id.0
    }

    /// Category of this id, derived from its high byte
    pub fn category(self) -> EventCategory {
        if self.is_any() {
            return EventCategory::Unknown;
        }
        match self.0 >> 8 {
            0x00 => EventCategory::System,
            0x01 => EventCategory::Wifi,
            0x02 => EventCategory::Provisioning,
            0x03 => EventCategory::Mqtt,
            0x04 => EventCategory::Button,
            0x08 => EventCategory::Command,
            0x10..=0x1F => EventCategory::User,
            _ => EventCategory::Unknown,
        }
    }

    /// Human readable name for known ids
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            system::INIT_DONE => "SYSTEM_INIT_DONE",
            system::READY => "SYSTEM_READY",
            system::ERROR => "SYSTEM_ERROR",
            system::LOW_MEMORY => "SYSTEM_LOW_MEMORY",
            system::REBOOT => "SYSTEM_REBOOT",
            wifi::STA_START => "WIFI_STA_START",
            wifi::STA_STOP => "WIFI_STA_STOP",
            wifi::CONNECTED => "WIFI_CONNECTED",
            wifi::DISCONNECTED => "WIFI_DISCONNECTED",
            wifi::GOT_IP => "WIFI_GOT_IP",
            wifi::LOST_IP => "WIFI_LOST_IP",
            wifi::SCAN_DONE => "WIFI_SCAN_DONE",
            provisioning::INIT_DONE => "BLUFI_INIT_DONE",
            provisioning::DEINIT_DONE => "BLUFI_DEINIT_DONE",
            provisioning::CONNECTED => "BLUFI_CONNECTED",
            provisioning::DISCONNECTED => "BLUFI_DISCONNECTED",
            provisioning::RECV_CONFIG => "BLUFI_RECV_CONFIG",
            provisioning::CONFIG_DONE => "BLUFI_CONFIG_DONE",
            mqtt::CONNECTING => "MQTT_CONNECTING",
            mqtt::CONNECTED => "MQTT_CONNECTED",
            mqtt::DISCONNECTED => "MQTT_DISCONNECTED",
            mqtt::SUBSCRIBED => "MQTT_SUBSCRIBED",
            mqtt::PUBLISHED => "MQTT_PUBLISHED",
            mqtt::DATA => "MQTT_DATA",
            mqtt::ERROR => "MQTT_ERROR",
            button::PRESSED => "BUTTON_PRESSED",
            button::RELEASED => "BUTTON_RELEASED",
            button::CLICK => "BUTTON_CLICK",
            button::DOUBLE_CLICK => "BUTTON_DOUBLE_CLICK",
            button::LONG_PRESS => "BUTTON_LONG_PRESS",
            cmd::WIFI_CONNECT => "CMD_WIFI_CONNECT",
            cmd::WIFI_DISCONNECT => "CMD_WIFI_DISCONNECT",
            cmd::MQTT_CONNECT => "CMD_MQTT_CONNECT",
            cmd::MQTT_DISCONNECT => "CMD_MQTT_DISCONNECT",
            cmd::MQTT_PUBLISH => "CMD_MQTT_PUBLISH",
            cmd::BLUFI_START => "CMD_BLUFI_START",
            cmd::BLUFI_STOP => "CMD_BLUFI_STOP",
            EventId::ANY => "ANY",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}(0x{:04x})", name, self.0),
            None => write!(f, "0x{:04x}", self.0),
        }
    }
}

impl From<u16> for EventId {
    fn from(raw: u16) -> Self {
        EventId(raw)
    }
}

/// Event category for logging and display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// System lifecycle events (0x00xx).
    System,
    /// WiFi station events (0x01xx).
    Wifi,
    /// BLE provisioning events (0x02xx).
    Provisioning,
    /// MQTT session events (0x03xx).
    Mqtt,
    /// Button input events (0x04xx).
    Button,
    /// Command requests (0x08xx).
    Command,
    /// Application defined events (0x10xx and above).
    User,
    /// Anything outside the known ranges.
    Unknown,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventCategory::System => "System",
            EventCategory::Wifi => "WiFi",
            EventCategory::Provisioning => "Provisioning",
            EventCategory::Mqtt => "MQTT",
            EventCategory::Button => "Button",
            EventCategory::Command => "Command",
            EventCategory::User => "User",
            EventCategory::Unknown => "Unknown",
        };
        write!(f, "{}", name)
    }
}

/// System lifecycle events
pub mod system {
    use super::EventId;

    pub const INIT_DONE: EventId = EventId(0x0001);
    pub const READY: EventId = EventId(0x0002);
    pub const ERROR: EventId = EventId(0x0003);
    pub const LOW_MEMORY: EventId = EventId(0x0004);
    pub const REBOOT: EventId = EventId(0x0005);
}

/// WiFi station events
pub mod wifi {
    use super::EventId;

    pub const STA_START: EventId = EventId(0x0101);
    pub const STA_STOP: EventId = EventId(0x0102);
    pub const CONNECTED: EventId = EventId(0x0103);
    pub const DISCONNECTED: EventId = EventId(0x0104);
    pub const GOT_IP: EventId = EventId(0x0105);
    pub const LOST_IP: EventId = EventId(0x0106);
    pub const SCAN_DONE: EventId = EventId(0x0110);
}

/// BLE provisioning events
pub mod provisioning {
    use super::EventId;

    pub const INIT_DONE: EventId = EventId(0x0201);
    pub const DEINIT_DONE: EventId = EventId(0x0202);
    pub const CONNECTED: EventId = EventId(0x0203);
    pub const DISCONNECTED: EventId = EventId(0x0204);
    pub const RECV_CONFIG: EventId = EventId(0x0210);
    pub const CONFIG_DONE: EventId = EventId(0x0211);
}

/// MQTT session events
pub mod mqtt {
    use super::EventId;

    pub const CONNECTING: EventId = EventId(0x0301);
    pub const CONNECTED: EventId = EventId(0x0302);
    pub const DISCONNECTED: EventId = EventId(0x0303);
    pub const SUBSCRIBED: EventId = EventId(0x0310);
    pub const PUBLISHED: EventId = EventId(0x0311);
    pub const DATA: EventId = EventId(0x0320);
    pub const ERROR: EventId = EventId(0x03FF);
}

/// Button input events
pub mod button {
    use super::EventId;

    pub const PRESSED: EventId = EventId(0x0401);
    pub const RELEASED: EventId = EventId(0x0402);
    pub const CLICK: EventId = EventId(0x0403);
    pub const DOUBLE_CLICK: EventId = EventId(0x0404);
    pub const LONG_PRESS: EventId = EventId(0x0405);
}

/// Command requests, consumed by the managers
pub mod cmd {
    use super::EventId;

    pub const WIFI_CONNECT: EventId = EventId(0x0801);
    pub const WIFI_DISCONNECT: EventId = EventId(0x0802);
    pub const MQTT_CONNECT: EventId = EventId(0x0810);
    pub const MQTT_DISCONNECT: EventId = EventId(0x0811);
    pub const MQTT_PUBLISH: EventId = EventId(0x0812);
    pub const BLUFI_START: EventId = EventId(0x0820);
    pub const BLUFI_STOP: EventId = EventId(0x0821);
}

/// First id available to application defined events
pub const USER_BASE: EventId = EventId(0x1000);

/// 16-bit identifier of the component that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventSource(pub u16);

impl EventSource {
    pub const UNKNOWN: EventSource = EventSource(0);
    pub const SYSTEM: EventSource = EventSource(1);
    pub const WIFI: EventSource = EventSource(2);
    pub const PROVISIONING: EventSource = EventSource(3);
    pub const MQTT: EventSource = EventSource(4);
    pub const BUTTON: EventSource = EventSource(5);
    pub const USER: EventSource = EventSource(100);
}

impl Default for EventSource {
    fn default() -> Self {
        EventSource::UNKNOWN
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            EventSource::UNKNOWN => write!(f, "unknown"),
            EventSource::SYSTEM => write!(f, "system"),
            EventSource::WIFI => write!(f, "wifi"),
            EventSource::PROVISIONING => write!(f, "provisioning"),
            EventSource::MQTT => write!(f, "mqtt"),
            EventSource::BUTTON => write!(f, "button"),
            EventSource::USER => write!(f, "user"),
            EventSource(other) => write!(f, "source#{}", other),
        }
    }
}

/// Event payload bytes
///
/// `Owned` bytes belong to the bus once the event is handed over and are
/// released by it exactly once. `Shared` bytes stay with the producer; the bus
/// only drops its own reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Bus-owned copy.
    Owned(Box<[u8]>),
    /// Producer-retained buffer.
    Shared(Arc<[u8]>),
}

impl Payload {
    /// Payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Owned(bytes) => bytes,
            Payload::Shared(bytes) => bytes,
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// True for a zero-length payload
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// True if the bus is responsible for releasing these bytes
    pub fn is_owned(&self) -> bool {
        matches!(self, Payload::Owned(_))
    }
}

/// A single event record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// What happened.
    pub id: EventId,
    /// Who reported it.
    pub source: EventSource,
    /// Milliseconds since boot; `0` means "let the bus stamp it".
    pub timestamp: u32,
    /// Optional payload bytes.
    pub payload: Option<Payload>,
}

impl Event {
    /// Event without payload
    pub fn new(id: EventId, source: EventSource) -> Self {
        Self {
            id,
            source,
            timestamp: 0,
            payload: None,
        }
    }

    /// Event carrying a bus-owned copy of `data`
    ///
    /// Empty data produces an event without payload.
    pub fn with_data(id: EventId, source: EventSource, data: &[u8]) -> Self {
        let payload = if data.is_empty() {
            None
        } else {
            Some(Payload::Owned(data.into()))
        };
        Self {
            id,
            source,
            timestamp: 0,
            payload,
        }
    }

    /// Event referencing producer-retained bytes
    pub fn with_shared(id: EventId, source: EventSource, data: Arc<[u8]>) -> Self {
        Self {
            id,
            source,
            timestamp: 0,
            payload: Some(Payload::Shared(data)),
        }
    }

    /// Event carrying a serialized typed payload
    pub fn with_payload<T: Serialize>(
        id: EventId,
        source: EventSource,
        value: &T,
    ) -> Result<Self, BusError> {
        let bytes = serde_json::to_vec(value).map_err(|e| BusError::Payload {
            reason: e.to_string(),
        })?;
        Ok(Self::with_data(id, source, &bytes))
    }

    /// Set an explicit timestamp
    pub fn at(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// True if the bus must release the payload after delivery
    pub fn owns_payload(&self) -> bool {
        self.payload.as_ref().is_some_and(Payload::is_owned)
    }

    /// Payload bytes, empty when there is none
    pub fn data(&self) -> &[u8] {
        self.payload.as_ref().map(Payload::as_bytes).unwrap_or(&[])
    }

    /// Payload length in bytes
    pub fn data_len(&self) -> usize {
        self.data().len()
    }

    /// Decode a typed payload
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, BusError> {
        let payload = self.payload.as_ref().ok_or_else(|| BusError::Payload {
            reason: format!("event {} carries no payload", self.id),
        })?;
        serde_json::from_slice(payload.as_bytes()).map_err(|e| BusError::Payload {
            reason: e.to_string(),
        })
    }

    /// Category of the event id
    pub fn category(&self) -> EventCategory {
        self.id.category()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from {} @{}ms ({} bytes)",
            self.id,
            self.source,
            self.timestamp,
            self.data_len()
        )
    }
}

/// Payload of `wifi::CONNECTED`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiConnectedInfo {
    pub ssid: String,
    pub bssid: [u8; 6],
    pub rssi: i8,
    pub channel: u8,
}

/// Payload of `wifi::DISCONNECTED`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiDisconnectedInfo {
    /// Driver specific reason code.
    pub reason: u8,
}

/// Payload of `wifi::GOT_IP`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiIpInfo {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

/// One access point found by a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub ssid: String,
    pub rssi: i8,
}

/// Payload of `wifi::SCAN_DONE`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub aps: Vec<AccessPoint>,
}

/// Payload of `provisioning::RECV_CONFIG` and `provisioning::CONFIG_DONE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedConfig {
    pub ssid: String,
}

/// Payload of `mqtt::DATA`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub msg_id: i32,
}

/// Payload of `cmd::MQTT_PUBLISH`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttPublishRequest {
    pub topic: String,
    pub payload: Vec<u8>,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
}

/// Payload of `button::*` events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonInfo {
    pub button_id: u8,
    pub duration_ms: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_category() {
        assert_eq!(system::INIT_DONE.category(), EventCategory::System);
        assert_eq!(wifi::GOT_IP.category(), EventCategory::Wifi);
        assert_eq!(provisioning::CONFIG_DONE.category(), EventCategory::Provisioning);
        assert_eq!(mqtt::ERROR.category(), EventCategory::Mqtt);
        assert_eq!(button::LONG_PRESS.category(), EventCategory::Button);
        assert_eq!(cmd::BLUFI_START.category(), EventCategory::Command);
        assert_eq!(USER_BASE.category(), EventCategory::User);
        assert_eq!(EventId::ANY.category(), EventCategory::Unknown);
    }

    #[test]
    fn test_any_filter_matches_everything() {
        assert!(EventId::ANY.matches(wifi::CONNECTED));
        assert!(wifi::CONNECTED.matches(wifi::CONNECTED));
        assert!(!wifi::CONNECTED.matches(wifi::DISCONNECTED));
    }

    #[test]
    fn test_event_display() {
        let event = Event::new(wifi::GOT_IP, EventSource::WIFI).at(42);
        assert_eq!(event.to_string(), "WIFI_GOT_IP(0x0105) from wifi @42ms (0 bytes)");
        assert_eq!(EventId(0x1234).to_string(), "0x1234");
    }

    #[test]
    fn test_empty_data_has_no_payload() {
        let event = Event::with_data(USER_BASE, EventSource::USER, &[]);
        assert!(event.payload.is_none());
        assert!(!event.owns_payload());
    }

    #[test]
    fn test_shared_payload_is_not_owned() {
        let bytes: Arc<[u8]> = Arc::from(&b"abc"[..]);
        let event = Event::with_shared(USER_BASE, EventSource::USER, bytes);
        assert!(!event.owns_payload());
        assert_eq!(event.data(), b"abc");
    }

    #[test]
    fn test_typed_payload() {
        let info = WifiIpInfo {
            ip: Ipv4Addr::new(192, 168, 1, 20),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
        };
        let event = Event::with_payload(wifi::GOT_IP, EventSource::WIFI, &info).unwrap();
        assert!(event.owns_payload());
        assert_eq!(event.decode_payload::<WifiIpInfo>().unwrap(), info);

        let bare = Event::new(wifi::GOT_IP, EventSource::WIFI);
        assert!(matches!(
            bare.decode_payload::<WifiIpInfo>(),
            Err(BusError::Payload { .. })
        ));
    }
}
