//! MQTT protocol client interface.

use uplink_core::event_bus::MqttMessage;
use uplink_core::ConnectionError;

use super::EventSink;

/// Asynchronous notifications from the MQTT client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MqttClientEvent {
    /// Session established.
    Connected,
    /// Session closed.
    Disconnected,
    /// Transport or protocol failure.
    Error(String),
    /// Incoming publish.
    Message(MqttMessage),
}

/// Session parameters handed to the client on start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttClientOptions {
    pub broker_uri: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keepalive_sec: u16,
}

/// MQTT protocol client
pub trait MqttClient: Send {
    /// Start one connection attempt with `options`; events go to `sink`
    fn start(
        &mut self,
        options: &MqttClientOptions,
        sink: EventSink<MqttClientEvent>,
    ) -> Result<(), ConnectionError>;

    /// Close the session
    fn stop(&mut self) -> Result<(), ConnectionError>;

    /// Publish, returning the message id
    fn publish(&mut self, topic: &str, payload: &[u8], qos: u8, retain: bool) -> Result<i32, ConnectionError>;

    /// Subscribe, returning the message id
    fn subscribe(&mut self, topic: &str, qos: u8) -> Result<i32, ConnectionError>;

    /// Unsubscribe, returning the message id
    fn unsubscribe(&mut self, topic: &str) -> Result<i32, ConnectionError>;
}

/// Client that accepts every call and never connects
#[derive(Debug, Default)]
pub struct NoOpMqttClient {
    next_msg_id: i32,
}

impl NoOpMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn msg_id(&mut self) -> i32 {
        self.next_msg_id = self.next_msg_id.wrapping_add(1);
        self.next_msg_id
    }
}

impl MqttClient for NoOpMqttClient {
    fn start(
        &mut self,
        options: &MqttClientOptions,
        _sink: EventSink<MqttClientEvent>,
    ) -> Result<(), ConnectionError> {
        tracing::debug!("NoOp MQTT client: start {}", options.broker_uri);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn publish(&mut self, _topic: &str, _payload: &[u8], _qos: u8, _retain: bool) -> Result<i32, ConnectionError> {
        Ok(self.msg_id())
    }

    fn subscribe(&mut self, _topic: &str, _qos: u8) -> Result<i32, ConnectionError> {
        Ok(self.msg_id())
    }

    fn unsubscribe(&mut self, _topic: &str) -> Result<i32, ConnectionError> {
        Ok(self.msg_id())
    }
}
