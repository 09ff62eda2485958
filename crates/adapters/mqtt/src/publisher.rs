//! Outbound side of the broker connection.

use rumqttc::{AsyncClient, QoS};

use crate::error::MqttError;

/// Publishes rendered messages.
///
/// Called from device signal listeners, so implementations must not block.
pub trait Publisher: Send + Sync {
    /// Queue one message for the broker.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::Client`] when the message can't be queued.
    fn publish(&self, topic: &str, payload: &str, qos: QoS, retain: bool) -> Result<(), MqttError>;
}

impl Publisher for AsyncClient {
    fn publish(&self, topic: &str, payload: &str, qos: QoS, retain: bool) -> Result<(), MqttError> {
        self.try_publish(topic, qos, retain, payload.as_bytes().to_vec())
            .map_err(MqttError::Client)
    }
}
