//! Bridges between a device and its MQTT topics.
//!
//! A bridge listens to the device's signals and publishes its state, and
//! receives the command payloads published on the topics it registers.

pub mod battery_sensor;
pub mod dimmer;

pub use battery_sensor::BatterySensorBridge;
pub use dimmer::DimmerBridge;

use linkhub_app::completion::Completion;
use linkhub_domain::event::DeviceLabel;

use crate::error::MqttError;

/// Command side of a device bridge.
pub trait Bridge: Send + Sync {
    /// Rendered topics this bridge accepts commands on.
    fn topics(&self) -> Vec<String>;

    /// Apply a command published on `topic`.
    ///
    /// # Errors
    ///
    /// Returns an [`MqttError`] when the payload is not a valid command.
    fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), MqttError>;
}

/// Completion logging the outcome of a bus-initiated command.
fn log_result(device: DeviceLabel, command: &'static str) -> Completion {
    Completion::new(move |result| match result {
        Ok(msg) => tracing::info!(%device, command, %msg, "command complete"),
        Err(err) => tracing::warn!(%device, command, error = %err, "command failed"),
    })
}
