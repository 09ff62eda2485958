//! Battery sensor bridge — state and low battery out, no commands in.

use std::sync::Arc;

use linkhub_app::devices::Device;
use linkhub_app::signal::SlotId;
use linkhub_domain::event::{ActiveChanged, LowBatteryChanged};
use rumqttc::QoS;

use crate::bridge::Bridge;
use crate::config::BatterySensorTopics;
use crate::error::MqttError;
use crate::publisher::Publisher;
use crate::template::{MsgTemplate, device_data};

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

pub struct BatterySensorBridge {
    device: Arc<dyn Device>,
    active_slot: Option<SlotId>,
    battery_slot: Option<SlotId>,
}

impl BatterySensorBridge {
    /// Start publishing the sensor state and battery state.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::Template`] when a topic template can't be
    /// rendered for this device.
    pub fn new(
        device: Arc<dyn Device>,
        topics: &BatterySensorTopics,
        qos: QoS,
        retain: bool,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self, MqttError> {
        let data = device_data(&device.label());
        let state = MsgTemplate::new(&topics.state_topic, &topics.state_payload)
            .with_qos(qos)
            .with_retain(retain);
        let battery = MsgTemplate::new(&topics.low_battery_topic, &topics.low_battery_payload)
            .with_qos(qos)
            .with_retain(retain);
        state.render_topic(&data)?;
        battery.render_topic(&data)?;

        let state_publisher = Arc::clone(&publisher);
        let active_slot = device.active_changed().map(|signal| {
            signal.connect(move |event: &ActiveChanged| {
                tracing::info!(device = %event.device, is_active = event.is_active, "publishing sensor state");
                let mut data = device_data(&event.device);
                data.insert("on", u8::from(event.is_active).to_string());
                data.insert("on_str", on_off(event.is_active).to_string());
                if let Err(err) = state.publish(state_publisher.as_ref(), &data) {
                    tracing::error!(device = %event.device, error = %err, "failed to publish sensor state");
                }
            })
        });

        let battery_slot = device.low_battery_changed().map(|signal| {
            signal.connect(move |event: &LowBatteryChanged| {
                tracing::info!(device = %event.device, is_low = event.is_low, "publishing battery state");
                let mut data = device_data(&event.device);
                data.insert("is_low", u8::from(event.is_low).to_string());
                data.insert("is_low_str", on_off(event.is_low).to_string());
                if let Err(err) = battery.publish(publisher.as_ref(), &data) {
                    tracing::error!(device = %event.device, error = %err, "failed to publish battery state");
                }
            })
        });

        Ok(Self {
            device,
            active_slot,
            battery_slot,
        })
    }
}

impl Bridge for BatterySensorBridge {
    fn topics(&self) -> Vec<String> {
        Vec::new()
    }

    fn handle(&self, topic: &str, _payload: &[u8]) -> Result<(), MqttError> {
        Err(MqttError::InvalidCommand(format!(
            "{} accepts no commands (topic '{topic}')",
            self.device.label()
        )))
    }
}

impl Drop for BatterySensorBridge {
    fn drop(&mut self) {
        if let (Some(signal), Some(slot)) = (self.device.active_changed(), self.active_slot) {
            signal.disconnect(slot);
        }
        if let (Some(signal), Some(slot)) = (self.device.low_battery_changed(), self.battery_slot) {
            signal.disconnect(slot);
        }
    }
}
