//! MQTT integration configuration.

use rumqttc::QoS;
use serde::Deserialize;

use crate::error::MqttError;

/// Configuration for the MQTT integration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Connect to the broker at all.
    pub enabled: bool,
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// Quality of service used for subscriptions and publishes (0, 1 or 2).
    pub qos: u8,
    /// Publish state messages with the retain flag.
    pub retain: bool,
    /// Templates used by dimmers (and n-way dimmers).
    pub dimmer: DimmerTopics,
    /// Templates used by battery sensors.
    pub battery_sensor: BatterySensorTopics,
}

/// Dimmer topic and payload templates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DimmerTopics {
    pub state_topic: String,
    /// Variables: `address`, `name`, `on`, `on_str`, `level_255`, `level_100`.
    pub state_payload: String,
    pub level_topic: String,
    pub scene_topic: String,
    pub set_flags_topic: String,
}

/// Battery sensor topic and payload templates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatterySensorTopics {
    pub state_topic: String,
    /// Variables: `address`, `name`, `on`, `on_str`.
    pub state_payload: String,
    pub low_battery_topic: String,
    /// Variables: `address`, `name`, `is_low`, `is_low_str`.
    pub low_battery_payload: String,
}

impl MqttConfig {
    /// Configured quality of service as a rumqttc value.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::InvalidQos`] when `qos` is above 2.
    pub fn qos(&self) -> Result<QoS, MqttError> {
        match self.qos {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(MqttError::InvalidQos(other)),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "linkhub".to_string(),
            keep_alive_secs: 30,
            qos: 1,
            retain: false,
            dimmer: DimmerTopics::default(),
            battery_sensor: BatterySensorTopics::default(),
        }
    }
}

impl Default for DimmerTopics {
    fn default() -> Self {
        Self {
            state_topic: "insteon/{{address}}/state".to_string(),
            state_payload: r#"{ "state" : "{{on_str|upper}}", "brightness" : {{level_255}} }"#
                .to_string(),
            level_topic: "insteon/{{address}}/level".to_string(),
            scene_topic: "insteon/{{address}}/scene".to_string(),
            set_flags_topic: "insteon/{{address}}/set_flags".to_string(),
        }
    }
}

impl Default for BatterySensorTopics {
    fn default() -> Self {
        Self {
            state_topic: "insteon/{{address}}/state".to_string(),
            state_payload: "{{on_str|lower}}".to_string(),
            low_battery_topic: "insteon/{{address}}/low_battery".to_string(),
            low_battery_payload: "{{is_low_str|upper}}".to_string(),
        }
    }
}
