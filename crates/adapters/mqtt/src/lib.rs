//! # linkhub-adapter-mqtt
//!
//! MQTT adapter — bridges linkhub devices onto an MQTT broker.
//!
//! ## Responsibilities
//! - Render topics and payloads from [`MsgTemplate`]s
//! - Publish device state changes (dimmer level, sensor state, low battery)
//! - Subscribe to command topics and route each publish, by exact topic, to
//!   the [`Bridge`] that registered it
//! - Drive the rumqttc event loop with reconnection
//!
//! ## Dependency rule
//! Same as other adapters: depends on `linkhub-app` and `linkhub-domain`.

pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod publisher;
pub mod template;

pub use bridge::{BatterySensorBridge, Bridge, DimmerBridge};
pub use client::{MqttClient, Router};
pub use config::MqttConfig;
pub use error::{MqttError, TemplateError};
pub use publisher::Publisher;
pub use rumqttc::QoS;
pub use template::{MsgTemplate, TemplateData};
