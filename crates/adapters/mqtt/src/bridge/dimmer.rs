//! Dimmer bridge — level state out, level/scene/flag commands in.
//!
//! Works for any device with a level signal, so n-way dimmers use it too.

use std::sync::Arc;

use linkhub_app::devices::Device;
use linkhub_app::signal::SlotId;
use linkhub_domain::event::LevelChanged;
use rumqttc::QoS;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::bridge::{Bridge, log_result};
use crate::config::DimmerTopics;
use crate::error::MqttError;
use crate::publisher::Publisher;
use crate::template::{MsgTemplate, TemplateData, device_data};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OnOff {
    On,
    Off,
}

/// `{"cmd": "on", "level": 128, "instant": false}`
#[derive(Debug, Deserialize)]
struct LevelCommand {
    cmd: OnOff,
    level: Option<u8>,
    #[serde(default)]
    instant: bool,
}

/// `{"cmd": "off", "group": 1}`, or a bare `on` / `off`.
#[derive(Debug, Deserialize)]
struct SceneCommand {
    cmd: OnOff,
    #[serde(default = "default_group")]
    group: u8,
}

fn default_group() -> u8 {
    1
}

pub struct DimmerBridge {
    device: Arc<dyn Device>,
    level_topic: String,
    scene_topic: String,
    set_flags_topic: String,
    slot: Option<SlotId>,
}

impl DimmerBridge {
    /// Render the command topics and start publishing level changes.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::Template`] when a topic template can't be
    /// rendered for this device.
    pub fn new(
        device: Arc<dyn Device>,
        topics: &DimmerTopics,
        qos: QoS,
        retain: bool,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self, MqttError> {
        let data = device_data(&device.label());
        let topic = |template: &str| MsgTemplate::new(template, "").render_topic(&data);
        let level_topic = topic(&topics.level_topic)?;
        let scene_topic = topic(&topics.scene_topic)?;
        let set_flags_topic = topic(&topics.set_flags_topic)?;

        let state = MsgTemplate::new(&topics.state_topic, &topics.state_payload)
            .with_qos(qos)
            .with_retain(retain);
        // Fail at startup rather than on the first level change.
        state.render_topic(&state_data(&data, 0))?;
        state.render_payload(&state_data(&data, 0))?;

        let slot = device.level_changed().map(|signal| {
            signal.connect(move |event: &LevelChanged| {
                tracing::info!(device = %event.device, level = event.level, "publishing level change");
                let data = state_data(&device_data(&event.device), event.level);
                if let Err(err) = state.publish(publisher.as_ref(), &data) {
                    tracing::error!(device = %event.device, error = %err, "failed to publish level");
                }
            })
        });
        if slot.is_none() {
            tracing::warn!(device = %device.label(), "device reports no level, state will not be published");
        }

        Ok(Self {
            device,
            level_topic,
            scene_topic,
            set_flags_topic,
            slot,
        })
    }

    fn handle_level(&self, payload: &[u8]) -> Result<(), MqttError> {
        let command: LevelCommand =
            serde_json::from_slice(payload).map_err(MqttError::PayloadParse)?;
        let level = match command.cmd {
            OnOff::On => command.level.unwrap_or(0xff),
            OnOff::Off => 0,
        };
        tracing::info!(device = %self.device.label(), level, instant = command.instant, "level command");
        self.device
            .set(level, command.instant, log_result(self.device.label(), "set"));
        Ok(())
    }

    fn handle_scene(&self, payload: &[u8]) -> Result<(), MqttError> {
        let command = match serde_json::from_slice::<SceneCommand>(payload) {
            Ok(command) => command,
            Err(err) => {
                let text = String::from_utf8_lossy(payload).trim().to_lowercase();
                let cmd = match text.as_str() {
                    "on" => OnOff::On,
                    "off" => OnOff::Off,
                    _ => return Err(MqttError::PayloadParse(err)),
                };
                SceneCommand {
                    cmd,
                    group: default_group(),
                }
            }
        };
        tracing::info!(device = %self.device.label(), group = command.group, "scene command");
        self.device.scene(
            command.cmd == OnOff::On,
            command.group,
            log_result(self.device.label(), "scene"),
        );
        Ok(())
    }

    fn handle_set_flags(&self, payload: &[u8]) -> Result<(), MqttError> {
        let flags: Map<String, Value> =
            serde_json::from_slice(payload).map_err(MqttError::PayloadParse)?;
        self.device
            .set_flags(&flags, log_result(self.device.label(), "set_flags"))
            .map_err(MqttError::Flag)
    }
}

impl Bridge for DimmerBridge {
    fn topics(&self) -> Vec<String> {
        vec![
            self.level_topic.clone(),
            self.scene_topic.clone(),
            self.set_flags_topic.clone(),
        ]
    }

    fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        if topic == self.level_topic {
            self.handle_level(payload)
        } else if topic == self.scene_topic {
            self.handle_scene(payload)
        } else if topic == self.set_flags_topic {
            self.handle_set_flags(payload)
        } else {
            Err(MqttError::InvalidCommand(format!("unexpected topic '{topic}'")))
        }
    }
}

impl Drop for DimmerBridge {
    fn drop(&mut self) {
        if let (Some(signal), Some(slot)) = (self.device.level_changed(), self.slot) {
            signal.disconnect(slot);
        }
    }
}

fn state_data(base: &TemplateData, level: u8) -> TemplateData {
    let mut data = base.clone();
    let is_on = level > 0;
    data.insert("on", u8::from(is_on).to_string());
    data.insert("on_str", if is_on { "on" } else { "off" }.to_string());
    data.insert("level_255", level.to_string());
    data.insert("level_100", (u32::from(level) * 100 / 255).to_string());
    data
}
