//! Topic and payload templates.
//!
//! Templates hold `{{variable}}` placeholders, optionally followed by an
//! `upper` or `lower` filter: `{{on_str|upper}}`. Rendering fails on an
//! unknown variable or filter rather than publishing a half-filled message.

use std::collections::BTreeMap;

use linkhub_domain::address::Address;
use linkhub_domain::event::DeviceLabel;
use rumqttc::QoS;

use crate::error::{MqttError, TemplateError};
use crate::publisher::Publisher;

/// Variables available to a template.
pub type TemplateData = BTreeMap<&'static str, String>;

/// `address` and `name` variables shared by every device template.
///
/// The address is rendered as bare hex (`3a2984`); `name` falls back to it.
#[must_use]
pub fn device_data(label: &DeviceLabel) -> TemplateData {
    let address = hex(label.address);
    let name = label.name.clone().unwrap_or_else(|| address.clone());
    TemplateData::from([("address", address), ("name", name)])
}

fn hex(addr: Address) -> String {
    format!("{:06x}", addr.id())
}

/// An MQTT topic and payload pair with its publish options.
#[derive(Debug, Clone, PartialEq)]
pub struct MsgTemplate {
    topic: String,
    payload: String,
    qos: QoS,
    retain: bool,
}

impl MsgTemplate {
    #[must_use]
    pub fn new(topic: &str, payload: &str) -> Self {
        Self {
            topic: clean_topic(topic),
            payload: payload.to_string(),
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// # Errors
    ///
    /// Returns a [`TemplateError`] when a placeholder can't be rendered.
    pub fn render_topic(&self, data: &TemplateData) -> Result<String, TemplateError> {
        render(&self.topic, data)
    }

    /// # Errors
    ///
    /// Returns a [`TemplateError`] when a placeholder can't be rendered.
    pub fn render_payload(&self, data: &TemplateData) -> Result<String, TemplateError> {
        render(&self.payload, data)
    }

    /// Render both templates and publish. Nothing is published if either
    /// fails to render.
    ///
    /// # Errors
    ///
    /// Returns the render or publish failure.
    pub fn publish(&self, publisher: &dyn Publisher, data: &TemplateData) -> Result<(), MqttError> {
        let topic = self.render_topic(data)?;
        let payload = self.render_payload(data)?;
        tracing::debug!(%topic, %payload, "publishing");
        publisher.publish(&topic, &payload, self.qos, self.retain)
    }
}

/// Strip surrounding whitespace and a trailing `/`.
fn clean_topic(topic: &str) -> String {
    let topic = topic.trim();
    topic.strip_suffix('/').unwrap_or(topic).trim().to_string()
}

fn render(template: &str, data: &TemplateData) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| TemplateError::Unclosed(template.to_string()))?;
        let expr = after[..end].trim();
        let (name, filter) = match expr.split_once('|') {
            Some((name, filter)) => (name.trim(), Some(filter.trim())),
            None => (expr, None),
        };
        let value = data
            .get(name)
            .ok_or_else(|| TemplateError::UnknownVariable(name.to_string()))?;
        match filter {
            None => out.push_str(value),
            Some("upper") => out.push_str(&value.to_uppercase()),
            Some("lower") => out.push_str(&value.to_lowercase()),
            Some(other) => return Err(TemplateError::UnknownFilter(other.to_string())),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}
