//! MQTT adapter error types.

use linkhub_domain::error::{FlagError, LinkHubError};

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The rumqttc client returned an error.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// Failed to parse an incoming MQTT payload as JSON.
    #[error("failed to parse MQTT payload")]
    PayloadParse(#[source] serde_json::Error),

    /// The payload parsed but does not describe a valid command.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A topic or payload template could not be rendered.
    #[error("template error")]
    Template(#[from] TemplateError),

    /// The configured quality of service is not 0, 1 or 2.
    #[error("invalid QoS level {0}")]
    InvalidQos(u8),

    /// Flags rejected before anything was sent.
    #[error("flag error")]
    Flag(#[source] FlagError),
}

/// Failure to render a [`MsgTemplate`](crate::template::MsgTemplate).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unclosed placeholder in template '{0}'")]
    Unclosed(String),

    #[error("unknown template variable '{0}'")]
    UnknownVariable(String),

    #[error("unknown template filter '{0}'")]
    UnknownFilter(String),
}

impl MqttError {
    /// Convert into a [`LinkHubError`] for propagation across port
    /// boundaries.
    pub fn into_domain(self) -> LinkHubError {
        match self {
            Self::Flag(err) => LinkHubError::Flag(err),
            other => LinkHubError::Storage(Box::new(other)),
        }
    }
}

impl From<MqttError> for LinkHubError {
    fn from(err: MqttError) -> Self {
        err.into_domain()
    }
}
