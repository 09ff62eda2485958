//! Link port — the decoded-message boundary with the modem.
//!
//! Message framing, checksums and the serial port live behind this trait.
//! Inbound messages travel the other way: the link's reader hands each
//! decoded message to [`Protocol::process`](crate::protocol::Protocol::process).

use linkhub_domain::message::Message;

/// Errors raised while writing to the modem.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The connection to the modem is gone.
    #[error("link closed")]
    Closed,

    #[error("link write failed")]
    Io(#[from] std::io::Error),
}

/// Writes one message to the modem.
///
/// Implementations must not call back into the protocol from `write`.
pub trait Link: Send + Sync {
    /// Encode and transmit `msg`.
    ///
    /// # Errors
    ///
    /// Returns a [`LinkError`] when the message could not be transmitted.
    fn write(&self, msg: &Message) -> Result<(), LinkError>;
}

impl<T: Link + ?Sized> Link for std::sync::Arc<T> {
    fn write(&self, msg: &Message) -> Result<(), LinkError> {
        (**self).write(msg)
    }
}
