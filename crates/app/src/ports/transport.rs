//! Transport port — single-outstanding-request dispatch of wire messages.
//!
//! A caller hands the transport a message together with the
//! [`ReplyHandler`] that will classify the replies. The transport writes one
//! message at a time and feeds every inbound message to the active handler
//! until the handler reports [`Disposition::Finished`]. When no reply
//! arrives in time the transport calls [`ReplyHandler::on_failure`] with a
//! timeout, which handlers treat exactly like a negative acknowledgement.

use linkhub_domain::error::{CommandError, ContractViolation};
use linkhub_domain::message::Message;

use crate::ports::link::Link;

/// How a handler classified an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Not a reply for this handler; offer it elsewhere.
    NotMine,
    /// Handled, and more replies are expected (a follow-up was sent).
    Continue,
    /// Handled, the transaction is over.
    Finished,
}

/// Per-transaction reply state machine.
pub trait ReplyHandler: Send {
    /// Classify and apply an inbound message.
    ///
    /// `link` lets the handler transmit a follow-up message while it stays
    /// the active handler.
    ///
    /// # Errors
    ///
    /// Returns a [`ContractViolation`] on a programming error. The handler
    /// has already failed its completion; the transport treats it as finished.
    fn on_message(&mut self, msg: &Message, link: &dyn Link)
        -> Result<Disposition, ContractViolation>;

    /// The transaction ended without a reply (timeout or write failure).
    fn on_failure(&mut self, error: CommandError);
}

/// Sends messages and routes their replies.
pub trait Transport: Send + Sync {
    /// Queue `msg`; `handler` receives its replies once it is written.
    fn send(&self, msg: Message, handler: Box<dyn ReplyHandler>);
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, msg: Message, handler: Box<dyn ReplyHandler>) {
        (**self).send(msg, handler);
    }
}
