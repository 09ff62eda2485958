//! Completion callbacks for acknowledgement-gated operations.
//!
//! Every operation that talks to the wire takes a [`Completion`] and
//! resolves it exactly once: with `Ok(message)` when the reply confirmed the
//! change, or with a [`CommandError`] when the device rejected it, the
//! transport timed out, or a local step failed. `Completion::complete`
//! consumes the value, so a second resolution cannot be expressed.

use std::fmt;

use linkhub_domain::error::CommandError;
use tokio::sync::oneshot;

/// Outcome of a completed operation: a confirmation message or the failure.
pub type CommandResult = Result<String, CommandError>;

type Callback = Box<dyn FnOnce(CommandResult) + Send>;

/// One-shot completion callback. May be empty when the caller does not care.
#[derive(Default)]
pub struct Completion(Option<Callback>);

impl Completion {
    /// A completion that discards the result.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    /// Wrap a callback.
    #[must_use]
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(CommandResult) + Send + 'static,
    {
        Self(Some(Box::new(callback)))
    }

    /// A completion delivering its result to an awaitable receiver.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<CommandResult>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self::new(move |result| {
            // The receiver may have been dropped by a caller that stopped waiting.
            let _ = tx.send(result);
        });
        (completion, rx)
    }

    /// Whether a callback is attached.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Resolve the completion.
    pub fn complete(mut self, result: CommandResult) {
        if let Some(callback) = self.0.take() {
            callback(result);
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Completion")
            .field(&if self.is_none() { "none" } else { "callback" })
            .finish()
    }
}
