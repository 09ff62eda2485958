//! Protocol — the [`Transport`] implementation over a [`Link`].
//!
//! Requests are written one at a time. Every inbound message is offered to
//! the handler of the outstanding request; messages it does not claim (and
//! everything received while idle) are re-emitted on [`Protocol::signal_unhandled`]
//! so devices can react to broadcasts.
//!
//! Handlers run without the protocol lock held. A send issued from inside a
//! handler or a completion is queued and only written once the current
//! reply has been fully processed.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use linkhub_domain::error::{CommandError, ContractViolation};
use linkhub_domain::message::Message;

use crate::ports::{Disposition, Link, ReplyHandler, Transport};
use crate::signal::Signal;

/// Default bound on the wait for a reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

struct Pending {
    msg: Message,
    handler: Box<dyn ReplyHandler>,
}

struct Active {
    msg: Message,
    // `None` while the handler is being called.
    handler: Option<Box<dyn ReplyHandler>>,
    sent_at: Instant,
}

#[derive(Default)]
struct State {
    queue: VecDeque<Pending>,
    active: Option<Active>,
    dispatching: bool,
}

pub struct Protocol {
    link: Arc<dyn Link>,
    state: Mutex<State>,
    reply_timeout: Duration,
    unhandled: Signal<Message>,
}

impl Protocol {
    #[must_use]
    pub fn new(link: Arc<dyn Link>, reply_timeout: Duration) -> Self {
        Self {
            link,
            state: Mutex::new(State::default()),
            reply_timeout,
            unhandled: Signal::new(),
        }
    }

    /// Inbound messages no handler claimed.
    #[must_use]
    pub fn signal_unhandled(&self) -> &Signal<Message> {
        &self.unhandled
    }

    /// Requests written or queued but not finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        let state = self.lock();
        state.queue.len() + usize::from(state.active.is_some())
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// When the outstanding request times out, if there is one.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lock()
            .active
            .as_ref()
            .map(|active| active.sent_at + self.reply_timeout)
    }

    /// Handle one decoded inbound message.
    ///
    /// # Errors
    ///
    /// Returns the [`ContractViolation`] raised by the active handler. The
    /// handler has already failed its completion and the next queued request
    /// has been started.
    pub fn process(&self, msg: &Message) -> Result<(), ContractViolation> {
        tracing::trace!(%msg, "inbound");
        let handler = {
            let mut state = self.lock();
            let handler = state.active.as_mut().and_then(|active| active.handler.take());
            if handler.is_some() {
                state.dispatching = true;
            }
            handler
        };

        let Some(mut handler) = handler else {
            self.unhandled.emit(msg);
            return Ok(());
        };

        let outcome = handler.on_message(msg, self.link.as_ref());

        let finished = {
            let mut state = self.lock();
            state.dispatching = false;
            match outcome {
                Ok(Disposition::NotMine) => {
                    if let Some(active) = state.active.as_mut() {
                        active.handler = Some(handler);
                    }
                    None
                }
                Ok(Disposition::Continue) => {
                    if let Some(active) = state.active.as_mut() {
                        active.handler = Some(handler);
                        active.sent_at = Instant::now();
                    }
                    None
                }
                Ok(Disposition::Finished) | Err(_) => {
                    state.active = None;
                    Some(handler)
                }
            }
        };
        drop(finished);

        if outcome == Ok(Disposition::NotMine) {
            self.unhandled.emit(msg);
        }

        self.start_next();
        outcome.map(|_| ())
    }

    /// Fail the outstanding request if its reply is overdue at `now`.
    pub fn poll_timeout(&self, now: Instant) {
        let expired = {
            let mut state = self.lock();
            if state.dispatching {
                return;
            }
            let overdue = state
                .active
                .as_ref()
                .is_some_and(|active| now.saturating_duration_since(active.sent_at) >= self.reply_timeout);
            if !overdue {
                return;
            }
            state.dispatching = true;
            state.active.take()
        };

        if let Some(active) = expired {
            tracing::warn!(msg = %active.msg, timeout = ?self.reply_timeout, "no reply received");
            if let Some(mut handler) = active.handler {
                handler.on_failure(CommandError::Timeout(format!(
                    "No reply received for {}",
                    active.msg
                )));
            }
        }
        self.lock().dispatching = false;
        self.start_next();
    }

    /// Write queued requests until one is outstanding or the queue is empty.
    fn start_next(&self) {
        loop {
            let (mut handler, err) = {
                let mut state = self.lock();
                if state.active.is_some() || state.dispatching {
                    return;
                }
                let Some(pending) = state.queue.pop_front() else {
                    return;
                };
                tracing::debug!(msg = %pending.msg, "write");
                match self.link.write(&pending.msg) {
                    Ok(()) => {
                        state.active = Some(Active {
                            msg: pending.msg,
                            handler: Some(pending.handler),
                            sent_at: Instant::now(),
                        });
                        return;
                    }
                    Err(err) => {
                        state.dispatching = true;
                        (pending.handler, err)
                    }
                }
            };

            tracing::error!(%err, "link write failed");
            handler.on_failure(CommandError::Transport(err.to_string()));
            self.lock().dispatching = false;
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for Protocol {
    fn send(&self, msg: Message, handler: Box<dyn ReplyHandler>) {
        self.lock().queue.push_back(Pending { msg, handler });
        self.start_next();
    }
}

impl fmt::Debug for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Protocol")
            .field("queued", &state.queue.len())
            .field("active", &state.active.as_ref().map(|a| a.msg))
            .field("reply_timeout", &self.reply_timeout)
            .finish_non_exhaustive()
    }
}
