//! Modem database modification handler.
//!
//! [`ReplySync`] waits for the modem's echo of an all-link update and only
//! then applies the change to the persisted [`ModemDb`](crate::modem_db::ModemDb).
//! Multi-message edits (delete then re-add, for instance) are queued as
//! follow-ups: each ACK applies the current entry and transmits the next
//! queued message, and the first NAK stops the chain.

use std::collections::VecDeque;
use std::fmt;
use std::sync::PoisonError;

use linkhub_domain::error::{CommandError, ContractViolation, LinkHubError};
use linkhub_domain::link_db::{EntryKey, LinkEntry};
use linkhub_domain::message::{DbCommand, Message};

use crate::completion::{CommandResult, Completion};
use crate::modem_db::SharedModemDb;
use crate::ports::{Disposition, Link, ReplyHandler};

/// Completion of a database transaction. Receives the entry that was
/// current when the transaction ended.
pub type SyncDone = Box<dyn FnOnce(CommandResult, LinkEntry) + Send>;

/// Transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    AwaitingReply,
    ApplyMutation,
    SendNext,
    Done,
    Failed,
}

impl SyncState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

pub struct ReplySync {
    db: SharedModemDb,
    entry: LinkEntry,
    existing: Option<EntryKey>,
    next: VecDeque<(Message, LinkEntry)>,
    on_done: Option<SyncDone>,
    state: SyncState,
}

impl ReplySync {
    /// Handler for an update producing `entry`.
    ///
    /// `existing` is the key of the record an [`DbCommand::Update`]
    /// overwrites; it is `None` for adds and deletes.
    pub fn new<F>(
        db: SharedModemDb,
        entry: LinkEntry,
        existing: Option<EntryKey>,
        on_done: F,
    ) -> Self
    where
        F: FnOnce(CommandResult, LinkEntry) + Send + 'static,
    {
        Self {
            db,
            entry,
            existing,
            next: VecDeque::new(),
            on_done: Some(Box::new(on_done)),
            state: SyncState::AwaitingReply,
        }
    }

    /// Handler reporting to a plain [`Completion`].
    #[must_use]
    pub fn with_completion(
        db: SharedModemDb,
        entry: LinkEntry,
        existing: Option<EntryKey>,
        on_done: Completion,
    ) -> Self {
        Self::new(db, entry, existing, move |result, _entry| {
            on_done.complete(result);
        })
    }

    /// Queue a message to send once the current one is acknowledged.
    /// `entry` is what the database holds if that message succeeds.
    pub fn enqueue_follow_up(&mut self, msg: Message, entry: LinkEntry) {
        self.next.push_back((msg, entry));
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Entry of the message currently awaiting its reply.
    #[must_use]
    pub fn entry(&self) -> &LinkEntry {
        &self.entry
    }

    fn finish(&mut self, state: SyncState, result: CommandResult) {
        self.state = state;
        self.next.clear();
        if let Some(on_done) = self.on_done.take() {
            on_done(result, self.entry);
        }
    }

    fn apply(&mut self, cmd: DbCommand) -> Result<(), LinkHubError> {
        let mut db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        match cmd {
            DbCommand::Delete => {
                tracing::info!(entry = %self.entry, "modem db removed entry");
                db.delete_entry(&self.entry.key())?;
            }
            DbCommand::Update => {
                let Some(existing) = self.existing else {
                    return Err(ContractViolation(format!(
                        "update reply for {} without an existing entry",
                        self.entry
                    ))
                    .into());
                };
                tracing::info!(
                    addr = %self.entry.addr,
                    group = self.entry.group,
                    data = ?self.entry.data,
                    "updating modem db record"
                );
                db.update_data(&existing, self.entry.data)?;
            }
            DbCommand::AddController | DbCommand::AddResponder => {
                tracing::info!(entry = %self.entry, "adding modem db record");
                db.add_entry(self.entry)?;
            }
        }
        Ok(())
    }
}

impl ReplyHandler for ReplySync {
    fn on_message(
        &mut self,
        msg: &Message,
        link: &dyn Link,
    ) -> Result<Disposition, ContractViolation> {
        let Message::AllLinkUpdate(reply) = msg else {
            return Ok(Disposition::NotMine);
        };
        if self.state.is_terminal() {
            return Ok(Disposition::NotMine);
        }

        if !reply.is_ack {
            tracing::error!(%msg, "modem db update failed");
            self.finish(
                SyncState::Failed,
                Err(CommandError::Nak("Modem database update failed".to_string())),
            );
            return Ok(Disposition::Finished);
        }

        self.state = SyncState::ApplyMutation;
        match self.apply(reply.cmd) {
            Ok(()) => {}
            Err(LinkHubError::Contract(violation)) => {
                tracing::error!(%violation, "modem db update rejected");
                self.finish(
                    SyncState::Failed,
                    Err(CommandError::ContractViolation(violation.clone())),
                );
                return Err(violation);
            }
            Err(err) => {
                let reason = match &err {
                    LinkHubError::Storage(source) => source.to_string(),
                    other => other.to_string(),
                };
                tracing::error!(%reason, "modem db could not be saved");
                self.finish(SyncState::Failed, Err(CommandError::Storage(reason)));
                return Ok(Disposition::Finished);
            }
        }

        self.state = SyncState::SendNext;
        let Some((next_msg, next_entry)) = self.next.pop_front() else {
            self.finish(
                SyncState::Done,
                Ok("Modem database update complete".to_string()),
            );
            return Ok(Disposition::Finished);
        };

        tracing::info!(msg = %next_msg, "sending next modem db update");
        self.entry = next_entry;
        if let Err(err) = link.write(&next_msg) {
            tracing::error!(%err, "modem db follow-up not sent");
            self.finish(SyncState::Failed, Err(CommandError::Transport(err.to_string())));
            return Ok(Disposition::Finished);
        }
        self.state = SyncState::AwaitingReply;
        Ok(Disposition::Continue)
    }

    fn on_failure(&mut self, error: CommandError) {
        if self.state.is_terminal() {
            return;
        }
        tracing::warn!(%error, entry = %self.entry, "modem db update aborted");
        self.finish(SyncState::Failed, Err(error));
    }
}

impl fmt::Debug for ReplySync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplySync")
            .field("entry", &self.entry)
            .field("existing", &self.existing)
            .field("pending", &self.next.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
