//! The modem — central controller holding the persisted all-link database.

use std::fmt;
use std::sync::{Arc, MutexGuard, PoisonError};

use linkhub_domain::address::Address;
use linkhub_domain::error::CommandError;
use linkhub_domain::link_db::{EntryKey, LinkDatabase, LinkEntry, LinkRole};
use linkhub_domain::message::{AllLinkUpdate, DbCommand, Message};

use crate::completion::Completion;
use crate::handler::ReplySync;
use crate::modem_db::{ModemDb, SharedModemDb};
use crate::ports::Transport;

pub struct Modem {
    addr: Address,
    db: SharedModemDb,
    transport: Arc<dyn Transport>,
}

impl Modem {
    #[must_use]
    pub fn new(db: ModemDb, transport: Arc<dyn Transport>) -> Self {
        Self {
            addr: db.database().owner(),
            db: db.shared(),
            transport,
        }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.addr
    }

    /// Copy of the current database.
    #[must_use]
    pub fn database(&self) -> LinkDatabase {
        self.lock_db().database().clone()
    }

    /// Make the modem a controller of `addr` for `group`.
    pub fn db_add_ctrl_of(&self, addr: Address, group: u8, data: [u8; 3], on_done: Completion) {
        self.db_add(LinkEntry::controller(addr, group, data), on_done);
    }

    /// Make the modem a responder of `addr` for `group`.
    pub fn db_add_resp_of(&self, addr: Address, group: u8, data: [u8; 3], on_done: Completion) {
        self.db_add(LinkEntry::responder(addr, group, data), on_done);
    }

    #[tracing::instrument(skip(self, on_done), fields(modem = %self.addr))]
    fn db_add(&self, entry: LinkEntry, on_done: Completion) {
        let existing = self.lock_db().database().get(&entry.key()).copied();

        let (cmd, existing_key) = match existing {
            Some(current) if current.data == entry.data => {
                tracing::info!(%entry, "modem db record already present");
                on_done.complete(Ok("Entry already exists".to_string()));
                return;
            }
            Some(current) => (DbCommand::Update, Some(current.key())),
            None => (DbCommand::add(entry.role), None),
        };

        tracing::info!(%entry, %cmd, "modem db change requested");
        let handler = ReplySync::with_completion(self.db.clone(), entry, existing_key, on_done);
        self.transport.send(
            Message::AllLinkUpdate(AllLinkUpdate::new(cmd, entry)),
            Box::new(handler),
        );
    }

    /// Delete the record (`addr`, `group`, `role`).
    ///
    /// The modem deletes the first record matching address and group
    /// whatever its role, so when the sibling record of the other role
    /// exists both are deleted and the sibling is added back.
    #[tracing::instrument(skip(self, on_done), fields(modem = %self.addr))]
    pub fn db_delete(&self, addr: Address, group: u8, role: LinkRole, on_done: Completion) {
        let key = EntryKey { addr, group, role };
        let sibling_key = EntryKey {
            role: role.opposite(),
            ..key
        };
        let (target, sibling) = {
            let db = self.lock_db();
            (
                db.database().get(&key).copied(),
                db.database().get(&sibling_key).copied(),
            )
        };

        let Some(target) = target else {
            tracing::warn!(%addr, group, %role, "no modem db record to delete");
            on_done.complete(Err(CommandError::NoSuchEntry(format!(
                "{addr} grp: {group} type: {role}"
            ))));
            return;
        };

        let mut handler = ReplySync::with_completion(self.db.clone(), target, None, on_done);
        if let Some(sibling) = sibling {
            handler.enqueue_follow_up(
                Message::AllLinkUpdate(AllLinkUpdate::new(DbCommand::Delete, sibling)),
                sibling,
            );
            handler.enqueue_follow_up(
                Message::AllLinkUpdate(AllLinkUpdate::new(DbCommand::add(sibling.role), sibling)),
                sibling,
            );
        }

        self.transport.send(
            Message::AllLinkUpdate(AllLinkUpdate::new(DbCommand::Delete, target)),
            Box::new(handler),
        );
    }

    fn lock_db(&self) -> MutexGuard<'_, ModemDb> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Modem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modem")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}
