//! Persisted modem link database.
//!
//! [`ModemDb`] pairs the in-memory [`LinkDatabase`] with its
//! [`LinkDbStore`] and saves after every mutation. Only reply handlers
//! mutate it, and only once the modem confirmed the change.

use std::fmt;
use std::sync::{Arc, Mutex};

use linkhub_domain::address::Address;
use linkhub_domain::error::{ContractViolation, LinkHubError};
use linkhub_domain::link_db::{EntryKey, LinkDatabase, LinkEntry};

use crate::ports::LinkDbStore;

/// Modem database shared between the modem and its in-flight handlers.
pub type SharedModemDb = Arc<Mutex<ModemDb>>;

/// Link database saved to durable storage after each change.
pub struct ModemDb {
    db: LinkDatabase,
    store: Arc<dyn LinkDbStore>,
}

impl ModemDb {
    #[must_use]
    pub fn new(db: LinkDatabase, store: Arc<dyn LinkDbStore>) -> Self {
        Self { db, store }
    }

    /// Load the database of `owner` from `store`.
    ///
    /// # Errors
    ///
    /// Propagates the store's load error.
    pub fn load(owner: Address, store: Arc<dyn LinkDbStore>) -> Result<Self, LinkHubError> {
        let db = store.load(owner)?;
        tracing::info!(%owner, entries = db.len(), "loaded modem database");
        Ok(Self::new(db, store))
    }

    /// Wrap into the shared handle used by handlers.
    #[must_use]
    pub fn shared(self) -> SharedModemDb {
        Arc::new(Mutex::new(self))
    }

    #[must_use]
    pub fn database(&self) -> &LinkDatabase {
        &self.db
    }

    /// Insert (or replace) a record and save.
    ///
    /// # Errors
    ///
    /// Returns the store's error if saving fails.
    pub fn add_entry(&mut self, entry: LinkEntry) -> Result<(), LinkHubError> {
        self.db.add(entry);
        self.save()
    }

    /// Remove a record and save. Returns the removed record, if any.
    ///
    /// # Errors
    ///
    /// Returns the store's error if saving fails.
    pub fn delete_entry(&mut self, key: &EntryKey) -> Result<Option<LinkEntry>, LinkHubError> {
        let removed = self.db.remove(key);
        if removed.is_none() {
            tracing::warn!(addr = %key.addr, group = key.group, role = %key.role, "deleted record was not in the modem database");
        }
        self.save()?;
        Ok(removed)
    }

    /// Overwrite the data bytes of an existing record and save.
    ///
    /// # Errors
    ///
    /// Returns [`LinkHubError::Contract`] if `key` is not in the database,
    /// or the store's error if saving fails.
    pub fn update_data(&mut self, key: &EntryKey, data: [u8; 3]) -> Result<(), LinkHubError> {
        if !self.db.set_data(key, data) {
            return Err(ContractViolation(format!(
                "update of missing modem record {} grp {} {}",
                key.addr, key.group, key.role
            ))
            .into());
        }
        self.save()
    }

    /// Persist the current database.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn save(&self) -> Result<(), LinkHubError> {
        self.store.save(&self.db)
    }
}

impl fmt::Debug for ModemDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModemDb").field("db", &self.db).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingStore;

    fn modem() -> Address {
        Address::new(0x44, 0x85, 0x11)
    }

    fn remote() -> Address {
        Address::new(0xaa, 0xbb, 0xcc)
    }

    #[test]
    fn should_save_after_add() {
        let store = Arc::new(RecordingStore::default());
        let mut db = ModemDb::new(LinkDatabase::new(modem()), store.clone());

        db.add_entry(LinkEntry::controller(remote(), 1, [0; 3])).unwrap();

        assert_eq!(store.save_count(), 1);
        assert_eq!(store.last_saved().unwrap().len(), 1);
    }

    #[test]
    fn should_save_after_delete() {
        let store = Arc::new(RecordingStore::default());
        let entry = LinkEntry::controller(remote(), 1, [0; 3]);
        let mut db = ModemDb::new(LinkDatabase::from_entries(modem(), [entry]), store.clone());

        let removed = db.delete_entry(&entry.key()).unwrap();

        assert_eq!(removed, Some(entry));
        assert!(db.database().is_empty());
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn should_reject_update_of_missing_record() {
        let store = Arc::new(RecordingStore::default());
        let mut db = ModemDb::new(LinkDatabase::new(modem()), store.clone());
        let key = LinkEntry::responder(remote(), 1, [0; 3]).key();

        let result = db.update_data(&key, [1, 2, 3]);

        assert!(matches!(result, Err(LinkHubError::Contract(_))));
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn should_propagate_save_failure() {
        let store = Arc::new(RecordingStore::failing());
        let mut db = ModemDb::new(LinkDatabase::new(modem()), store);

        let result = db.add_entry(LinkEntry::controller(remote(), 1, [0; 3]));

        assert!(matches!(result, Err(LinkHubError::Storage(_))));
    }

    #[test]
    fn should_load_through_store() {
        let store = Arc::new(RecordingStore::default());
        let db = ModemDb::load(modem(), store).unwrap();
        assert_eq!(db.database().owner(), modem());
    }
}
