//! All-link database — controller/responder records owned by one device.
//!
//! Every device (and the modem) keeps a table of links describing which
//! group broadcasts it sends to or reacts to. A record is identified by the
//! remote address, the group and the role; only its data bytes can change
//! in place.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;

/// Role of the owning device in a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkRole {
    /// The owner sends group broadcasts to the remote device.
    Controller,
    /// The owner reacts to group broadcasts from the remote device.
    Responder,
}

impl LinkRole {
    #[must_use]
    pub fn from_is_controller(is_controller: bool) -> Self {
        if is_controller {
            Self::Controller
        } else {
            Self::Responder
        }
    }

    #[must_use]
    pub fn is_controller(self) -> bool {
        self == Self::Controller
    }

    /// The other role for the same (address, group) pair.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Controller => Self::Responder,
            Self::Responder => Self::Controller,
        }
    }
}

impl fmt::Display for LinkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Controller => f.write_str("CTRL"),
            Self::Responder => f.write_str("RESP"),
        }
    }
}

/// Unique identity of a record within one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    pub addr: Address,
    pub group: u8,
    pub role: LinkRole,
}

/// One link record.
///
/// `data` holds three bytes; for responders `[0]` is the on level and `[1]`
/// the ramp rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkEntry {
    pub addr: Address,
    pub group: u8,
    pub role: LinkRole,
    pub data: [u8; 3],
}

impl LinkEntry {
    #[must_use]
    pub fn new(addr: Address, group: u8, role: LinkRole, data: [u8; 3]) -> Self {
        Self {
            addr,
            group,
            role,
            data,
        }
    }

    #[must_use]
    pub fn controller(addr: Address, group: u8, data: [u8; 3]) -> Self {
        Self::new(addr, group, LinkRole::Controller, data)
    }

    #[must_use]
    pub fn responder(addr: Address, group: u8, data: [u8; 3]) -> Self {
        Self::new(addr, group, LinkRole::Responder, data)
    }

    #[must_use]
    pub fn key(&self) -> EntryKey {
        EntryKey {
            addr: self.addr,
            group: self.group,
            role: self.role,
        }
    }
}

impl fmt::Display for LinkEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ID: {}  grp: {}  type: {}  data: {:#04x} {:#04x} {:#04x}",
            self.addr, self.group, self.role, self.data[0], self.data[1], self.data[2]
        )
    }
}

/// In-memory link table of one device, ordered by key.
///
/// Persistence is not handled here; the application layer saves the
/// database after each confirmed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDatabase {
    owner: Address,
    entries: BTreeMap<EntryKey, LinkEntry>,
}

impl LinkDatabase {
    /// Create an empty database for the device at `owner`.
    #[must_use]
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            entries: BTreeMap::new(),
        }
    }

    /// Build a database from stored records. Later duplicates replace earlier ones.
    #[must_use]
    pub fn from_entries(owner: Address, entries: impl IntoIterator<Item = LinkEntry>) -> Self {
        let mut db = Self::new(owner);
        for entry in entries {
            db.add(entry);
        }
        db
    }

    #[must_use]
    pub fn owner(&self) -> Address {
        self.owner
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &EntryKey) -> Option<&LinkEntry> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &EntryKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over all records in key order.
    pub fn iter(&self) -> impl Iterator<Item = &LinkEntry> {
        self.entries.values()
    }

    /// All records for `addr` in `group`, whatever their role.
    pub fn find(&self, addr: Address, group: u8) -> impl Iterator<Item = &LinkEntry> {
        self.entries
            .values()
            .filter(move |e| e.addr == addr && e.group == group)
    }

    /// Insert a record, replacing (and returning) any record with the same key.
    pub fn add(&mut self, entry: LinkEntry) -> Option<LinkEntry> {
        self.entries.insert(entry.key(), entry)
    }

    /// Remove the record with `key`.
    pub fn remove(&mut self, key: &EntryKey) -> Option<LinkEntry> {
        self.entries.remove(key)
    }

    /// Overwrite the data bytes of an existing record. The key is untouched.
    ///
    /// Returns `false` if no record has this key.
    pub fn set_data(&mut self, key: &EntryKey, data: [u8; 3]) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.data = data;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> Address {
        Address::new(0xaa, 0xbb, 0xcc)
    }

    #[test]
    fn should_keep_one_record_per_key() {
        let mut db = LinkDatabase::new(Address::new(1, 2, 3));
        db.add(LinkEntry::controller(remote(), 1, [0, 0, 0]));
        let replaced = db.add(LinkEntry::controller(remote(), 1, [3, 2, 1]));

        assert_eq!(db.len(), 1);
        assert_eq!(replaced.map(|e| e.data), Some([0, 0, 0]));
    }

    #[test]
    fn should_distinguish_roles_for_same_address_and_group() {
        let mut db = LinkDatabase::new(Address::new(1, 2, 3));
        db.add(LinkEntry::controller(remote(), 1, [0, 0, 0]));
        db.add(LinkEntry::responder(remote(), 1, [0, 0, 0]));

        assert_eq!(db.len(), 2);
        assert_eq!(db.find(remote(), 1).count(), 2);
        assert_eq!(db.find(remote(), 2).count(), 0);
    }

    #[test]
    fn should_update_data_without_changing_key() {
        let mut db = LinkDatabase::new(Address::new(1, 2, 3));
        let entry = LinkEntry::responder(remote(), 5, [0xff, 0x1f, 0x01]);
        db.add(entry);

        assert!(db.set_data(&entry.key(), [0x80, 0x00, 0x00]));

        let stored = db.get(&entry.key()).unwrap();
        assert_eq!(stored.data, [0x80, 0x00, 0x00]);
        assert_eq!(stored.key(), entry.key());
    }

    #[test]
    fn should_report_missing_key_on_set_data() {
        let mut db = LinkDatabase::new(Address::new(1, 2, 3));
        let key = LinkEntry::responder(remote(), 5, [0; 3]).key();
        assert!(!db.set_data(&key, [1, 2, 3]));
        assert!(db.is_empty());
    }

    #[test]
    fn should_remove_only_requested_record() {
        let mut db = LinkDatabase::new(Address::new(1, 2, 3));
        let ctrl = LinkEntry::controller(remote(), 1, [0; 3]);
        let resp = LinkEntry::responder(remote(), 1, [0; 3]);
        db.add(ctrl);
        db.add(resp);

        assert_eq!(db.remove(&ctrl.key()), Some(ctrl));
        assert!(db.contains(&resp.key()));
        assert_eq!(db.remove(&ctrl.key()), None);
    }

    #[test]
    fn should_iterate_in_address_then_group_order() {
        let db = LinkDatabase::from_entries(
            Address::new(1, 2, 3),
            [
                LinkEntry::controller(Address::new(9, 9, 9), 1, [0; 3]),
                LinkEntry::controller(Address::new(1, 1, 1), 2, [0; 3]),
                LinkEntry::controller(Address::new(1, 1, 1), 1, [0; 3]),
            ],
        );
        let order: Vec<_> = db.iter().map(|e| (e.addr, e.group)).collect();
        assert_eq!(
            order,
            vec![
                (Address::new(1, 1, 1), 1),
                (Address::new(1, 1, 1), 2),
                (Address::new(9, 9, 9), 1),
            ]
        );
    }

    #[test]
    fn should_format_entry_like_a_db_listing() {
        let entry = LinkEntry::controller(remote(), 1, [0xff, 0x1f, 0x01]);
        assert_eq!(
            entry.to_string(),
            "ID: aa.bb.cc  grp: 1  type: CTRL  data: 0xff 0x1f 0x01"
        );
    }
}
