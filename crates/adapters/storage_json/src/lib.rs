//! # linkhub-adapter-storage-json
//!
//! Persists the modem link database as a JSON file.
//!
//! ## Format
//! A list of records, one per link:
//!
//! ```json
//! [{ "addr": "3a.29.84", "group": 1, "is_controller": true, "data": [3, 0, 1] }]
//! ```
//!
//! Writes go to a sibling temp file that is then renamed over the target,
//! so a crash never leaves a truncated database behind.
//!
//! ## Dependency rule
//! Depends on `linkhub-app` (for the `LinkDbStore` port) and `linkhub-domain`.

pub mod error;

use std::path::{Path, PathBuf};

use linkhub_app::ports::LinkDbStore;
use linkhub_domain::address::Address;
use linkhub_domain::error::LinkHubError;
use linkhub_domain::link_db::{LinkDatabase, LinkEntry, LinkRole};
use serde::{Deserialize, Serialize};

pub use error::StorageError;

/// On-disk shape of one link record.
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    addr: Address,
    group: u8,
    is_controller: bool,
    data: [u8; 3],
}

impl From<&LinkEntry> for Record {
    fn from(entry: &LinkEntry) -> Self {
        Self {
            addr: entry.addr,
            group: entry.group,
            is_controller: entry.role.is_controller(),
            data: entry.data,
        }
    }
}

impl From<Record> for LinkEntry {
    fn from(record: Record) -> Self {
        LinkEntry::new(
            record.addr,
            record.group,
            LinkRole::from_is_controller(record.is_controller),
            record.data,
        )
    }
}

/// [`LinkDbStore`] backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self, owner: Address) -> Result<LinkDatabase, StorageError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no stored link database, starting empty");
                return Ok(LinkDatabase::new(owner));
            }
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let records: Vec<Record> =
            serde_json::from_str(&content).map_err(|source| StorageError::Json {
                path: self.path.clone(),
                source,
            })?;
        let db = LinkDatabase::from_entries(owner, records.into_iter().map(LinkEntry::from));
        tracing::debug!(path = %self.path.display(), entries = db.len(), "link database loaded");
        Ok(db)
    }

    fn write(&self, db: &LinkDatabase) -> Result<(), StorageError> {
        let records: Vec<Record> = db.iter().map(Record::from).collect();
        let json = serde_json::to_string_pretty(&records).map_err(|source| StorageError::Json {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("json.tmp");
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        tracing::debug!(path = %self.path.display(), entries = db.len(), "link database saved");
        Ok(())
    }
}

impl LinkDbStore for JsonFileStore {
    fn load(&self, owner: Address) -> Result<LinkDatabase, LinkHubError> {
        Ok(self.read(owner)?)
    }

    fn save(&self, db: &LinkDatabase) -> Result<(), LinkHubError> {
        Ok(self.write(db)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEM: Address = Address::new(0x44, 0x85, 0x11);
    const REMOTE: Address = Address::new(0x3a, 0x29, 0x84);

    #[test]
    fn should_load_empty_database_when_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("modem.json"));

        let db = store.load(MODEM).unwrap();

        assert!(db.is_empty());
        assert_eq!(db.owner(), MODEM);
    }

    #[test]
    fn should_restore_saved_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("modem.json"));
        let db = LinkDatabase::from_entries(
            MODEM,
            [
                LinkEntry::controller(REMOTE, 1, [3, 0, 1]),
                LinkEntry::responder(REMOTE, 1, [0xff, 0x1f, 1]),
            ],
        );

        store.save(&db).unwrap();
        let loaded = store.load(MODEM).unwrap();

        assert_eq!(loaded, db);
        assert!(!dir.path().join("modem.json.tmp").exists());
    }

    #[test]
    fn should_write_records_in_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modem.json");
        let store = JsonFileStore::new(&path);
        let db = LinkDatabase::from_entries(MODEM, [LinkEntry::controller(REMOTE, 2, [3, 0, 2])]);

        store.save(&db).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                { "addr": "3a.29.84", "group": 2, "is_controller": true, "data": [3, 0, 2] }
            ])
        );
    }

    #[test]
    fn should_read_file_written_by_hand() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modem.json");
        std::fs::write(
            &path,
            r#"[{"addr": "3A.29.84", "group": 1, "is_controller": false, "data": [255, 31, 1]}]"#,
        )
        .unwrap();

        let db = JsonFileStore::new(&path).load(MODEM).unwrap();

        assert_eq!(
            db.iter().copied().collect::<Vec<_>>(),
            vec![LinkEntry::responder(REMOTE, 1, [0xff, 0x1f, 1])]
        );
    }

    #[test]
    fn should_report_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modem.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileStore::new(&path).load(MODEM).unwrap_err();

        assert!(matches!(err, LinkHubError::Storage(_)));
    }

    #[test]
    fn should_create_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state").join("modem.json"));

        store.save(&LinkDatabase::new(MODEM)).unwrap();

        assert!(store.path().exists());
    }
}
