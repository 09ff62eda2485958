//! Storage-specific error type.

use std::path::PathBuf;

use linkhub_domain::error::LinkHubError;

/// Errors originating from the JSON file store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading or writing the database file failed.
    #[error("failed to access {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file content is not a valid link database.
    #[error("invalid link database in {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<StorageError> for LinkHubError {
    fn from(err: StorageError) -> Self {
        Self::Storage(Box::new(err))
    }
}
