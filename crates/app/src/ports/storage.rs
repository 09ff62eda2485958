//! Storage port — persistence of link databases.

use linkhub_domain::address::Address;
use linkhub_domain::error::LinkHubError;
use linkhub_domain::link_db::LinkDatabase;

/// Durable storage of one device's link database.
///
/// `save` is called synchronously after every confirmed mutation and before
/// any follow-up message is sent, so it should be quick.
pub trait LinkDbStore: Send + Sync {
    /// Load the stored database of `owner`, or an empty one if none exists.
    ///
    /// # Errors
    ///
    /// Returns [`LinkHubError::Storage`] when stored data can't be read.
    fn load(&self, owner: Address) -> Result<LinkDatabase, LinkHubError>;

    /// Persist the full current database.
    ///
    /// # Errors
    ///
    /// Returns [`LinkHubError::Storage`] when the write fails.
    fn save(&self, db: &LinkDatabase) -> Result<(), LinkHubError>;
}

impl<T: LinkDbStore + ?Sized> LinkDbStore for std::sync::Arc<T> {
    fn load(&self, owner: Address) -> Result<LinkDatabase, LinkHubError> {
        (**self).load(owner)
    }

    fn save(&self, db: &LinkDatabase) -> Result<(), LinkHubError> {
        (**self).save(db)
    }
}
