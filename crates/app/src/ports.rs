//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the orchestration layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod link;
pub mod storage;
pub mod transport;

pub use link::{Link, LinkError};
pub use storage::LinkDbStore;
pub use transport::{Disposition, ReplyHandler, Transport};
