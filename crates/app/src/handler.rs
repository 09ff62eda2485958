//! Reply handlers registered with the [`Transport`](crate::ports::Transport).
//!
//! Each handler is the explicit state of one in-flight transaction: it
//! holds everything needed to classify the replies and to resume once the
//! wire answered.

pub mod direct_cmd;
pub mod reply_sync;

pub use direct_cmd::DirectCmd;
pub use reply_sync::{ReplySync, SyncState};
