//! # linkhub-app
//!
//! Application layer — in-process orchestration and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `Link` — writes decoded messages to the modem
//!   - `Transport` / `ReplyHandler` — single-outstanding-request dispatch
//!   - `LinkDbStore` — persists the modem link database
//! - Provide **in-process infrastructure** that doesn't need IO:
//!   - `Signal` — synchronous publish/subscribe
//!   - `CommandSeq` — acknowledgement-gated chains of operations
//!   - `Protocol` — the `Transport` implementation over a `Link`
//! - Reply handlers (`ReplySync`, `DirectCmd`) applying confirmed changes
//! - Devices (`Dimmer`, `BatterySensor`, `Modem`) and the `NWayDimmer` aggregate
//!
//! ## Dependency rule
//! Depends on `linkhub-domain` only (plus `tokio::sync` for completion channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod command_seq;
pub mod completion;
pub mod devices;
pub mod handler;
pub mod modem_db;
pub mod ports;
pub mod protocol;
pub mod registry;
pub mod signal;

#[cfg(test)]
pub(crate) mod testing;
