//! # linkhub-adapter-virtual
//!
//! Simulated modem implementing the [`Link`](linkhub_app::ports::Link) port.
//!
//! Every written message is answered the way a modem with the configured
//! devices attached would answer it. Replies are pushed onto an unbounded
//! channel; the daemon reads that channel exactly as it would read a serial
//! link and feeds each message to the protocol.
//!
//! ## Behaviour
//!
//! | Written | Reply |
//! |---------|-------|
//! | `AllLinkUpdate` | same update, ACK (or NAK when configured) |
//! | direct command to an attached device | `DirectAck` echoing `cmd1`; `STATUS` reports the level |
//! | device database write | `DirectAck` with `cmd1 = 0x2f` |
//! | anything addressed to an unknown device | nothing (the protocol times out) |
//!
//! ## Dependency rule
//!
//! Depends on `linkhub-app` (port traits) and `linkhub-domain` only.

mod modem;

pub use modem::VirtualModem;
