//! # linkhub-domain
//!
//! Pure domain model for the linkhub gateway.
//!
//! ## Responsibilities
//! - Foundational types: device [`Address`](address::Address), error conventions
//! - Define **link databases** (controller/responder records owned by a device)
//! - Define decoded **wire messages** exchanged with the modem
//! - Define **device events** (level, active, low battery changes)
//! - Define validated **flag** inputs for dimmer configuration
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod address;
pub mod error;
pub mod event;
pub mod flags;
pub mod link_db;
pub mod message;
