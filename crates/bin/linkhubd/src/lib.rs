//! # linkhubd — linkhub daemon
//!
//! Composition root that wires all adapters together and runs the event
//! loop.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Load the modem link database from the JSON store
//! - Build the protocol over the link, the modem, the devices and the
//!   n-way aggregates
//! - Bridge devices onto MQTT
//! - Feed link messages to the protocol and expire overdue requests
//! - Handle graceful shutdown (SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

pub mod config;
pub mod hub;
