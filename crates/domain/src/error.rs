//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`LinkHubError`] via `#[from]` when crossing a port boundary.
//! [`CommandError`] is the failure delivered through a completion; it is
//! `Clone` so one failure can be reported up a chain of sequences.

/// Top-level error for operations that fail synchronously.
#[derive(Debug, thiserror::Error)]
pub enum LinkHubError {
    #[error("invalid address")]
    Address(#[from] AddressError),

    #[error("command failed")]
    Command(#[from] CommandError),

    #[error("invalid command sequence usage")]
    Sequence(#[from] SequenceError),

    #[error("invalid flags")]
    Flag(#[from] FlagError),

    #[error("contract violation")]
    Contract(#[from] ContractViolation),

    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Failed to parse a device address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("invalid device address '{0}'")]
    Invalid(String),
}

/// Terminal failure of an acknowledgement-gated operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The device or modem rejected the command.
    #[error("{0}")]
    Nak(String),

    /// No reply arrived within the transport's bound.
    #[error("{0}")]
    Timeout(String),

    /// The message could not be written to the link.
    #[error("transport error: {0}")]
    Transport(String),

    /// The confirmed change could not be persisted.
    #[error("storage error: {0}")]
    Storage(String),

    /// A delete targeted a record that is not in the database.
    #[error("no matching database record: {0}")]
    NoSuchEntry(String),

    /// The device kind does not implement the requested capability.
    #[error("{device} does not support {capability}")]
    Unsupported {
        device: String,
        capability: &'static str,
    },

    /// The flags were rejected before anything was sent.
    #[error(transparent)]
    UnsupportedFlag(#[from] FlagError),

    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
}

impl CommandError {
    /// Failures that came from the wire rather than from local code.
    #[must_use]
    pub fn is_wire_failure(&self) -> bool {
        matches!(self, Self::Nak(_) | Self::Timeout(_) | Self::Transport(_))
    }
}

/// A programming error: an API was used outside of its contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("contract violation: {0}")]
pub struct ContractViolation(pub String);

/// Misuse of a command sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

/// Rejected flag input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlagError {
    #[error("unknown flags {unknown:?}, valid flags are {valid:?}")]
    Unsupported {
        unknown: Vec<String>,
        valid: &'static [&'static str],
    },

    #[error("invalid value for flag '{flag}': expected a byte (0-255)")]
    InvalidValue { flag: String },
}
