//! Decoded wire messages exchanged with the modem.
//!
//! Framing, checksums and byte encoding belong to the link layer; these
//! types are what the link hands to the protocol after decoding, and what
//! the protocol hands to the link for encoding.

use std::fmt;

use crate::address::Address;
use crate::link_db::{LinkEntry, LinkRole};

/// Standard command codes (`cmd1`).
pub mod cmd {
    pub const ON: u8 = 0x11;
    pub const ON_INSTANT: u8 = 0x12;
    pub const OFF: u8 = 0x13;
    pub const OFF_INSTANT: u8 = 0x14;
    pub const BRIGHT: u8 = 0x15;
    pub const DIM: u8 = 0x16;
    pub const STATUS: u8 = 0x19;
    pub const EXTENDED_SET: u8 = 0x2e;
    pub const DB_WRITE: u8 = 0x2f;
    pub const SCENE: u8 = 0x30;
}

/// Sub-commands carried in `data[1]` of an [`cmd::EXTENDED_SET`] message.
pub mod ext_set {
    pub const ON_LEVEL: u8 = 0x06;
    pub const BACKLIGHT: u8 = 0x07;
}

/// Kind of all-link database modification requested from the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbCommand {
    /// Overwrite the data bytes of an existing record.
    Update,
    AddController,
    AddResponder,
    /// Remove the first record matching address and group.
    Delete,
}

impl DbCommand {
    /// Wire code of the command.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Update => 0x20,
            Self::AddController => 0x40,
            Self::AddResponder => 0x41,
            Self::Delete => 0x80,
        }
    }

    /// The add command creating a record with `role`.
    #[must_use]
    pub fn add(role: LinkRole) -> Self {
        match role {
            LinkRole::Controller => Self::AddController,
            LinkRole::Responder => Self::AddResponder,
        }
    }
}

impl fmt::Display for DbCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Update => "update",
            Self::AddController => "add-controller",
            Self::AddResponder => "add-responder",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Modem all-link database update. The modem echoes it back with an ACK
/// or NAK flag once the change has been applied or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllLinkUpdate {
    pub cmd: DbCommand,
    pub entry: LinkEntry,
    pub is_ack: bool,
}

impl AllLinkUpdate {
    /// Outbound request.
    #[must_use]
    pub fn new(cmd: DbCommand, entry: LinkEntry) -> Self {
        Self {
            cmd,
            entry,
            is_ack: false,
        }
    }

    /// The modem's echo of this request.
    #[must_use]
    pub fn reply(self, is_ack: bool) -> Self {
        Self { is_ack, ..self }
    }
}

/// Direct command sent to a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectCommand {
    pub to: Address,
    pub cmd1: u8,
    pub cmd2: u8,
    /// Payload of extended messages.
    pub data: Option<[u8; 14]>,
}

impl DirectCommand {
    #[must_use]
    pub fn standard(to: Address, cmd1: u8, cmd2: u8) -> Self {
        Self {
            to,
            cmd1,
            cmd2,
            data: None,
        }
    }

    #[must_use]
    pub fn extended(to: Address, cmd1: u8, cmd2: u8, data: [u8; 14]) -> Self {
        Self {
            to,
            cmd1,
            cmd2,
            data: Some(data),
        }
    }
}

/// Write of one record into a device's own link database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbWrite {
    pub to: Address,
    pub cmd: DbCommand,
    pub entry: LinkEntry,
}

/// Flavour of a message received from a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Direct,
    DirectAck,
    DirectNak,
    Broadcast,
    AllLinkBroadcast,
    AllLinkCleanup,
}

/// Standard message received from a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundMessage {
    pub from: Address,
    pub to: Address,
    pub kind: MessageKind,
    pub cmd1: u8,
    pub cmd2: u8,
}

impl InboundMessage {
    /// Group of an all-link broadcast (carried in the low byte of `to`).
    #[must_use]
    pub fn group(&self) -> u8 {
        self.to.bytes()[2]
    }

    /// Whether this is the direct ACK or NAK of a command sent to `from`.
    #[must_use]
    pub fn is_direct_reply(&self) -> bool {
        matches!(self.kind, MessageKind::DirectAck | MessageKind::DirectNak)
    }
}

/// Any decoded message travelling over the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    AllLinkUpdate(AllLinkUpdate),
    Direct(DirectCommand),
    DbWrite(DbWrite),
    Inbound(InboundMessage),
}

impl Message {
    /// Address of the device that sent an inbound message.
    #[must_use]
    pub fn sender(&self) -> Option<Address> {
        match self {
            Self::Inbound(msg) => Some(msg.from),
            _ => None,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllLinkUpdate(m) => write!(
                f,
                "AllLinkUpdate {} {} ack: {}",
                m.cmd, m.entry, m.is_ack
            ),
            Self::Direct(m) => write!(
                f,
                "Direct to: {} cmd: {:#04x} {:#04x}{}",
                m.to,
                m.cmd1,
                m.cmd2,
                if m.data.is_some() { " ext" } else { "" }
            ),
            Self::DbWrite(m) => write!(f, "DbWrite to: {} {} {}", m.to, m.cmd, m.entry),
            Self::Inbound(m) => write!(
                f,
                "Inbound from: {} to: {} {:?} cmd: {:#04x} {:#04x}",
                m.from, m.to, m.kind, m.cmd1, m.cmd2
            ),
        }
    }
}
