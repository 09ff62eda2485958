//! Virtual modem — answers commands from an in-memory device table.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use linkhub_app::ports::{Link, LinkError};
use linkhub_domain::address::Address;
use linkhub_domain::message::{InboundMessage, Message, MessageKind, cmd};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct State {
    levels: HashMap<Address, u8>,
    nak: HashSet<Address>,
    nak_db: bool,
}

/// A modem with simulated devices attached.
#[derive(Debug)]
pub struct VirtualModem {
    addr: Address,
    state: Mutex<State>,
    tx: mpsc::UnboundedSender<Message>,
}

impl VirtualModem {
    /// Create a modem and the receiving end of its reply stream.
    #[must_use]
    pub fn new(addr: Address) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let modem = Self {
            addr,
            state: Mutex::new(State::default()),
            tx,
        };
        (modem, rx)
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.addr
    }

    /// Attach a device answering direct commands, starting at `level`.
    pub fn attach(&self, device: Address, level: u8) {
        self.lock().levels.insert(device, level);
    }

    /// Current level of an attached device.
    #[must_use]
    pub fn level(&self, device: Address) -> Option<u8> {
        self.lock().levels.get(&device).copied()
    }

    /// Reject every direct command sent to `device`.
    pub fn nak_device(&self, device: Address) {
        self.lock().nak.insert(device);
    }

    /// Reject every modem database update.
    pub fn nak_db_updates(&self, nak: bool) {
        self.lock().nak_db = nak;
    }

    /// Simulate a physical button press on `device`: the device changes
    /// level and broadcasts to its `group` responders.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Closed`] when the reply stream has no reader.
    pub fn press(&self, device: Address, group: u8, cmd1: u8, level: u8) -> Result<(), LinkError> {
        self.lock().levels.insert(device, level);
        tracing::debug!(%device, group, cmd1, level, "virtual button press");
        self.emit(Message::Inbound(InboundMessage {
            from: device,
            to: Address::new(0, 0, group),
            kind: MessageKind::AllLinkBroadcast,
            cmd1,
            cmd2: level,
        }))
    }

    fn reply(&self, msg: &Message) -> Option<Message> {
        let mut state = self.lock();
        match msg {
            Message::AllLinkUpdate(update) => {
                Some(Message::AllLinkUpdate(update.reply(!state.nak_db)))
            }
            Message::Direct(direct) => {
                let current = *state.levels.get(&direct.to)?;
                let nak = state.nak.contains(&direct.to);
                let cmd2 = match direct.cmd1 {
                    _ if nak => direct.cmd2,
                    cmd::ON | cmd::ON_INSTANT => {
                        state.levels.insert(direct.to, direct.cmd2);
                        direct.cmd2
                    }
                    cmd::OFF | cmd::OFF_INSTANT => {
                        state.levels.insert(direct.to, 0);
                        0
                    }
                    cmd::BRIGHT => {
                        state.levels.insert(direct.to, current.saturating_add(8));
                        direct.cmd2
                    }
                    cmd::DIM => {
                        state.levels.insert(direct.to, current.saturating_sub(8));
                        direct.cmd2
                    }
                    cmd::STATUS => current,
                    _ => direct.cmd2,
                };
                Some(self.direct_reply(direct.to, nak, direct.cmd1, cmd2))
            }
            Message::DbWrite(write) => {
                if !state.levels.contains_key(&write.to) {
                    return None;
                }
                let nak = state.nak.contains(&write.to);
                Some(self.direct_reply(write.to, nak, cmd::DB_WRITE, 0))
            }
            Message::Inbound(_) => None,
        }
    }

    fn direct_reply(&self, from: Address, nak: bool, cmd1: u8, cmd2: u8) -> Message {
        Message::Inbound(InboundMessage {
            from,
            to: self.addr,
            kind: if nak {
                MessageKind::DirectNak
            } else {
                MessageKind::DirectAck
            },
            cmd1,
            cmd2,
        })
    }

    fn emit(&self, msg: Message) -> Result<(), LinkError> {
        self.tx.send(msg).map_err(|_| LinkError::Closed)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Link for VirtualModem {
    fn write(&self, msg: &Message) -> Result<(), LinkError> {
        tracing::trace!(%msg, "virtual modem write");
        match self.reply(msg) {
            Some(reply) => self.emit(reply),
            None => {
                tracing::debug!(%msg, "no virtual device answers");
                Ok(())
            }
        }
    }
}
