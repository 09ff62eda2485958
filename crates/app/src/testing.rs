//! In-memory fakes shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use linkhub_domain::address::Address;
use linkhub_domain::error::LinkHubError;
use linkhub_domain::link_db::LinkDatabase;
use linkhub_domain::message::{InboundMessage, Message, MessageKind, cmd};

use crate::ports::{Link, LinkDbStore, LinkError};
use crate::protocol::Protocol;

pub(crate) type Events = Arc<Mutex<Vec<String>>>;

pub(crate) fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) const MODEM: Address = Address::new(0x44, 0x85, 0x11);

/// Store keeping every saved snapshot in memory.
#[derive(Default)]
pub(crate) struct RecordingStore {
    saves: Mutex<Vec<LinkDatabase>>,
    events: Option<Events>,
    fail: bool,
}

impl RecordingStore {
    pub(crate) fn with_events(events: Events) -> Self {
        Self {
            events: Some(events),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }

    pub(crate) fn last_saved(&self) -> Option<LinkDatabase> {
        self.saves.lock().unwrap().last().cloned()
    }
}

impl LinkDbStore for RecordingStore {
    fn load(&self, owner: Address) -> Result<LinkDatabase, LinkHubError> {
        Ok(LinkDatabase::new(owner))
    }

    fn save(&self, db: &LinkDatabase) -> Result<(), LinkHubError> {
        if self.fail {
            return Err(LinkHubError::Storage("disk full".into()));
        }
        self.saves.lock().unwrap().push(db.clone());
        if let Some(events) = &self.events {
            events.lock().unwrap().push("save".to_string());
        }
        Ok(())
    }
}

/// Link recording written messages without replying.
#[derive(Default)]
pub(crate) struct RecordingLink {
    writes: Mutex<Vec<Message>>,
    events: Option<Events>,
    fail: AtomicBool,
}

impl RecordingLink {
    pub(crate) fn with_events(events: Events) -> Self {
        Self {
            events: Some(events),
            ..Self::default()
        }
    }

    pub(crate) fn fail_writes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub(crate) fn writes(&self) -> Vec<Message> {
        self.writes.lock().unwrap().clone()
    }
}

impl Link for RecordingLink {
    fn write(&self, msg: &Message) -> Result<(), LinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LinkError::Closed);
        }
        self.writes.lock().unwrap().push(*msg);
        if let Some(events) = &self.events {
            events.lock().unwrap().push(format!("write {msg}"));
        }
        Ok(())
    }
}

/// Link answering like a modem with devices attached.
///
/// Replies are queued and delivered to the protocol by [`FakeModem::pump`].
#[derive(Default)]
pub(crate) struct FakeModem {
    writes: Mutex<Vec<Message>>,
    replies: Mutex<VecDeque<Message>>,
    levels: Mutex<HashMap<Address, u8>>,
    nak: Mutex<HashSet<Address>>,
    silent: Mutex<HashSet<Address>>,
    nak_db: AtomicBool,
}

impl FakeModem {
    pub(crate) fn set_level(&self, addr: Address, level: u8) {
        self.levels.lock().unwrap().insert(addr, level);
    }

    pub(crate) fn level(&self, addr: Address) -> Option<u8> {
        self.levels.lock().unwrap().get(&addr).copied()
    }

    /// NAK every direct command sent to `addr`.
    pub(crate) fn nak_device(&self, addr: Address) {
        self.nak.lock().unwrap().insert(addr);
    }

    /// Never reply to `addr`.
    pub(crate) fn silence_device(&self, addr: Address) {
        self.silent.lock().unwrap().insert(addr);
    }

    pub(crate) fn nak_db_updates(&self) {
        self.nak_db.store(true, Ordering::SeqCst);
    }

    pub(crate) fn writes(&self) -> Vec<Message> {
        self.writes.lock().unwrap().clone()
    }

    /// Writes addressed to `addr`.
    pub(crate) fn writes_to(&self, addr: Address) -> Vec<Message> {
        self.writes()
            .into_iter()
            .filter(|m| match m {
                Message::Direct(d) => d.to == addr,
                Message::DbWrite(w) => w.to == addr,
                Message::AllLinkUpdate(u) => u.entry.addr == addr,
                Message::Inbound(_) => false,
            })
            .collect()
    }

    /// Feed queued replies to `protocol` until the link is quiet.
    pub(crate) fn pump(&self, protocol: &Protocol) {
        loop {
            let next = self.replies.lock().unwrap().pop_front();
            let Some(reply) = next else { break };
            protocol.process(&reply).unwrap();
        }
    }

    fn reply(&self, msg: &Message) -> Option<Message> {
        match msg {
            Message::AllLinkUpdate(update) => Some(Message::AllLinkUpdate(
                update.reply(!self.nak_db.load(Ordering::SeqCst)),
            )),
            Message::Direct(direct) => {
                if self.silent.lock().unwrap().contains(&direct.to) {
                    return None;
                }
                let nak = self.nak.lock().unwrap().contains(&direct.to);
                let mut cmd2 = direct.cmd2;
                if !nak {
                    let mut levels = self.levels.lock().unwrap();
                    match direct.cmd1 {
                        cmd::ON | cmd::ON_INSTANT => {
                            levels.insert(direct.to, direct.cmd2);
                        }
                        cmd::OFF | cmd::OFF_INSTANT => {
                            levels.insert(direct.to, 0);
                        }
                        cmd::STATUS => cmd2 = levels.get(&direct.to).copied().unwrap_or(0),
                        _ => {}
                    }
                }
                Some(direct_reply(direct.to, nak, direct.cmd1, cmd2))
            }
            Message::DbWrite(write) => {
                if self.silent.lock().unwrap().contains(&write.to) {
                    return None;
                }
                let nak = self.nak.lock().unwrap().contains(&write.to);
                Some(direct_reply(write.to, nak, cmd::DB_WRITE, 0))
            }
            Message::Inbound(_) => None,
        }
    }
}

fn direct_reply(from: Address, nak: bool, cmd1: u8, cmd2: u8) -> Message {
    Message::Inbound(InboundMessage {
        from,
        to: MODEM,
        kind: if nak {
            MessageKind::DirectNak
        } else {
            MessageKind::DirectAck
        },
        cmd1,
        cmd2,
    })
}

impl Link for FakeModem {
    fn write(&self, msg: &Message) -> Result<(), LinkError> {
        self.writes.lock().unwrap().push(*msg);
        if let Some(reply) = self.reply(msg) {
            self.replies.lock().unwrap().push_back(reply);
        }
        Ok(())
    }
}
