//! Dimmer — a single dimmable load (wall switch, plug-in module).
//!
//! The level only changes once the device acknowledged a command or
//! broadcast a local change; every accepted level is emitted on
//! [`Dimmer::level_changed`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use linkhub_domain::address::Address;
use linkhub_domain::error::{CommandError, FlagError};
use linkhub_domain::event::{DeviceLabel, LevelChanged};
use linkhub_domain::flags::DimmerFlags;
use linkhub_domain::link_db::{EntryKey, LinkDatabase, LinkEntry, LinkRole};
use linkhub_domain::message::{
    DbCommand, DbWrite, DirectCommand, InboundMessage, Message, MessageKind, cmd, ext_set,
};
use serde_json::{Map, Value};

use crate::command_seq::{CommandSeq, Step, step};
use crate::completion::Completion;
use crate::devices::{Device, Modem, step_level};
use crate::handler::DirectCmd;
use crate::ports::Transport;
use crate::signal::Signal;

/// Group dimmers use to report their state.
pub const DEFAULT_GROUP: u8 = 0x01;

const RAMP_RATE: u8 = 0x1f;

struct Inner {
    addr: Address,
    name: Option<String>,
    modem: Arc<Modem>,
    transport: Arc<dyn Transport>,
    level: Mutex<u8>,
    on_level: Mutex<u8>,
    db: Mutex<LinkDatabase>,
    level_changed: Signal<LevelChanged>,
}

impl Inner {
    fn label(&self) -> DeviceLabel {
        DeviceLabel::new(self.addr, self.name.clone())
    }

    fn set_level(&self, level: u8) {
        *lock(&self.level) = level;
        tracing::info!(device = %self.label(), level, "level changed");
        self.level_changed.emit(&LevelChanged {
            device: self.label(),
            level,
        });
    }

    fn send(&self, msg: Message, handler: DirectCmd) {
        self.transport.send(msg, Box::new(handler));
    }
}

/// Dimmer device handle. Clones refer to the same device.
#[derive(Clone)]
pub struct Dimmer {
    inner: Arc<Inner>,
}

impl Dimmer {
    #[must_use]
    pub fn new(
        addr: Address,
        name: Option<String>,
        modem: Arc<Modem>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                addr,
                name,
                modem,
                transport,
                level: Mutex::new(0),
                on_level: Mutex::new(0xff),
                db: Mutex::new(LinkDatabase::new(addr)),
                level_changed: Signal::new(),
            }),
        }
    }

    /// Last level the device reported.
    #[must_use]
    pub fn level(&self) -> u8 {
        *lock(&self.inner.level)
    }

    /// The device's own link records confirmed so far.
    #[must_use]
    pub fn database(&self) -> LinkDatabase {
        lock(&self.inner.db).clone()
    }

    fn extended_set<F>(&self, sub_cmd: u8, value: u8, on_ack: F, on_done: Completion)
    where
        F: FnOnce() -> String + Send + 'static,
    {
        let mut data = [0_u8; 14];
        data[0] = 0x01;
        data[1] = sub_cmd;
        data[2] = value;
        let msg = DirectCommand::extended(self.inner.addr, cmd::EXTENDED_SET, 0x00, data);
        let handler = DirectCmd::new(self.inner.addr, on_done)
            .expect_cmd1(cmd::EXTENDED_SET)
            .on_ack(move |_| on_ack());
        self.inner.send(Message::Direct(msg), handler);
    }

    fn increment(&self, up: bool, on_done: Completion) {
        let cmd1 = if up { cmd::BRIGHT } else { cmd::DIM };
        tracing::info!(device = %self.label(), up, "increment");
        let inner = Arc::clone(&self.inner);
        let handler = DirectCmd::new(self.inner.addr, on_done)
            .expect_cmd1(cmd1)
            .on_ack(move |_| {
                let level = step_level(*lock(&inner.level), up);
                inner.set_level(level);
                format!("Dimmer {} at level {level}", inner.addr)
            });
        self.inner.send(
            Message::Direct(DirectCommand::standard(self.inner.addr, cmd1, 0x00)),
            handler,
        );
    }

    /// Write one record into the device's own database; it is stored
    /// locally once the device acknowledged the write.
    fn db_write(&self, entry: LinkEntry, on_done: Completion) {
        let cmd = DbCommand::add(entry.role);
        tracing::info!(device = %self.label(), %entry, "device db add");
        let inner = Arc::clone(&self.inner);
        let handler = DirectCmd::new(self.inner.addr, on_done)
            .expect_cmd1(cmd::DB_WRITE)
            .on_ack(move |_| {
                lock(&inner.db).add(entry);
                format!("Device {} database updated", inner.addr)
            });
        self.inner.send(
            Message::DbWrite(DbWrite {
                to: self.inner.addr,
                cmd,
                entry,
            }),
            handler,
        );
    }

    /// Record `entry` on the device and, when the remote is the modem, the
    /// matching record of the opposite role on the modem.
    fn db_add_two_way(&self, entry: LinkEntry, on_done: Completion) {
        let modem = Arc::clone(&self.inner.modem);
        if entry.addr != modem.address() {
            self.db_write(entry, on_done);
            return;
        }

        let this = self.clone();
        let addr = self.inner.addr;
        CommandSeq::from_steps(
            format!("Dimmer {addr} linked to modem"),
            on_done,
            [
                step(move |done| this.db_write(entry, done)),
                step(move |done| match entry.role {
                    LinkRole::Controller => modem.db_add_resp_of(addr, entry.group, [0; 3], done),
                    LinkRole::Responder => modem.db_add_ctrl_of(addr, entry.group, [0; 3], done),
                }),
            ],
        )
        .spawn();
    }
}

impl Device for Dimmer {
    fn address(&self) -> Address {
        self.inner.addr
    }

    fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    fn kind(&self) -> &'static str {
        "dimmer"
    }

    fn level_changed(&self) -> Option<&Signal<LevelChanged>> {
        Some(&self.inner.level_changed)
    }

    fn on(&self, level: u8, instant: bool, on_done: Completion) {
        let cmd1 = if instant { cmd::ON_INSTANT } else { cmd::ON };
        tracing::info!(device = %self.label(), level, instant, "on");
        let inner = Arc::clone(&self.inner);
        let handler = DirectCmd::new(self.inner.addr, on_done)
            .expect_cmd1(cmd1)
            .on_ack(move |reply| {
                inner.set_level(reply.cmd2);
                format!("Dimmer {} on at level {}", inner.addr, reply.cmd2)
            });
        self.inner.send(
            Message::Direct(DirectCommand::standard(self.inner.addr, cmd1, level)),
            handler,
        );
    }

    fn off(&self, instant: bool, on_done: Completion) {
        let cmd1 = if instant { cmd::OFF_INSTANT } else { cmd::OFF };
        tracing::info!(device = %self.label(), instant, "off");
        let inner = Arc::clone(&self.inner);
        let handler = DirectCmd::new(self.inner.addr, on_done)
            .expect_cmd1(cmd1)
            .on_ack(move |_| {
                inner.set_level(0);
                format!("Dimmer {} off", inner.addr)
            });
        self.inner.send(
            Message::Direct(DirectCommand::standard(self.inner.addr, cmd1, 0x00)),
            handler,
        );
    }

    /// Simulate a button press for `group`; the resulting level is read
    /// back with a status request.
    fn scene(&self, is_on: bool, group: u8, on_done: Completion) {
        tracing::info!(device = %self.label(), is_on, group, "scene");
        let mut data = [0_u8; 14];
        data[0] = group;
        data[3] = if is_on { cmd::ON } else { cmd::OFF };
        let this = self.clone();
        let handler = DirectCmd::new(self.inner.addr, on_done)
            .expect_cmd1(cmd::SCENE)
            .on_ack(move |_| {
                this.refresh(Completion::none());
                format!("Dimmer {} scene {group} triggered", this.inner.addr)
            });
        self.inner.send(
            Message::Direct(DirectCommand::extended(self.inner.addr, cmd::SCENE, 0x00, data)),
            handler,
        );
    }

    fn increment_up(&self, on_done: Completion) {
        self.increment(true, on_done);
    }

    fn increment_down(&self, on_done: Completion) {
        self.increment(false, on_done);
    }

    fn set_backlight(&self, level: u8, on_done: Completion) {
        tracing::info!(device = %self.label(), level, "setting backlight");
        let addr = self.inner.addr;
        self.extended_set(
            ext_set::BACKLIGHT,
            level,
            move || format!("Dimmer {addr} backlight set to {level}"),
            on_done,
        );
    }

    fn set_on_level(&self, level: u8, on_done: Completion) {
        tracing::info!(device = %self.label(), level, "setting on level");
        let inner = Arc::clone(&self.inner);
        self.extended_set(
            ext_set::ON_LEVEL,
            level,
            move || {
                *lock(&inner.on_level) = level;
                format!("Dimmer {} on level set to {level}", inner.addr)
            },
            on_done,
        );
    }

    fn set_flags(&self, flags: &Map<String, Value>, on_done: Completion) -> Result<(), FlagError> {
        let flags = match DimmerFlags::from_json(flags) {
            Ok(flags) => flags,
            Err(err) => {
                tracing::warn!(device = %self.label(), %err, "rejected flags");
                on_done.complete(Err(err.clone().into()));
                return Err(err);
            }
        };
        tracing::info!(device = %self.label(), ?flags, "set flags");

        let mut steps: Vec<Step> = Vec::new();
        if let Some(level) = flags.backlight {
            let this = self.clone();
            steps.push(step(move |done| this.set_backlight(level, done)));
        }
        if let Some(level) = flags.on_level {
            let this = self.clone();
            steps.push(step(move |done| this.set_on_level(level, done)));
        }
        CommandSeq::from_steps("Dimmer set_flags complete", on_done, steps).spawn();
        Ok(())
    }

    /// Refresh, then link device and modem both ways on the default group.
    fn pair(&self, on_done: Completion) {
        tracing::info!(device = %self.label(), "pairing");
        let modem = self.inner.modem.address();
        let refresh = self.clone();
        let resp = self.clone();
        let ctrl = self.clone();
        CommandSeq::from_steps(
            format!("Dimmer {} paired", self.inner.addr),
            on_done,
            [
                step(move |done| refresh.refresh(done)),
                step(move |done| resp.db_add_resp_of(modem, DEFAULT_GROUP, done)),
                step(move |done| ctrl.db_add_ctrl_of(modem, DEFAULT_GROUP, done)),
            ],
        )
        .spawn();
    }

    fn refresh(&self, on_done: Completion) {
        tracing::debug!(device = %self.label(), "refresh");
        let inner = Arc::clone(&self.inner);
        let handler = DirectCmd::new(self.inner.addr, on_done).on_ack(move |reply| {
            inner.set_level(reply.cmd2);
            format!("Dimmer {} refreshed", inner.addr)
        });
        self.inner.send(
            Message::Direct(DirectCommand::standard(self.inner.addr, cmd::STATUS, 0x00)),
            handler,
        );
    }

    fn db_add_ctrl_of(&self, addr: Address, group: u8, on_done: Completion) {
        self.db_add_two_way(LinkEntry::controller(addr, group, [0x03, 0x00, group]), on_done);
    }

    fn db_add_resp_of(&self, addr: Address, group: u8, on_done: Completion) {
        let on_level = *lock(&self.inner.on_level);
        self.db_add_two_way(
            LinkEntry::responder(addr, group, [on_level, RAMP_RATE, group]),
            on_done,
        );
    }

    fn db_delete(&self, addr: Address, group: u8, role: LinkRole, on_done: Completion) {
        let key = EntryKey { addr, group, role };
        let Some(entry) = lock(&self.inner.db).get(&key).copied() else {
            on_done.complete(Err(CommandError::NoSuchEntry(format!(
                "{addr} grp: {group} type: {role} on {}",
                self.inner.addr
            ))));
            return;
        };

        let inner = Arc::clone(&self.inner);
        let handler = DirectCmd::new(self.inner.addr, on_done)
            .expect_cmd1(cmd::DB_WRITE)
            .on_ack(move |_| {
                lock(&inner.db).remove(&key);
                format!("Device {} database record removed", inner.addr)
            });
        self.inner.send(
            Message::DbWrite(DbWrite {
                to: self.inner.addr,
                cmd: DbCommand::Delete,
                entry,
            }),
            handler,
        );
    }

    fn handle_broadcast(&self, msg: &InboundMessage) {
        if msg.kind != MessageKind::AllLinkBroadcast || msg.group() != DEFAULT_GROUP {
            return;
        }
        match msg.cmd1 {
            cmd::ON => {
                let level = *lock(&self.inner.on_level);
                self.inner.set_level(level);
            }
            cmd::ON_INSTANT => self.inner.set_level(0xff),
            cmd::OFF | cmd::OFF_INSTANT => self.inner.set_level(0),
            cmd::BRIGHT | cmd::DIM => self.refresh(Completion::none()),
            other => tracing::debug!(device = %self.label(), cmd1 = other, "ignored broadcast"),
        }
    }
}

impl fmt::Debug for Dimmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dimmer")
            .field("addr", &self.inner.addr)
            .field("name", &self.inner.name)
            .field("level", &self.level())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::completion::CommandResult;
    use crate::modem_db::ModemDb;
    use crate::protocol::Protocol;
    use crate::testing::{FakeModem, MODEM, RecordingStore};
    use serde_json::json;

    const ADDR: Address = Address::new(0x44, 0xa3, 0x79);

    struct Fixture {
        link: Arc<FakeModem>,
        protocol: Arc<Protocol>,
        modem: Arc<Modem>,
        dimmer: Dimmer,
        levels: Arc<Mutex<Vec<u8>>>,
    }

    fn fixture() -> Fixture {
        let link = Arc::new(FakeModem::default());
        let protocol = Arc::new(Protocol::new(link.clone(), Duration::from_secs(5)));
        let db = ModemDb::new(LinkDatabase::new(MODEM), Arc::new(RecordingStore::default()));
        let modem = Arc::new(Modem::new(db, protocol.clone()));
        let dimmer = Dimmer::new(ADDR, Some("hall".to_string()), modem.clone(), protocol.clone());
        let levels = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&levels);
        dimmer
            .level_changed()
            .unwrap()
            .connect(move |e: &LevelChanged| l.lock().unwrap().push(e.level));
        Fixture {
            link,
            protocol,
            modem,
            dimmer,
            levels,
        }
    }

    fn recording() -> (Completion, Arc<Mutex<Vec<CommandResult>>>) {
        let results = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&results);
        (Completion::new(move |res| r.lock().unwrap().push(res)), results)
    }

    #[test]
    fn should_change_level_only_after_ack() {
        let f = fixture();
        let (done, results) = recording();

        f.dimmer.on(0x80, false, done);
        assert_eq!(f.dimmer.level(), 0);
        assert!(f.levels.lock().unwrap().is_empty());

        f.link.pump(&f.protocol);

        assert_eq!(f.link.level(ADDR), Some(0x80));
        assert_eq!(f.dimmer.level(), 0x80);
        assert_eq!(*f.levels.lock().unwrap(), vec![0x80]);
        assert!(results.lock().unwrap()[0].is_ok());
    }

    #[test]
    fn should_keep_level_when_device_naks() {
        let f = fixture();
        f.link.nak_device(ADDR);
        let (done, results) = recording();

        f.dimmer.off(true, done);
        f.link.pump(&f.protocol);

        assert!(f.levels.lock().unwrap().is_empty());
        assert!(matches!(results.lock().unwrap()[0], Err(CommandError::Nak(_))));
    }

    #[test]
    fn should_increment_in_steps_of_eight() {
        let f = fixture();
        f.dimmer.on(0xfc, true, Completion::none());
        f.link.pump(&f.protocol);

        f.dimmer.increment_up(Completion::none());
        f.link.pump(&f.protocol);
        f.dimmer.increment_down(Completion::none());
        f.link.pump(&f.protocol);

        assert_eq!(*f.levels.lock().unwrap(), vec![0xfc, 0xff, 0xf7]);
    }

    #[test]
    fn should_report_level_on_refresh() {
        let f = fixture();
        f.link.set_level(ADDR, 42);

        f.dimmer.refresh(Completion::none());
        f.link.pump(&f.protocol);

        assert_eq!(f.dimmer.level(), 42);
    }

    #[test]
    fn should_reject_unknown_flag_before_sending() {
        let f = fixture();
        let (done, results) = recording();
        let flags = json!({"gamma": 3}).as_object().cloned().unwrap();

        let err = f.dimmer.set_flags(&flags, done).unwrap_err();

        assert!(matches!(err, FlagError::Unsupported { .. }));
        assert!(f.link.writes().is_empty());
        assert_eq!(
            *results.lock().unwrap(),
            vec![Err(CommandError::UnsupportedFlag(err))]
        );
    }

    #[test]
    fn should_write_each_flag_in_turn() {
        let f = fixture();
        let (done, results) = recording();
        let flags = json!({"backlight": 0x40, "on_level": 0x80}).as_object().cloned().unwrap();

        f.dimmer.set_flags(&flags, done).unwrap();
        f.link.pump(&f.protocol);

        let subs: Vec<u8> = f
            .link
            .writes()
            .iter()
            .filter_map(|m| match m {
                Message::Direct(d) => d.data.map(|data| data[1]),
                _ => None,
            })
            .collect();
        assert_eq!(subs, vec![ext_set::BACKLIGHT, ext_set::ON_LEVEL]);
        assert_eq!(
            *results.lock().unwrap(),
            vec![Ok("Dimmer 44.a3.79 on level set to 128".to_string())]
        );
    }

    #[test]
    fn should_link_device_and_modem_when_pairing() {
        let f = fixture();
        let (done, results) = recording();

        f.dimmer.pair(done);
        f.link.pump(&f.protocol);

        assert!(results.lock().unwrap()[0].is_ok());
        let device_db = f.dimmer.database();
        assert!(device_db.contains(&EntryKey {
            addr: MODEM,
            group: DEFAULT_GROUP,
            role: LinkRole::Controller
        }));
        assert!(device_db.contains(&EntryKey {
            addr: MODEM,
            group: DEFAULT_GROUP,
            role: LinkRole::Responder
        }));
        let modem_db = f.modem.database();
        assert_eq!(modem_db.len(), 2);
        assert!(modem_db.contains(&EntryKey {
            addr: ADDR,
            group: DEFAULT_GROUP,
            role: LinkRole::Responder
        }));
    }

    #[test]
    fn should_abort_pairing_when_device_is_silent() {
        let f = fixture();
        f.link.silence_device(ADDR);
        let (done, results) = recording();

        f.dimmer.pair(done);
        f.protocol
            .poll_timeout(std::time::Instant::now() + Duration::from_secs(10));
        f.link.pump(&f.protocol);

        assert_eq!(f.link.writes().len(), 1);
        assert_eq!(f.link.writes_to(ADDR).len(), 1);
        assert!(matches!(
            results.lock().unwrap()[0],
            Err(CommandError::Timeout(_))
        ));
    }

    #[test]
    fn should_follow_physical_broadcasts() {
        let f = fixture();
        let broadcast = |cmd1| InboundMessage {
            from: ADDR,
            to: Address::new(0, 0, DEFAULT_GROUP),
            kind: MessageKind::AllLinkBroadcast,
            cmd1,
            cmd2: 0,
        };

        f.dimmer.handle_broadcast(&broadcast(cmd::ON_INSTANT));
        f.dimmer.handle_broadcast(&broadcast(cmd::OFF));

        assert_eq!(*f.levels.lock().unwrap(), vec![0xff, 0]);
    }
}
