//! N-way dimmer — several dimmer-like devices controlling one load.
//!
//! Commands fan out to every member in a single [`CommandSeq`], primary
//! first, and complete once. The aggregate level is never set by issuing a
//! command: it follows whatever level a member reports last, and is emitted
//! only when it actually changes. An explicit refresh treats the primary as
//! authoritative: secondary reports are recorded but do not move the
//! aggregate, and secondaries that disagree are corrected.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use linkhub_domain::address::Address;
use linkhub_domain::error::{CommandError, ContractViolation, FlagError};
use linkhub_domain::event::{DeviceLabel, LevelChanged};
use linkhub_domain::flags::DimmerFlags;
use serde_json::{Map, Value};

use crate::command_seq::{CommandSeq, Step, step};
use crate::completion::Completion;
use crate::devices::Device;
use crate::registry::Registry;
use crate::signal::{Signal, SlotId};

pub struct NWayDimmer {
    primary: Address,
    name: Option<String>,
    group: u8,
    // Primary first, then secondaries in configuration order.
    members: Vec<Arc<dyn Device>>,
    level: Mutex<u8>,
    member_levels: Mutex<HashMap<Address, u8>>,
    // Set while a refresh pass queries the members.
    refreshing: AtomicBool,
    level_changed: Signal<LevelChanged>,
    slots: Vec<(usize, SlotId)>,
    me: Weak<NWayDimmer>,
}

impl NWayDimmer {
    /// Build the member devices with `factory`, register them and start
    /// following their levels.
    ///
    /// Duplicate secondaries collapse to one member; a secondary with the
    /// primary's address is ignored.
    pub fn new<F>(
        primary: Address,
        secondaries: &[Address],
        name: Option<String>,
        group: u8,
        registry: &Registry,
        factory: F,
    ) -> Arc<Self>
    where
        F: Fn(Address, Option<String>) -> Arc<dyn Device>,
    {
        let mut members: Vec<Arc<dyn Device>> = Vec::with_capacity(secondaries.len() + 1);
        members.push(factory(
            primary,
            name.as_ref().map(|n| format!("{n}-primary")),
        ));
        for (i, &addr) in secondaries.iter().enumerate() {
            if members.iter().any(|m| m.address() == addr) {
                tracing::warn!(%addr, "duplicate n-way member ignored");
                continue;
            }
            members.push(factory(
                addr,
                name.as_ref().map(|n| format!("{n}-secondary-{i}")),
            ));
        }
        for member in &members {
            registry.add(Arc::clone(member));
        }

        Arc::new_cyclic(|me: &Weak<Self>| {
            let mut slots = Vec::with_capacity(members.len());
            for (index, member) in members.iter().enumerate() {
                let Some(signal) = member.level_changed() else {
                    tracing::warn!(member = %member.label(), "n-way member reports no level");
                    continue;
                };
                let me = me.clone();
                let slot = signal.connect(move |event: &LevelChanged| {
                    if let Some(this) = me.upgrade() {
                        this.on_member_level(event);
                    }
                });
                slots.push((index, slot));
            }

            Self {
                primary,
                name,
                group,
                members,
                level: Mutex::new(0),
                member_levels: Mutex::new(HashMap::new()),
                refreshing: AtomicBool::new(false),
                level_changed: Signal::new(),
                slots,
                me: me.clone(),
            }
        })
    }

    /// Current de-conflicted level.
    #[must_use]
    pub fn level(&self) -> u8 {
        *lock(&self.level)
    }

    #[must_use]
    pub fn members(&self) -> &[Arc<dyn Device>] {
        &self.members
    }

    #[must_use]
    pub fn group(&self) -> u8 {
        self.group
    }

    fn on_member_level(&self, event: &LevelChanged) {
        lock(&self.member_levels).insert(event.device.address, event.level);
        if event.device.address != self.primary && self.refreshing.load(Ordering::SeqCst) {
            tracing::debug!(from = %event.device, level = event.level, "secondary report held during refresh");
            return;
        }
        {
            let mut level = lock(&self.level);
            if *level == event.level {
                return;
            }
            *level = event.level;
        }
        tracing::info!(device = %self.label(), from = %event.device, level = event.level, "n-way level changed");
        self.level_changed.emit(&LevelChanged {
            device: self.label(),
            level: event.level,
        });
    }

    /// One step per member running `op` on it.
    fn fan_out<F>(&self, what: &str, on_done: Completion, op: F)
    where
        F: Fn(&dyn Device, Completion) + Send + Sync + 'static,
    {
        tracing::info!(device = %self.label(), what, members = self.members.len(), "n-way command");
        let op = Arc::new(op);
        let steps = self.members.iter().map(|member| {
            let member = Arc::clone(member);
            let op = Arc::clone(&op);
            step(move |done| op(member.as_ref(), done))
        });
        CommandSeq::from_steps(format!("Sub devices {what}"), on_done, steps).spawn();
    }

    /// Issue `set` to every secondary whose last known level differs from
    /// the primary's.
    fn correct_secondaries(&self, on_done: Completion) {
        self.refreshing.store(false, Ordering::SeqCst);
        let levels = lock(&self.member_levels).clone();
        let Some(&authoritative) = levels.get(&self.primary) else {
            tracing::warn!(device = %self.label(), "primary reported no level");
            on_done.complete(Ok("Primary level unknown".to_string()));
            return;
        };

        let steps: Vec<Step> = self
            .members
            .iter()
            .filter(|m| m.address() != self.primary)
            .filter(|m| levels.get(&m.address()) != Some(&authoritative))
            .map(|member| {
                tracing::info!(member = %member.label(), level = authoritative, "correcting secondary");
                let member = Arc::clone(member);
                step(move |done| member.set(authoritative, false, done))
            })
            .collect();
        CommandSeq::from_steps("Sub devices match primary", on_done, steps).spawn();
    }

    /// Pair every member with the modem, then cross-link every ordered pair
    /// of distinct members on the aggregate's group.
    #[must_use]
    pub fn pair_sequence(&self, on_done: Completion) -> CommandSeq {
        let mut steps: Vec<Step> = self
            .members
            .iter()
            .map(|member| {
                let member = Arc::clone(member);
                step(move |done| member.pair(done))
            })
            .collect();

        let n = self.members.len();
        for i in 0..n {
            for j in i + 1..n {
                steps.push(self.cross_link(i, j));
                steps.push(self.cross_link(j, i));
            }
        }

        CommandSeq::from_steps(format!("{} paired", self.label()), on_done, steps)
    }

    /// Make member `device` a responder and a controller of member `other`.
    fn cross_link(&self, device: usize, other: usize) -> Step {
        let device = Arc::clone(&self.members[device]);
        let other = self.members[other].address();
        let group = self.group;
        step(move |done| {
            let resp = Arc::clone(&device);
            let ctrl = Arc::clone(&device);
            let name = format!("{} linked with {other}", device.address());
            CommandSeq::from_steps(
                name,
                done,
                [
                    step(move |d| resp.db_add_resp_of(other, group, d)),
                    step(move |d| ctrl.db_add_ctrl_of(other, group, d)),
                ],
            )
            .spawn();
        })
    }
}

impl Device for NWayDimmer {
    fn address(&self) -> Address {
        self.primary
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn kind(&self) -> &'static str {
        "n_way_dimmer"
    }

    fn label(&self) -> DeviceLabel {
        DeviceLabel::new(self.primary, self.name.clone())
    }

    fn level_changed(&self) -> Option<&Signal<LevelChanged>> {
        Some(&self.level_changed)
    }

    fn on(&self, level: u8, instant: bool, on_done: Completion) {
        self.fan_out("set to on", on_done, move |m, done| m.on(level, instant, done));
    }

    fn off(&self, instant: bool, on_done: Completion) {
        self.fan_out("set to off", on_done, move |m, done| m.off(instant, done));
    }

    fn set(&self, level: u8, instant: bool, on_done: Completion) {
        self.fan_out("set", on_done, move |m, done| m.set(level, instant, done));
    }

    fn scene(&self, is_on: bool, group: u8, on_done: Completion) {
        self.fan_out("scenes", on_done, move |m, done| m.scene(is_on, group, done));
    }

    fn increment_up(&self, on_done: Completion) {
        self.fan_out("incremented up", on_done, |m, done| m.increment_up(done));
    }

    fn increment_down(&self, on_done: Completion) {
        self.fan_out("incremented down", on_done, |m, done| m.increment_down(done));
    }

    fn set_backlight(&self, level: u8, on_done: Completion) {
        self.fan_out("set backlight", on_done, move |m, done| m.set_backlight(level, done));
    }

    fn set_on_level(&self, level: u8, on_done: Completion) {
        self.fan_out("set on level", on_done, move |m, done| m.set_on_level(level, done));
    }

    fn set_flags(&self, flags: &Map<String, Value>, on_done: Completion) -> Result<(), FlagError> {
        if let Err(err) = DimmerFlags::from_json(flags) {
            tracing::warn!(device = %self.label(), %err, "rejected flags");
            on_done.complete(Err(err.clone().into()));
            return Err(err);
        }
        let flags = flags.clone();
        self.fan_out("set flags", on_done, move |m, done| {
            // Already validated; a member rejecting them is a bug.
            let (forward, rejected) = split(done);
            if let Err(err) = m.set_flags(&flags, forward) {
                rejected.complete(Err(CommandError::ContractViolation(ContractViolation(
                    format!("{} rejected validated flags: {err}", m.label()),
                ))));
            }
        });
        Ok(())
    }

    fn pair(&self, on_done: Completion) {
        tracing::info!(device = %self.label(), members = self.members.len(), "pairing n-way members");
        self.pair_sequence(on_done).spawn();
    }

    /// Refresh every member, then align secondaries with the primary.
    fn refresh(&self, on_done: Completion) {
        let mut steps: Vec<Step> = self
            .members
            .iter()
            .map(|member| {
                let member = Arc::clone(member);
                step(move |done| member.refresh(done))
            })
            .collect();
        let me = self.me.clone();
        steps.push(step(move |done| match me.upgrade() {
            Some(this) => this.correct_secondaries(done),
            None => done.complete(Ok("N-way dimmer dropped".to_string())),
        }));

        // A failed member refresh never reaches the correction step.
        let me = self.me.clone();
        let on_done = Completion::new(move |result| {
            if let Some(this) = me.upgrade() {
                this.refreshing.store(false, Ordering::SeqCst);
            }
            on_done.complete(result);
        });
        self.refreshing.store(true, Ordering::SeqCst);
        CommandSeq::from_steps(format!("{} refreshed", self.label()), on_done, steps).spawn();
    }
}

impl Drop for NWayDimmer {
    fn drop(&mut self) {
        for (index, slot) in &self.slots {
            if let Some(signal) = self.members[*index].level_changed() {
                signal.disconnect(*slot);
            }
        }
    }
}

impl fmt::Debug for NWayDimmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<Address> = self.members.iter().map(|m| m.address()).collect();
        f.debug_struct("NWayDimmer")
            .field("primary", &self.primary)
            .field("name", &self.name)
            .field("group", &self.group)
            .field("members", &members)
            .field("level", &self.level())
            .finish_non_exhaustive()
    }
}

/// Two handles on one completion; whichever completes first wins.
fn split(done: Completion) -> (Completion, Completion) {
    let first = Arc::new(Mutex::new(Some(done)));
    let second = Arc::clone(&first);
    (resolve_once(first), resolve_once(second))
}

fn resolve_once(slot: Arc<Mutex<Option<Completion>>>) -> Completion {
    Completion::new(move |result| {
        let done = lock(&slot).take();
        if let Some(done) = done {
            done.complete(result);
        }
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
