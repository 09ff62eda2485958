//! Battery powered sensors (motion, door, leak).
//!
//! They sleep between events and cannot be commanded; state arrives as group
//! broadcasts only.

use std::sync::{Mutex, PoisonError};

use linkhub_domain::address::Address;
use linkhub_domain::event::{ActiveChanged, LowBatteryChanged};
use linkhub_domain::message::{InboundMessage, MessageKind, cmd};

use crate::devices::Device;
use crate::signal::Signal;

/// Group reporting the sensor state.
pub const GROUP_ACTIVE: u8 = 0x01;
/// Group reporting the battery state.
pub const GROUP_LOW_BATTERY: u8 = 0x03;

#[derive(Debug)]
pub struct BatterySensor {
    addr: Address,
    name: Option<String>,
    is_active: Mutex<bool>,
    active_changed: Signal<ActiveChanged>,
    low_battery_changed: Signal<LowBatteryChanged>,
}

impl BatterySensor {
    #[must_use]
    pub fn new(addr: Address, name: Option<String>) -> Self {
        Self {
            addr,
            name,
            is_active: Mutex::new(false),
            active_changed: Signal::new(),
            low_battery_changed: Signal::new(),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.is_active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_active(&self, is_active: bool) {
        *self.is_active.lock().unwrap_or_else(PoisonError::into_inner) = is_active;
        tracing::info!(device = %self.label(), is_active, "sensor state");
        self.active_changed.emit(&ActiveChanged {
            device: self.label(),
            is_active,
        });
    }
}

impl Device for BatterySensor {
    fn address(&self) -> Address {
        self.addr
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn kind(&self) -> &'static str {
        "battery_sensor"
    }

    fn active_changed(&self) -> Option<&Signal<ActiveChanged>> {
        Some(&self.active_changed)
    }

    fn low_battery_changed(&self) -> Option<&Signal<LowBatteryChanged>> {
        Some(&self.low_battery_changed)
    }

    fn handle_broadcast(&self, msg: &InboundMessage) {
        if msg.kind != MessageKind::AllLinkBroadcast {
            return;
        }
        let is_on = match msg.cmd1 {
            cmd::ON | cmd::ON_INSTANT => true,
            cmd::OFF | cmd::OFF_INSTANT => false,
            _ => return,
        };
        match msg.group() {
            GROUP_ACTIVE => self.set_active(is_on),
            GROUP_LOW_BATTERY => {
                tracing::info!(device = %self.label(), is_low = is_on, "battery state");
                self.low_battery_changed.emit(&LowBatteryChanged {
                    device: self.label(),
                    is_low: is_on,
                });
            }
            group => tracing::debug!(device = %self.label(), group, "ignored broadcast"),
        }
    }
}
