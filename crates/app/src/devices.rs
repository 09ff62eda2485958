//! Devices — the capability set shared by every addressable device kind.
//!
//! Every operation is acknowledgement-gated: it returns once the command is
//! queued and resolves its [`Completion`] exactly once when the reply (or
//! the transport's timeout) arrives. Capabilities a device kind does not
//! have resolve with [`CommandError::Unsupported`].

pub mod battery_sensor;
pub mod dimmer;
pub mod modem;
pub mod n_way_dimmer;

pub use battery_sensor::BatterySensor;
pub use dimmer::Dimmer;
pub use modem::Modem;
pub use n_way_dimmer::NWayDimmer;

use linkhub_domain::address::Address;
use linkhub_domain::error::{CommandError, FlagError};
use linkhub_domain::event::{ActiveChanged, DeviceLabel, LevelChanged, LowBatteryChanged};
use linkhub_domain::link_db::LinkRole;
use linkhub_domain::message::InboundMessage;
use serde_json::{Map, Value};

use crate::completion::Completion;
use crate::signal::Signal;

/// Capability set of a device.
pub trait Device: Send + Sync {
    fn address(&self) -> Address;

    fn name(&self) -> Option<&str>;

    /// Short name of the device kind, used in error messages.
    fn kind(&self) -> &'static str;

    fn label(&self) -> DeviceLabel {
        DeviceLabel::new(self.address(), self.name().map(str::to_string))
    }

    /// Emitted with the new level whenever the device reports one.
    fn level_changed(&self) -> Option<&Signal<LevelChanged>> {
        None
    }

    fn active_changed(&self) -> Option<&Signal<ActiveChanged>> {
        None
    }

    fn low_battery_changed(&self) -> Option<&Signal<LowBatteryChanged>> {
        None
    }

    /// Turn on at `level` (`0x01..=0xff`).
    fn on(&self, level: u8, instant: bool, on_done: Completion) {
        let _ = (level, instant);
        unsupported(self, "on", on_done);
    }

    fn off(&self, instant: bool, on_done: Completion) {
        let _ = instant;
        unsupported(self, "off", on_done);
    }

    /// Turn on at `level`, or off when `level` is zero.
    fn set(&self, level: u8, instant: bool, on_done: Completion) {
        if level > 0 {
            self.on(level, instant, on_done);
        } else {
            self.off(instant, on_done);
        }
    }

    /// Trigger the device's scene for `group`.
    fn scene(&self, is_on: bool, group: u8, on_done: Completion) {
        let _ = (is_on, group);
        unsupported(self, "scene", on_done);
    }

    fn increment_up(&self, on_done: Completion) {
        unsupported(self, "increment_up", on_done);
    }

    fn increment_down(&self, on_done: Completion) {
        unsupported(self, "increment_down", on_done);
    }

    fn set_backlight(&self, level: u8, on_done: Completion) {
        let _ = level;
        unsupported(self, "set_backlight", on_done);
    }

    fn set_on_level(&self, level: u8, on_done: Completion) {
        let _ = level;
        unsupported(self, "set_on_level", on_done);
    }

    /// Write configuration flags.
    ///
    /// # Errors
    ///
    /// Returns a [`FlagError`] before anything is sent when the input holds
    /// an unknown flag or an invalid value. `on_done` is resolved with
    /// [`CommandError::UnsupportedFlag`] first.
    fn set_flags(&self, flags: &Map<String, Value>, on_done: Completion) -> Result<(), FlagError> {
        let _ = flags;
        unsupported(self, "set_flags", on_done);
        Ok(())
    }

    /// Link the device with the modem so its broadcasts are reported.
    fn pair(&self, on_done: Completion) {
        unsupported(self, "pair", on_done);
    }

    /// Query the current state; emits the relevant signals.
    fn refresh(&self, on_done: Completion) {
        unsupported(self, "refresh", on_done);
    }

    /// Add a record making this device a controller of `addr` for `group`.
    fn db_add_ctrl_of(&self, addr: Address, group: u8, on_done: Completion) {
        let _ = (addr, group);
        unsupported(self, "db_add_ctrl_of", on_done);
    }

    /// Add a record making this device a responder of `addr` for `group`.
    fn db_add_resp_of(&self, addr: Address, group: u8, on_done: Completion) {
        let _ = (addr, group);
        unsupported(self, "db_add_resp_of", on_done);
    }

    fn db_delete(&self, addr: Address, group: u8, role: LinkRole, on_done: Completion) {
        let _ = (addr, group, role);
        unsupported(self, "db_delete", on_done);
    }

    /// An unsolicited message sent by this device (group broadcast, cleanup).
    fn handle_broadcast(&self, msg: &InboundMessage) {
        let _ = msg;
    }
}

fn unsupported<D: Device + ?Sized>(device: &D, capability: &'static str, on_done: Completion) {
    tracing::warn!(device = %device.label(), capability, "unsupported command");
    on_done.complete(Err(CommandError::Unsupported {
        device: format!("{} {}", device.kind(), device.label()),
        capability,
    }));
}

/// Apply a ±8 level increment, clamped to `0..=255`.
#[must_use]
pub fn step_level(level: u8, up: bool) -> u8 {
    const STEP: u8 = 8;
    if up {
        level.saturating_add(STEP)
    } else {
        level.saturating_sub(STEP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Bare;

    impl Device for Bare {
        fn address(&self) -> Address {
            Address::new(1, 2, 3)
        }

        fn name(&self) -> Option<&str> {
            Some("bare")
        }

        fn kind(&self) -> &'static str {
            "bare"
        }
    }

    #[test]
    fn should_report_unsupported_capability() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);

        Bare.increment_up(Completion::new(move |r| s.lock().unwrap().push(r)));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Err(CommandError::Unsupported {
                device: "bare 01.02.03 (bare)".to_string(),
                capability: "increment_up",
            })]
        );
    }

    #[test]
    fn should_route_set_to_off_when_level_is_zero() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);

        Bare.set(0, false, Completion::new(move |r| s.lock().unwrap().push(r)));

        assert!(matches!(
            seen.lock().unwrap()[0],
            Err(CommandError::Unsupported { capability: "off", .. })
        ));
    }

    #[test]
    fn should_clamp_level_steps() {
        assert_eq!(step_level(250, true), 255);
        assert_eq!(step_level(3, false), 0);
        assert_eq!(step_level(100, true), 108);
    }
}
