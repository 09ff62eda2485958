//! Device events — state changes broadcast to interested listeners.
//!
//! Events carry a [`DeviceLabel`] rather than a device handle so listeners
//! never extend a device's lifetime.

use std::fmt;

use crate::address::Address;

/// Identity of the device that produced an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceLabel {
    pub address: Address,
    pub name: Option<String>,
}

impl DeviceLabel {
    #[must_use]
    pub fn new(address: Address, name: Option<String>) -> Self {
        Self { address, name }
    }
}

impl fmt::Display for DeviceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({name})", self.address),
            None => self.address.fmt(f),
        }
    }
}

/// A dimmer-like device reported a new level (0 = off, 255 = fully on).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelChanged {
    pub device: DeviceLabel,
    pub level: u8,
}

/// A battery sensor went active or inactive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveChanged {
    pub device: DeviceLabel,
    pub is_active: bool,
}

/// A battery sensor reported its low battery state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowBatteryChanged {
    pub device: DeviceLabel,
    pub is_low: bool,
}
