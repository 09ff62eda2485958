//! Registry of the physical devices attached to the modem.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use linkhub_domain::address::Address;
use linkhub_domain::message::{Message, MessageKind};

use crate::devices::Device;
use crate::protocol::Protocol;
use crate::signal::SlotId;

/// Address-keyed devices in insertion order.
#[derive(Default)]
pub struct Registry {
    devices: Mutex<Vec<Arc<dyn Device>>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `device`, replacing (in place) a device with the same
    /// address. Returns the replaced device.
    pub fn add(&self, device: Arc<dyn Device>) -> Option<Arc<dyn Device>> {
        let mut devices = self.lock();
        let addr = device.address();
        if let Some(slot) = devices.iter_mut().find(|d| d.address() == addr) {
            tracing::debug!(%addr, "replacing registered device");
            return Some(std::mem::replace(slot, device));
        }
        devices.push(device);
        None
    }

    #[must_use]
    pub fn get(&self, addr: Address) -> Option<Arc<dyn Device>> {
        self.lock().iter().find(|d| d.address() == addr).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[must_use]
    pub fn addresses(&self) -> Vec<Address> {
        self.lock().iter().map(|d| d.address()).collect()
    }

    /// Route an unsolicited message to the device that sent it.
    /// Returns whether a device received it.
    pub fn dispatch(&self, msg: &Message) -> bool {
        let Message::Inbound(inbound) = msg else {
            return false;
        };
        if !matches!(
            inbound.kind,
            MessageKind::Broadcast | MessageKind::AllLinkBroadcast | MessageKind::AllLinkCleanup
        ) {
            return false;
        }
        let Some(device) = self.get(inbound.from) else {
            tracing::debug!(from = %inbound.from, "broadcast from unknown device");
            return false;
        };
        device.handle_broadcast(inbound);
        true
    }

    /// Route every message the protocol leaves unhandled.
    pub fn attach(self: &Arc<Self>, protocol: &Protocol) -> SlotId {
        let registry = Arc::downgrade(self);
        protocol.signal_unhandled().connect(move |msg| {
            if let Some(registry) = registry.upgrade() {
                registry.dispatch(msg);
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn Device>>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("devices", &self.addresses())
            .finish()
    }
}
