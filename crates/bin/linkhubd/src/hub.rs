//! Wiring of the modem, protocol, registry and configured devices.

use std::sync::Arc;

use linkhub_adapter_mqtt::{BatterySensorBridge, Bridge, DimmerBridge, MqttConfig, MqttError, Publisher};
use linkhub_app::devices::{BatterySensor, Device, Dimmer, Modem, NWayDimmer};
use linkhub_app::modem_db::ModemDb;
use linkhub_app::ports::{Link, LinkDbStore, Transport};
use linkhub_app::protocol::Protocol;
use linkhub_app::registry::Registry;
use linkhub_app::signal::SlotId;
use linkhub_domain::address::Address;
use linkhub_domain::error::{ContractViolation, LinkHubError};
use linkhub_domain::message::Message;

use crate::config::{Config, DeviceConfig};

/// Everything behind the link, built from configuration.
pub struct Hub {
    protocol: Arc<Protocol>,
    registry: Arc<Registry>,
    modem: Arc<Modem>,
    devices: Vec<Arc<dyn Device>>,
    routing: SlotId,
}

impl Hub {
    /// Load the modem database and create every configured device.
    ///
    /// # Errors
    ///
    /// Returns [`LinkHubError::Storage`] when the stored database can't be
    /// read, and [`LinkHubError::Contract`] when two configured devices
    /// share an address.
    pub fn build(
        config: &Config,
        link: Arc<dyn Link>,
        store: Arc<dyn LinkDbStore>,
    ) -> Result<Self, LinkHubError> {
        let db = ModemDb::load(config.modem.address, store)?;
        tracing::info!(modem = %config.modem.address, entries = db.database().len(), "modem database loaded");

        let protocol = Arc::new(Protocol::new(link, config.reply_timeout()));
        let transport: Arc<dyn Transport> = protocol.clone();
        let modem = Arc::new(Modem::new(db, Arc::clone(&transport)));
        let registry = Arc::new(Registry::new());
        let routing = registry.attach(&protocol);

        let dimmer = |addr: Address, name: Option<String>| -> Arc<dyn Device> {
            Arc::new(Dimmer::new(addr, name, Arc::clone(&modem), Arc::clone(&transport)))
        };

        let mut devices: Vec<Arc<dyn Device>> = Vec::with_capacity(config.devices.len());
        for device in &config.devices {
            if let Some(addr) = device
                .addresses()
                .into_iter()
                .find(|addr| registry.get(*addr).is_some())
            {
                return Err(ContractViolation(format!(
                    "device {addr} is configured more than once"
                ))
                .into());
            }
            let device: Arc<dyn Device> = match device {
                DeviceConfig::Dimmer { address, name } => {
                    let device = dimmer(*address, name.clone());
                    registry.add(Arc::clone(&device));
                    device
                }
                DeviceConfig::NWayDimmer {
                    primary,
                    secondaries,
                    name,
                    group,
                } => NWayDimmer::new(*primary, secondaries, name.clone(), *group, &registry, dimmer),
                DeviceConfig::BatterySensor { address, name } => {
                    let device: Arc<dyn Device> =
                        Arc::new(BatterySensor::new(*address, name.clone()));
                    registry.add(Arc::clone(&device));
                    device
                }
            };
            tracing::info!(device = %device.label(), kind = device.kind(), "device created");
            devices.push(device);
        }

        Ok(Self {
            protocol,
            registry,
            modem,
            devices,
            routing,
        })
    }

    #[must_use]
    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn modem(&self) -> &Arc<Modem> {
        &self.modem
    }

    /// Configured devices; an n-way dimmer appears once, as its aggregate.
    #[must_use]
    pub fn devices(&self) -> &[Arc<dyn Device>] {
        &self.devices
    }

    /// Configured device whose (primary) address is `addr`.
    #[must_use]
    pub fn device(&self, addr: Address) -> Option<Arc<dyn Device>> {
        self.devices.iter().find(|d| d.address() == addr).cloned()
    }

    /// Feed one message read from the link to the protocol.
    ///
    /// # Errors
    ///
    /// Returns the [`ContractViolation`] raised by the active reply handler.
    pub fn process(&self, msg: &Message) -> Result<(), ContractViolation> {
        self.protocol.process(msg)
    }

    /// One MQTT bridge per configured device, chosen by the signals the
    /// device offers.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError`] when a template can't be rendered or the
    /// configured QoS is invalid.
    pub fn bridges(
        &self,
        config: &MqttConfig,
        publisher: &Arc<dyn Publisher>,
    ) -> Result<Vec<Arc<dyn Bridge>>, MqttError> {
        let qos = config.qos()?;
        let mut bridges: Vec<Arc<dyn Bridge>> = Vec::with_capacity(self.devices.len());
        for device in &self.devices {
            let device = Arc::clone(device);
            let publisher = Arc::clone(publisher);
            if device.level_changed().is_some() {
                bridges.push(Arc::new(DimmerBridge::new(
                    device,
                    &config.dimmer,
                    qos,
                    config.retain,
                    publisher,
                )?));
            } else if device.active_changed().is_some() {
                bridges.push(Arc::new(BatterySensorBridge::new(
                    device,
                    &config.battery_sensor,
                    qos,
                    config.retain,
                    publisher,
                )?));
            } else {
                tracing::debug!(device = %device.label(), "no MQTT bridge for device");
            }
        }
        Ok(bridges)
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.protocol.signal_unhandled().disconnect(self.routing);
    }
}
