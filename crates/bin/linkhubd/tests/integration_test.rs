//! End-to-end tests for the full linkhubd stack.
//!
//! Each test wires the real protocol, devices, n-way aggregate, JSON store
//! and MQTT bridges over the virtual modem. Replies the virtual modem
//! produces are fed back to the hub by `pump`, exactly as the daemon loop
//! does. No serial port or broker is involved.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use linkhub_adapter_mqtt::{MqttConfig, MqttError, Publisher, QoS, Router};
use linkhub_adapter_storage_json::JsonFileStore;
use linkhub_adapter_virtual::VirtualModem;
use linkhub_app::completion::Completion;
use linkhub_app::ports::LinkDbStore;
use linkhub_domain::address::Address;
use linkhub_domain::error::{CommandError, LinkHubError};
use linkhub_domain::event::{ActiveChanged, LevelChanged};
use linkhub_domain::link_db::LinkEntry;
use linkhub_domain::message::{Message, cmd};
use linkhubd::config::{Config, DeviceConfig};
use linkhubd::hub::Hub;
use tokio::sync::mpsc::UnboundedReceiver;

const MODEM: Address = Address::new(0x44, 0x85, 0x11);
const PRIMARY: Address = Address::new(0x12, 0x34, 0x56);
const SECONDARY_A: Address = Address::new(0x12, 0x34, 0x57);
const SECONDARY_B: Address = Address::new(0x12, 0x34, 0x58);
const LAMP: Address = Address::new(0x3a, 0x29, 0x84);
const DOOR: Address = Address::new(0x21, 0xd8, 0x1a);

/// Publisher keeping every message in memory.
#[derive(Default)]
struct RecordingPublisher {
    messages: Mutex<Vec<(String, String)>>,
}

impl RecordingPublisher {
    fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, topic: &str, payload: &str, _qos: QoS, _retain: bool) -> Result<(), MqttError> {
        self.messages
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

struct Stack {
    _dir: tempfile::TempDir,
    db_path: std::path::PathBuf,
    link: Arc<VirtualModem>,
    inbound: UnboundedReceiver<Message>,
    hub: Hub,
}

impl Stack {
    /// Feed every pending reply to the hub until the link is quiet.
    fn pump(&mut self) {
        while let Ok(msg) = self.inbound.try_recv() {
            self.hub.process(&msg).unwrap();
        }
    }
}

fn stack(devices: Vec<DeviceConfig>, silent: &[Address]) -> Stack {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("modem_db.json");
    let mut config = Config::default();
    config.modem.address = MODEM;
    config.devices = devices;

    let (link, inbound) = VirtualModem::new(MODEM);
    let link = Arc::new(link);
    let hub = Hub::build(&config, link.clone(), Arc::new(JsonFileStore::new(&db_path))).unwrap();
    for addr in hub.registry().addresses() {
        if !silent.contains(&addr) {
            link.attach(addr, 0);
        }
    }

    Stack {
        _dir: dir,
        db_path,
        link,
        inbound,
        hub,
    }
}

fn n_way() -> DeviceConfig {
    DeviceConfig::NWayDimmer {
        primary: PRIMARY,
        secondaries: vec![SECONDARY_A, SECONDARY_B],
        name: Some("stairs".to_string()),
        group: 1,
    }
}

fn recording() -> (Completion, Arc<Mutex<Vec<Result<String, CommandError>>>>) {
    let results = Arc::new(Mutex::new(Vec::new()));
    let r = Arc::clone(&results);
    (Completion::new(move |res| r.lock().unwrap().push(res)), results)
}

fn levels(device: &Arc<dyn linkhub_app::devices::Device>) -> Arc<Mutex<Vec<u8>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    device
        .level_changed()
        .unwrap()
        .connect(move |e: &LevelChanged| s.lock().unwrap().push(e.level));
    seen
}

// ---------------------------------------------------------------------------
// N-way dimmer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_turn_every_n_way_member_on_and_report_level_once() {
    let mut stack = stack(vec![n_way()], &[]);
    let stairs = stack.hub.device(PRIMARY).unwrap();
    let seen = levels(&stairs);
    let (done, rx) = Completion::channel();

    stairs.on(0x80, false, done);
    stack.pump();

    assert!(rx.await.unwrap().is_ok());
    assert_eq!(stack.link.level(PRIMARY), Some(0x80));
    assert_eq!(stack.link.level(SECONDARY_A), Some(0x80));
    assert_eq!(stack.link.level(SECONDARY_B), Some(0x80));
    assert_eq!(*seen.lock().unwrap(), vec![0x80]);
    assert!(stack.hub.protocol().is_idle());
}

#[tokio::test]
async fn should_follow_physical_change_on_a_secondary() {
    let mut stack = stack(vec![n_way()], &[]);
    let stairs = stack.hub.device(PRIMARY).unwrap();
    let seen = levels(&stairs);

    stack.link.press(SECONDARY_B, 1, cmd::ON, 0xff).unwrap();
    stack.pump();

    assert_eq!(*seen.lock().unwrap(), vec![0xff]);
}

#[tokio::test]
async fn should_stop_n_way_fan_out_at_first_silent_member() {
    let mut stack = stack(vec![n_way()], &[SECONDARY_A]);
    let stairs = stack.hub.device(PRIMARY).unwrap();
    let (done, results) = recording();

    stairs.off(false, done);
    stack.pump();
    assert!(results.lock().unwrap().is_empty());

    stack
        .hub
        .protocol()
        .poll_timeout(Instant::now() + Duration::from_secs(60));
    stack.pump();

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(CommandError::Timeout(_))));
    assert!(stack.hub.protocol().is_idle());
}

// ---------------------------------------------------------------------------
// Pairing and persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_persist_modem_links_when_pairing_a_dimmer() {
    let mut stack = stack(
        vec![DeviceConfig::Dimmer {
            address: LAMP,
            name: Some("hall".to_string()),
        }],
        &[],
    );
    let lamp = stack.hub.device(LAMP).unwrap();
    let (done, rx) = Completion::channel();

    lamp.pair(done);
    stack.pump();

    assert!(rx.await.unwrap().is_ok());
    let stored = JsonFileStore::new(&stack.db_path).load(MODEM).unwrap();
    let mut entries: Vec<LinkEntry> = stored.iter().copied().collect();
    entries.sort_by_key(|e| e.role.is_controller());
    assert_eq!(
        entries,
        vec![
            LinkEntry::responder(LAMP, 1, [0; 3]),
            LinkEntry::controller(LAMP, 1, [0; 3]),
        ]
    );
    assert_eq!(stack.hub.modem().database(), stored);
}

#[tokio::test]
async fn should_keep_modem_database_when_update_is_rejected() {
    let mut stack = stack(vec![], &[]);
    stack.link.nak_db_updates(true);
    let (done, rx) = Completion::channel();

    stack.hub.modem().db_add_ctrl_of(LAMP, 1, [0; 3], done);
    stack.pump();

    assert!(matches!(rx.await.unwrap(), Err(CommandError::Nak(_))));
    assert!(stack.hub.modem().database().is_empty());
    assert!(!stack.db_path.exists());
}

// ---------------------------------------------------------------------------
// Broadcast routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_route_sensor_broadcast_to_sensor() {
    let mut stack = stack(
        vec![DeviceConfig::BatterySensor {
            address: DOOR,
            name: None,
        }],
        &[],
    );
    let door = stack.hub.device(DOOR).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    door.active_changed()
        .unwrap()
        .connect(move |e: &ActiveChanged| s.lock().unwrap().push(e.is_active));

    stack.link.press(DOOR, 1, cmd::ON, 0).unwrap();
    stack.pump();

    assert_eq!(*seen.lock().unwrap(), vec![true]);
}

// ---------------------------------------------------------------------------
// MQTT bridges
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_publish_state_for_level_command_received_over_mqtt() {
    let mut stack = stack(
        vec![
            DeviceConfig::Dimmer {
                address: LAMP,
                name: None,
            },
            DeviceConfig::BatterySensor {
                address: DOOR,
                name: None,
            },
        ],
        &[],
    );
    let publisher = Arc::new(RecordingPublisher::default());
    let handle: Arc<dyn Publisher> = publisher.clone();
    let bridges = stack
        .hub
        .bridges(&MqttConfig::default(), &handle)
        .unwrap();
    let mut router = Router::new();
    for bridge in &bridges {
        router.add(Arc::clone(bridge));
    }

    assert_eq!(bridges.len(), 2);
    assert!(router.dispatch("insteon/3a2984/level", br#"{"cmd": "on", "level": 200}"#));
    stack.pump();

    assert_eq!(stack.link.level(LAMP), Some(200));
    assert_eq!(
        publisher.messages(),
        vec![(
            "insteon/3a2984/state".to_string(),
            r#"{ "state" : "ON", "brightness" : 200 }"#.to_string()
        )]
    );
}

#[tokio::test]
async fn should_reject_unknown_flag_over_mqtt_without_wire_activity() {
    let mut stack = stack(vec![n_way()], &[]);
    let handle: Arc<dyn Publisher> = Arc::new(RecordingPublisher::default());
    let bridges = stack.hub.bridges(&MqttConfig::default(), &handle).unwrap();
    let mut router = Router::new();
    for bridge in &bridges {
        router.add(Arc::clone(bridge));
    }

    assert!(!router.dispatch("insteon/123456/set_flags", br#"{"gamma": 3}"#));
    stack.pump();

    assert!(stack.hub.protocol().is_idle());
    assert_eq!(stack.link.level(PRIMARY), Some(0));
}

#[test]
fn should_refuse_standalone_dimmer_sharing_n_way_member_address() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.modem.address = MODEM;
    config.devices = vec![
        n_way(),
        DeviceConfig::Dimmer {
            address: SECONDARY_A,
            name: Some("hall".to_string()),
        },
    ];
    let (link, _inbound) = VirtualModem::new(MODEM);
    let store = Arc::new(JsonFileStore::new(dir.path().join("modem_db.json")));

    let built = Hub::build(&config, Arc::new(link), store);

    assert!(matches!(built, Err(LinkHubError::Contract(_))));
}
