//! Broker connection — rumqttc event loop and topic routing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeFilter};

use crate::bridge::Bridge;
use crate::config::MqttConfig;
use crate::error::MqttError;
use crate::publisher::Publisher;

/// Capacity of the request channel between the client and the event loop.
const REQUEST_CAPACITY: usize = 64;
/// Delay before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Exact-topic routing table of bridge command topics.
#[derive(Default)]
pub struct Router {
    routes: HashMap<String, Arc<dyn Bridge>>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every topic of `bridge` to it. A topic registered twice goes
    /// to the latest bridge.
    pub fn add(&mut self, bridge: Arc<dyn Bridge>) {
        for topic in bridge.topics() {
            if self.routes.insert(topic.clone(), Arc::clone(&bridge)).is_some() {
                tracing::warn!(%topic, "topic registered twice, keeping the latest bridge");
            }
        }
    }

    /// Registered topics, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.routes.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Hand a publish to the bridge owning `topic`. Returns whether a bridge
    /// accepted it.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> bool {
        let Some(bridge) = self.routes.get(topic) else {
            tracing::debug!(%topic, "publish on unrouted topic");
            return false;
        };
        match bridge.handle(topic, payload) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    %topic,
                    payload = %String::from_utf8_lossy(payload),
                    error = %err,
                    "invalid MQTT command"
                );
                false
            }
        }
    }
}

/// Connected client and its event loop.
pub struct MqttClient {
    client: AsyncClient,
    eventloop: EventLoop,
    qos: QoS,
    router: Router,
}

impl MqttClient {
    /// Build a client from configuration. Nothing is sent until [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::InvalidQos`] for an invalid configured QoS.
    pub fn new(config: &MqttConfig) -> Result<Self, MqttError> {
        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.broker_host.clone(),
            config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(u64::from(config.keep_alive_secs)));
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        Ok(Self {
            client,
            eventloop,
            qos: config.qos()?,
            router: Router::new(),
        })
    }

    /// Publisher handle for bridges.
    #[must_use]
    pub fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::new(self.client.clone())
    }

    pub fn add_bridge(&mut self, bridge: Arc<dyn Bridge>) {
        self.router.add(bridge);
    }

    /// Poll the connection forever, subscribing on every (re)connect and
    /// dispatching incoming publishes.
    pub async fn run(mut self) {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("connected to MQTT broker");
                    if let Err(err) = self.subscribe() {
                        tracing::error!(error = %err, "failed to subscribe");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.router.dispatch(&publish.topic, &publish.payload);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "MQTT connection error, retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    fn subscribe(&self) -> Result<(), MqttError> {
        let filters: Vec<SubscribeFilter> = self
            .router
            .topics()
            .into_iter()
            .map(|topic| SubscribeFilter::new(topic, self.qos))
            .collect();
        if filters.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = filters.len(), "subscribing to command topics");
        self.client
            .try_subscribe_many(filters)
            .map_err(MqttError::Client)
    }
}
