//! Pub/sub transport seams and the MQTT implementation.
//!
//! The scheduler only sees [`Publisher`], and inbound commands reach it through
//! [`ControlHandler`]. [`MqttTransport`] implements both sides on top of
//! `rumqttc`: publishing is fire-and-forget onto the client's request queue,
//! and a background task drives the event loop and routes interval commands.

use crate::device::DeviceId;
use crate::protocol::Topics;
use rumqttc::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

const REQUEST_QUEUE_CAPACITY: usize = 256;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to broker {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: ConnectionError,
    },
    #[error("timed out connecting to broker {0}")]
    ConnectTimeout(String),
    #[error("failed to subscribe to {topic}: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: ClientError,
    },
    #[error("failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },
    #[error("failed to disconnect cleanly: {0}")]
    Disconnect(#[source] ClientError),
}

/// Outbound side of the bus. Implementations must not block on delivery.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), TransportError>;
}

/// Receives interval commands already resolved to a device.
pub trait ControlHandler: Send + Sync {
    fn on_control_message(&self, device: &DeviceId, payload: &[u8]);
}

/// Route one inbound message to `handler`. Returns whether the topic was a
/// control topic of this environment.
pub fn dispatch_control(
    topics: &Topics,
    handler: &dyn ControlHandler,
    topic: &str,
    payload: &[u8],
) -> bool {
    match topics.parse_control(topic) {
        Some(device) => {
            handler.on_control_message(&device, payload);
            true
        }
        None => {
            debug!(topic, "Ignoring message on non-control topic");
            false
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
}

impl BrokerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
}

/// Connected event loop, not yet routing messages.
pub struct MqttEventLoop {
    client: AsyncClient,
    event_loop: EventLoop,
    topics: Topics,
    subscriptions: Vec<String>,
}

/// Background task driving an [`MqttEventLoop`].
pub struct EventLoopHandle(JoinHandle<()>);

impl MqttTransport {
    /// Connect and subscribe to the interval topic of every device.
    ///
    /// Fails if the broker does not acknowledge the connection; the caller
    /// should treat that as fatal.
    pub async fn connect(
        settings: &BrokerSettings,
        topics: Topics,
        devices: &[DeviceId],
    ) -> Result<(Self, MqttEventLoop), TransportError> {
        let mut options = MqttOptions::new(settings.client_id.clone(), settings.host.clone(), settings.port);
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_QUEUE_CAPACITY);
        let address = settings.address();

        match time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut event_loop)).await {
            Ok(Ok(())) => info!(client_id = %settings.client_id, broker = %address, "Connected to broker"),
            Ok(Err(source)) => return Err(TransportError::Connect { address, source }),
            Err(_) => return Err(TransportError::ConnectTimeout(address)),
        }

        let subscriptions: Vec<String> = devices.iter().map(|device| topics.interval(device)).collect();
        for topic in &subscriptions {
            client
                .subscribe(topic.as_str(), QoS::AtMostOnce)
                .await
                .map_err(|source| TransportError::Subscribe {
                    topic: topic.clone(),
                    source,
                })?;
            info!(topic = %topic, "Subscribed");
        }

        let events = MqttEventLoop {
            client: client.clone(),
            event_loop,
            topics,
            subscriptions,
        };
        Ok((Self { client }, events))
    }

    /// Orderly disconnect: sends DISCONNECT and waits briefly for the event
    /// loop to flush it.
    pub async fn disconnect(&self, events: EventLoopHandle) -> Result<(), TransportError> {
        let result = self.client.disconnect().await.map_err(TransportError::Disconnect);

        let EventLoopHandle(mut task) = events;
        if time::timeout(DISCONNECT_TIMEOUT, &mut task).await.is_err() {
            warn!("Event loop did not stop after disconnect, aborting it");
            task.abort();
        }
        result
    }
}

impl Publisher for MqttTransport {
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), TransportError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, retain, payload.as_bytes().to_vec())
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

impl MqttEventLoop {
    /// Drive the event loop in the background, routing interval commands to
    /// `handler` and re-subscribing after every reconnect.
    pub fn spawn(self, handler: Arc<dyn ControlHandler>) -> EventLoopHandle {
        EventLoopHandle(tokio::spawn(self.run(handler)))
    }

    async fn run(mut self, handler: Arc<dyn ControlHandler>) {
        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    dispatch_control(&self.topics, handler.as_ref(), &publish.topic, &publish.payload);
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Reconnected to broker, restoring subscriptions");
                    self.resubscribe();
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("Disconnected from broker");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT event loop error: {}", e);
                    time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }

    fn resubscribe(&self) {
        for topic in &self.subscriptions {
            if let Err(e) = self.client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                warn!(topic = %topic, "Failed to restore subscription: {}", e);
            }
        }
    }
}

async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = event_loop.poll().await? {
            return Ok(());
        }
    }
}
