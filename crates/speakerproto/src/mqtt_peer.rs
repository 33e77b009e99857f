//! MqttPeer - MQTT client for the speaker control bus
//!
//! Wraps `rumqttc` so the controller sees only [`BusClient`] and a stream of
//! [`BusEvent`]s.
//!
//! ## Usage
//!
//! ```ignore
//! use speakerconf::SpeakerConfig;
//! use speakerproto::{MqttPeer, PeerConfig};
//!
//! let config = SpeakerConfig::load()?;
//! let (peer, events) = MqttPeer::connect(&PeerConfig::from_config(&config, "kitchen"));
//! let mut events = Box::pin(events.into_stream());
//! while let Some(event) = events.next().await {
//!     // BusEvent::Connected => resubscribe, BusEvent::Message { .. } => dispatch
//! }
//! ```
//!
//! ## Reconnection
//!
//! The event loop reconnects on its own the next time it is polled after an
//! error. The stream pauses for `reconnect_delay` between failed polls and
//! reports `Connected` again on every successful CONNACK; sessions are clean,
//! so subscriptions must be renewed each time.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use speakerconf::SpeakerConfig;
use tracing::{debug, info, warn};

use crate::bus::{BusClient, BusError, BusEvent};

/// Outgoing request queue size used when none is configured
pub const REQUEST_QUEUE_CAPACITY: usize = 64;

/// Connection settings for [`MqttPeer`].
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    pub reconnect_delay: Duration,
    pub queue_capacity: usize,
}

impl PeerConfig {
    /// Settings from the broker section; a missing or empty client id becomes
    /// `speakerd-{hostname}`.
    pub fn from_config(config: &SpeakerConfig, hostname: &str) -> Self {
        Self {
            host: config.broker.host.clone(),
            port: config.broker.port,
            client_id: config
                .broker
                .client_id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("speakerd-{}", hostname)),
            keep_alive: config.broker.keep_alive(),
            reconnect_delay: config.broker.reconnect_delay(),
            queue_capacity: REQUEST_QUEUE_CAPACITY,
        }
    }
}

/// Broker connection state as last observed by the event loop
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No CONNACK received yet
    Unknown = 0,
    Connected = 1,
    /// Lost after having connected, or never reached
    Disconnected = 2,
}

impl ConnectionState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connected,
            2 => ConnectionState::Disconnected,
            _ => ConnectionState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Unknown => "unknown",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        }
    }
}

/// Publishing half of the MQTT connection.
pub struct MqttPeer {
    client: AsyncClient,
    state: Arc<AtomicU8>,
}

/// Event loop half of the MQTT connection; must be polled for anything,
/// including publishes, to reach the broker.
pub struct MqttEvents {
    eventloop: EventLoop,
    reconnect_delay: Duration,
    state: Arc<AtomicU8>,
}

impl MqttPeer {
    /// Create the client. Nothing touches the network until the returned
    /// [`MqttEvents`] is polled.
    pub fn connect(config: &PeerConfig) -> (Self, MqttEvents) {
        let mut options =
            MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, config.queue_capacity.max(1));
        let state = Arc::new(AtomicU8::new(ConnectionState::Unknown as u8));

        debug!(
            "MQTT client {} targeting {}:{}",
            config.client_id, config.host, config.port
        );

        (
            Self {
                client,
                state: Arc::clone(&state),
            },
            MqttEvents {
                eventloop,
                reconnect_delay: config.reconnect_delay,
                state,
            },
        )
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Queue a DISCONNECT; the event stream ends once it is sent.
    pub fn disconnect(&self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!("MQTT disconnect not queued: {}", e);
        }
    }
}

impl BusClient for MqttPeer {
    fn subscribe(&self, filter: &str) -> Result<(), BusError> {
        self.client
            .try_subscribe(filter, QoS::AtLeastOnce)
            .map_err(|e| BusError::Subscribe {
                filter: filter.to_string(),
                message: e.to_string(),
            })
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .map_err(|e| BusError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }
}

impl MqttEvents {
    /// Drive the connection, yielding connection changes and deliveries.
    ///
    /// The stream only ends after a local disconnect or once every
    /// [`MqttPeer`] handle has been dropped.
    pub fn into_stream(self) -> impl Stream<Item = BusEvent> + Send + 'static {
        let MqttEvents {
            mut eventloop,
            reconnect_delay,
            state,
        } = self;

        async_stream::stream! {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        state.store(ConnectionState::Connected as u8, Ordering::Relaxed);
                        info!("connected to MQTT broker");
                        yield BusEvent::Connected;
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        debug!("received {} ({} bytes)", publish.topic, publish.payload.len());
                        yield BusEvent::Message {
                            topic: publish.topic,
                            payload: publish.payload,
                        };
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        state.store(ConnectionState::Disconnected as u8, Ordering::Relaxed);
                        info!("disconnected from MQTT broker");
                        break;
                    }
                    Ok(_) => {}
                    Err(ConnectionError::RequestsDone) => {
                        debug!("all MQTT client handles dropped, stopping event loop");
                        break;
                    }
                    Err(e) => {
                        let previous = state.swap(ConnectionState::Disconnected as u8, Ordering::Relaxed);
                        warn!("MQTT connection error: {}", e);
                        if ConnectionState::from_u8(previous) == ConnectionState::Connected {
                            yield BusEvent::Disconnected { reason: e.to_string() };
                        }
                        tokio::time::sleep(reconnect_delay).await;
                    }
                }
            }
        }
    }
}
