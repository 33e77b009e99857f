//! Transport-neutral view of the control bus.
//!
//! The controller only needs to subscribe, publish, and be told about
//! connections and deliveries. Publishing is fire-and-forget: implementations
//! queue the message and return immediately, and delivery retries belong to
//! the transport.

use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus client is disconnected")]
    Disconnected,

    #[error("failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    #[error("failed to subscribe to {filter}: {message}")]
    Subscribe { filter: String, message: String },
}

/// Outbound half of the control bus.
pub trait BusClient: Send + Sync {
    /// Subscribe to a topic filter (MQTT wildcards allowed).
    fn subscribe(&self, filter: &str) -> Result<(), BusError>;

    /// Queue a message for delivery.
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError>;
}

/// Inbound notifications from the control bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// Session (re)established with the broker
    Connected,
    /// Message delivered on a subscribed topic
    Message { topic: String, payload: Bytes },
    /// Connection lost; the transport keeps retrying
    Disconnected { reason: String },
}
