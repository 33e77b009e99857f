//! Status publisher - mute flag out to the bus.

use std::sync::Arc;

use speakerproto::{encode_mute, BusClient, Topics};
use tracing::{debug, warn};

pub struct StatusPublisher {
    bus: Arc<dyn BusClient>,
    topic: String,
}

impl StatusPublisher {
    pub fn new(bus: Arc<dyn BusClient>, topics: &Topics) -> Self {
        Self {
            bus,
            topic: topics.status_topic(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// One message per call. Failures are logged and dropped.
    pub fn publish(&self, muted: bool) {
        let payload = encode_mute(muted);
        match self.bus.publish(&self.topic, payload.as_bytes()) {
            Ok(()) => debug!("published {} = {}", self.topic, payload),
            Err(e) => warn!("status not published: {}", e),
        }
    }
}
