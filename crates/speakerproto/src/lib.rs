//! speakerproto - Wire conventions for the speaker control bus
//!
//! Every speaker client listens on its own slice of a shared MQTT topic tree
//! and reports its mute state back on the mirror slice:
//!
//! ```text
//! snapcast/in/client/{hostname}/mute     "1" | "0"   mute / unmute
//! snapcast/in/client/{hostname}/status   (any)       republish status
//! snapcast/out/client/{hostname}/mute    "1" | "0"   current mute state
//! ```
//!
//! Older clients joined the root and direction without a separator
//! (`snapcastin/client/...`). Controllers still publishing to that form do
//! not reach this tree; [`Topics::with_root`] with `"snapcast"` reproduces it
//! where a bridge needs to speak both.
//!
//! This crate only knows the topic layout, the payload encoding, and how to
//! turn a delivered message into a [`Command`]. The daemon decides what the
//! commands mean.
//!
//! ## Transport
//!
//! [`BusClient`] and [`BusEvent`] keep the daemon independent of MQTT. With
//! the default `peer` feature, [`MqttPeer`] implements them on top of
//! `rumqttc`. Building with `default-features = false` leaves just the pure
//! protocol types.

pub mod bus;
pub mod command;
pub mod status;
pub mod topics;

#[cfg(feature = "peer")]
pub mod mqtt_peer;

pub use bus::{BusClient, BusError, BusEvent};
pub use command::Command;
pub use status::{decode_mute, encode_mute};
pub use topics::{Direction, Topics, ROOT_TOPIC};

#[cfg(feature = "peer")]
pub use mqtt_peer::{ConnectionState, MqttEvents, MqttPeer, PeerConfig};
