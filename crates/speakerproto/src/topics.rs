//! Topic layout on the control bus.
//!
//! Commands for a client arrive under `{root}in/client/{hostname}/...` and its
//! status leaves under `{root}out/client/{hostname}/...`. The root carries its
//! own trailing separator.

use std::fmt;

/// Fixed root shared by every speaker client.
pub const ROOT_TOPIC: &str = "snapcast/";

/// Suffix carrying the mute flag, inbound and outbound.
pub const MUTE_SUFFIX: &str = "mute";

/// Suffix requesting a status republish.
pub const STATUS_SUFFIX: &str = "status";

/// Which side of the bus a topic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Commands addressed to the client
    In,
    /// Status published by the client
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a topic: `{root}{direction}/client/{hostname}/{parts...}`.
pub fn make_topic(root: &str, direction: Direction, hostname: &str, parts: &[&str]) -> String {
    let mut topic = format!("{}{}/client/{}", root, direction, hostname);
    for part in parts {
        topic.push('/');
        topic.push_str(part);
    }
    topic
}

/// Topic names for one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    root: String,
    hostname: String,
}

impl Topics {
    /// Topics under the standard root.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self::with_root(ROOT_TOPIC, hostname)
    }

    pub fn with_root(root: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            hostname: hostname.into(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn make(&self, direction: Direction, parts: &[&str]) -> String {
        make_topic(&self.root, direction, &self.hostname, parts)
    }

    /// Wildcard subscription covering every command for this client.
    pub fn command_filter(&self) -> String {
        self.make(Direction::In, &["#"])
    }

    /// Where the mute status is published.
    pub fn status_topic(&self) -> String {
        self.make(Direction::Out, &[MUTE_SUFFIX])
    }
}
