//! Inbound command dispatch.
//!
//! The command name is the last segment of the topic. Anything that is not a
//! recognised command with a well-formed payload becomes [`Command::Ignored`].

use crate::status::decode_mute;
use crate::topics::{MUTE_SUFFIX, STATUS_SUFFIX};

/// A command addressed to this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `true` silences the client, `false` starts playback
    SetMute(bool),
    /// Republish the current status
    GetStatus,
    /// Unknown suffix or unusable payload
    Ignored,
}

impl Command {
    /// Map a bus message to a command.
    pub fn parse(topic: &str, payload: &[u8]) -> Self {
        match command_name(topic) {
            MUTE_SUFFIX => decode_mute(payload).map_or(Command::Ignored, Command::SetMute),
            STATUS_SUFFIX => Command::GetStatus,
            _ => Command::Ignored,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Command::Ignored)
    }
}

/// Final path segment of a topic.
pub fn command_name(topic: &str) -> &str {
    topic.rsplit('/').next().unwrap_or(topic)
}
