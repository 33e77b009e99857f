//! Media engine seam - what the supervisor needs from a pipeline runtime.
//!
//! An engine launches one pipeline per [`SessionId`] and reports everything
//! that happens to it as [`SessionEvent`]s on a shared channel. The supervisor
//! holds the returned [`SessionHandle`] to stop it again.

use std::fmt;

use speakerconf::{AudioConfig, RtspConfig};
use thiserror::Error;
use tokio::sync::mpsc;

/// Pipeline state as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Null,
    Ready,
    Paused,
    Playing,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Null => "NULL",
            EngineState::Ready => "READY",
            EngineState::Paused => "PAUSED",
            EngineState::Playing => "PLAYING",
        }
    }

    /// Parse a GStreamer state name, case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "NULL" => Some(EngineState::Null),
            "READY" => Some(EngineState::Ready),
            "PAUSED" => Some(EngineState::Paused),
            "PLAYING" => Some(EngineState::Playing),
            _ => None,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one launched pipeline; strictly increasing per supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Notification from a running pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    StateChanged { old: EngineState, new: EngineState },
    EndOfStream,
    Error { message: String, debug: Option<String> },
    Warning { message: String, debug: Option<String> },
}

/// A lifecycle event tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub event: LifecycleEvent,
}

impl SessionEvent {
    pub fn new(session: SessionId, event: LifecycleEvent) -> Self {
        Self { session, event }
    }
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("pipeline rejected: {message}")]
    Launch { message: String },

    #[error("{engine} engine is not available in this build")]
    NotAvailable { engine: String },
}

/// Textual pipeline description, built once from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDescription(String);

impl PipelineDescription {
    pub fn new(description: impl Into<String>) -> Self {
        Self(description.into())
    }

    /// RTSP L16 audio into an ALSA sink.
    pub fn rtsp(rtsp: &RtspConfig, audio: &AudioConfig) -> Self {
        Self(format!(
            "rtspsrc location={} buffer-mode=4 ntp-sync=true ! rtpL16depay ! audioconvert ! audioresample ! alsasink device={}",
            rtsp.url(),
            audio.device
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whitespace-separated tokens, as gst-launch expects them on argv.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.split_whitespace()
    }
}

impl fmt::Display for PipelineDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Control over one launched pipeline.
pub trait SessionHandle: Send {
    /// Bring the pipeline down. The engine reports the resulting state
    /// change on the event channel.
    fn stop(&mut self);
}

/// Something that can run a pipeline description.
///
/// `launch` must not block: engines spawn whatever they need and return.
pub trait MediaEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn launch(
        &self,
        description: &PipelineDescription,
        session: SessionId,
        events: EventSender,
    ) -> Result<Box<dyn SessionHandle>, EngineError>;
}
