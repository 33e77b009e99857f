//! speakerd - RTSP speaker client controlled over MQTT
//!
//! Plays one RTSP audio stream into a local ALSA device and lets a central
//! controller mute, unmute and query it over the bus layout defined in
//! `speakerproto`.
//!
//! ## Pieces
//!
//! - [`engine`]: the [`MediaEngine`] seam and lifecycle event types
//! - [`launch`]: default engine, `gst-launch-1.0` as a child process
//! - `gst`: in-process GStreamer engine (`gstreamer` feature)
//! - [`supervisor`]: owns the single session, start/stop and staleness
//! - [`watchdog`]: restartable period timer
//! - [`output`]: sysfs GPIO output that follows playback
//! - [`controller`]: mute state, reconciliation, status publishing
//! - [`daemon`]: task wiring and signal handling
//!
//! The mute flag starts out `true`. An unmute command starts a session and
//! arms the watchdog; every period the watchdog restarts the session if it
//! is not playing. The pipeline reaching or leaving PLAYING is what finally
//! decides the published status.

pub mod controller;
pub mod daemon;
pub mod engine;
#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod launch;
pub mod output;
pub mod status;
pub mod supervisor;
pub mod telemetry;
pub mod watchdog;

pub use controller::{ClientController, ControllerSnapshot};
pub use engine::{
    EngineError, EngineState, EventSender, LifecycleEvent, MediaEngine, PipelineDescription,
    SessionEvent, SessionHandle, SessionId,
};
pub use launch::GstLaunchEngine;
pub use output::{NoOutput, OutputError, OutputToggle, SysfsPin};
pub use status::StatusPublisher;
pub use supervisor::{PipelineSupervisor, SessionState};
pub use watchdog::{Watchdog, WatchdogTicks};
