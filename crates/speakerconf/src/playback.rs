//! Playback configuration - where the stream comes from, where it goes, and
//! how hard the daemon tries to keep it running.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// RTSP source of the audio stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtspConfig {
    /// Default: localhost
    #[serde(default = "RtspConfig::default_host")]
    pub host: String,

    /// Default: 8554
    #[serde(default = "RtspConfig::default_port")]
    pub port: u16,

    /// Mount path on the RTSP server, without leading slash.
    /// Default: test
    #[serde(default = "RtspConfig::default_path")]
    pub path: String,
}

impl RtspConfig {
    fn default_host() -> String {
        "localhost".to_string()
    }

    fn default_port() -> u16 {
        8554
    }

    fn default_path() -> String {
        "test".to_string()
    }

    /// Stream location, e.g. `rtsp://localhost:8554/test`.
    pub fn url(&self) -> String {
        format!(
            "rtsp://{}:{}/{}",
            self.host,
            self.port,
            self.path.trim_start_matches('/')
        )
    }
}

impl Default for RtspConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            path: Self::default_path(),
        }
    }
}

/// Local audio sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// ALSA device name.
    /// Default: hw:0,0
    #[serde(default = "AudioConfig::default_device")]
    pub device: String,
}

impl AudioConfig {
    fn default_device() -> String {
        "hw:0,0".to_string()
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: Self::default_device(),
        }
    }
}

/// Session watchdog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Seconds between checks while unmuted.
    /// Default: 5
    #[serde(default = "WatchdogConfig::default_period_secs")]
    pub period_secs: u64,

    /// Restart the session on an engine error, as on end-of-stream.
    /// Default: false
    #[serde(default)]
    pub restart_on_error: bool,
}

impl WatchdogConfig {
    fn default_period_secs() -> u64 {
        5
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs.max(1))
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            period_secs: Self::default_period_secs(),
            restart_on_error: false,
        }
    }
}

/// Media engine selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Program used by the gst-launch engine.
    /// Default: gst-launch-1.0
    #[serde(default = "EngineConfig::default_program")]
    pub program: String,
}

impl EngineConfig {
    fn default_program() -> String {
        "gst-launch-1.0".to_string()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: Self::default_program(),
        }
    }
}
