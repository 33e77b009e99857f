//! Configuration loading for the speaker client.
//!
//! Every speaker crate imports this one, so it stays small: serde types with
//! per-field defaults, file discovery, and an environment overlay. Command
//! line flags are applied on top by the `speakerd` binary.
//!
//! # Configuration Split
//!
//! - **Infrastructure** (`infra`): broker, output pin, host identity, logging.
//! - **Playback** (`playback`): RTSP source, audio sink, watchdog, engine.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/rtsp-mqtt.json` (legacy flat JSON, if present)
//! 2. `/etc/speaker/config.toml` (system)
//! 3. `~/.config/speaker/config.toml` (user)
//! 4. `./speaker.toml` (local override, replaced by an explicit path)
//! 5. Environment variables (`SPEAKER_*`)
//!
//! # Example Config
//!
//! ```toml
//! [broker]
//! host = "mqtt.lan"
//! port = 1883
//!
//! [rtsp]
//! host = "snapserver.lan"
//! port = 8554
//!
//! [audio]
//! device = "hw:1,0"
//!
//! [gpio]
//! pin = 17
//!
//! [watchdog]
//! period_secs = 5
//! ```

pub mod infra;
pub mod loader;
pub mod playback;

pub use infra::{BrokerConfig, ClientConfig, GpioConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};
pub use playback::{AudioConfig, EngineConfig, RtspConfig, WatchdogConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Complete speaker configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeakerConfig {
    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub rtsp: RtspConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub gpio: GpioConfig,

    #[serde(default)]
    pub watchdog: WatchdogConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl SpeakerConfig {
    /// Load configuration from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with an explicit file taking the place of
    /// `./speaker.toml`. System and user files still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report where values came from.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let mut config = loader::from_table(merged)?;
        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Load a single file, without discovery or environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        loader::from_table(loader::load_table(path)?)
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# speaker configuration\n\n");

        output.push_str("[broker]\n");
        output.push_str(&format!("host = \"{}\"\n", self.broker.host));
        output.push_str(&format!("port = {}\n", self.broker.port));
        if let Some(client_id) = &self.broker.client_id {
            output.push_str(&format!("client_id = \"{}\"\n", client_id));
        }
        output.push_str(&format!("keep_alive_secs = {}\n", self.broker.keep_alive_secs));
        output.push_str(&format!(
            "reconnect_delay_ms = {}\n",
            self.broker.reconnect_delay_ms
        ));

        output.push_str("\n[rtsp]\n");
        output.push_str(&format!("host = \"{}\"\n", self.rtsp.host));
        output.push_str(&format!("port = {}\n", self.rtsp.port));
        output.push_str(&format!("path = \"{}\"\n", self.rtsp.path));

        output.push_str("\n[audio]\n");
        output.push_str(&format!("device = \"{}\"\n", self.audio.device));

        output.push_str("\n[gpio]\n");
        if let Some(pin) = self.gpio.pin {
            output.push_str(&format!("pin = {}\n", pin));
        }
        output.push_str(&format!(
            "sysfs_root = \"{}\"\n",
            self.gpio.sysfs_root.display()
        ));

        output.push_str("\n[watchdog]\n");
        output.push_str(&format!("period_secs = {}\n", self.watchdog.period_secs));
        output.push_str(&format!(
            "restart_on_error = {}\n",
            self.watchdog.restart_on_error
        ));

        output.push_str("\n[engine]\n");
        output.push_str(&format!("program = \"{}\"\n", self.engine.program));

        output.push_str("\n[client]\n");
        if let Some(hostname) = &self.client.hostname {
            output.push_str(&format!("hostname = \"{}\"\n", hostname));
        }

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        output
    }
}
