//! Infrastructure configuration - the broker, the output pin, host identity
//! and telemetry. None of this changes while the daemon runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// MQTT broker connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker hostname or address.
    /// Default: localhost
    #[serde(default = "BrokerConfig::default_host")]
    pub host: String,

    /// Broker TCP port.
    /// Default: 1883
    #[serde(default = "BrokerConfig::default_port")]
    pub port: u16,

    /// MQTT client id. When unset the daemon uses `speakerd-{hostname}`.
    #[serde(default)]
    pub client_id: Option<String>,

    /// MQTT keep-alive interval in seconds.
    /// Default: 30
    #[serde(default = "BrokerConfig::default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Pause between polls after a connection error, in milliseconds.
    /// The MQTT client reconnects on the next poll.
    /// Default: 1000
    #[serde(default = "BrokerConfig::default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl BrokerConfig {
    fn default_host() -> String {
        "localhost".to_string()
    }

    fn default_port() -> u16 {
        1883
    }

    fn default_keep_alive_secs() -> u64 {
        30
    }

    fn default_reconnect_delay_ms() -> u64 {
        1000
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            client_id: None,
            keep_alive_secs: Self::default_keep_alive_secs(),
            reconnect_delay_ms: Self::default_reconnect_delay_ms(),
        }
    }
}

/// Digital output driven alongside the mute state (speaker amplifier relay).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpioConfig {
    /// Output pin number. No pin means no output toggle.
    #[serde(default)]
    pub pin: Option<u32>,

    /// Root of the sysfs GPIO class directory.
    /// Default: /sys/class/gpio
    #[serde(default = "GpioConfig::default_sysfs_root")]
    pub sysfs_root: PathBuf,
}

impl GpioConfig {
    fn default_sysfs_root() -> PathBuf {
        PathBuf::from("/sys/class/gpio")
    }
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            pin: None,
            sysfs_root: Self::default_sysfs_root(),
        }
    }
}

/// Identity of this client on the control bus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Hostname used in topic names. Defaults to the system hostname.
    #[serde(default)]
    pub hostname: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
