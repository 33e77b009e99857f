//! speakerd daemon binary
//!
//! Loads layered configuration, applies command-line overrides, and runs the
//! speaker client until SIGINT/SIGTERM.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use speakerconf::SpeakerConfig;
use speakerd::{daemon, telemetry};
use tracing::info;

/// RTSP speaker client controlled over MQTT
#[derive(Parser, Debug)]
#[command(name = "speakerd", version, about, long_about = None)]
struct Cli {
    /// Config file; a `.json` file is read in the legacy flat format
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// MQTT broker host
    #[arg(long)]
    broker_host: Option<String>,

    /// MQTT broker port
    #[arg(long)]
    broker_port: Option<u16>,

    /// RTSP server host
    #[arg(long)]
    rtsp_host: Option<String>,

    /// RTSP server port
    #[arg(long)]
    rtsp_port: Option<u16>,

    /// ALSA device for playback (e.g., "hw:1,0")
    #[arg(long)]
    alsa_device: Option<String>,

    /// GPIO pin driven while playing
    #[arg(long)]
    gpio_pin: Option<u32>,

    /// Name used in topics instead of the system hostname
    #[arg(long)]
    hostname: Option<String>,

    /// Watchdog period in seconds
    #[arg(long)]
    watchdog_secs: Option<u64>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn apply(&self, config: &mut SpeakerConfig) {
        if let Some(host) = &self.broker_host {
            config.broker.host = host.clone();
        }
        if let Some(port) = self.broker_port {
            config.broker.port = port;
        }
        if let Some(host) = &self.rtsp_host {
            config.rtsp.host = host.clone();
        }
        if let Some(port) = self.rtsp_port {
            config.rtsp.port = port;
        }
        if let Some(device) = &self.alsa_device {
            config.audio.device = device.clone();
        }
        if let Some(pin) = self.gpio_pin {
            config.gpio.pin = Some(pin);
        }
        if let Some(hostname) = &self.hostname {
            config.client.hostname = Some(hostname.clone());
        }
        if let Some(secs) = self.watchdog_secs {
            config.watchdog.period_secs = secs;
        }
    }
}

fn resolve_hostname(config: &SpeakerConfig) -> Result<String> {
    if let Some(name) = &config.client.hostname {
        return Ok(name.clone());
    }
    let name = hostname::get().context("Failed to read system hostname")?;
    Ok(name.to_string_lossy().into_owned())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        SpeakerConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);

    if cli.print_config {
        print!("{}", config.to_toml());
        return Ok(());
    }

    telemetry::init(&config.telemetry.log_level)?;

    let hostname = resolve_hostname(&config)?;
    info!("speakerd {} starting as {}", env!("CARGO_PKG_VERSION"), hostname);

    daemon::run(config, hostname).await
}
