//! Tracing initialization for speakerd.
//!
//! Logs go to stderr through the fmt layer. The filter comes from
//! `telemetry.log_level`, which the config loader already overrides with
//! `RUST_LOG` when that is set.

use anyhow::{anyhow, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Fallback when the configured filter does not parse.
const DEFAULT_FILTER: &str = "info";

pub fn init(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|e| {
        eprintln!("invalid log filter {:?} ({}), using {}", log_level, e, DEFAULT_FILTER);
        EnvFilter::new(DEFAULT_FILTER)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize tracing: {}", e))
}
