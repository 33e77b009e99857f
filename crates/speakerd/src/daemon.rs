//! Daemon wiring - builds the controller and drives its three event sources.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use speakerconf::SpeakerConfig;
use speakerproto::{BusEvent, MqttPeer, PeerConfig, Topics};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::controller::ClientController;
use crate::engine::{EngineError, EventReceiver, MediaEngine, PipelineDescription};
use crate::output::open_output;
use crate::supervisor::PipelineSupervisor;
use crate::watchdog::{Watchdog, WatchdogTicks};

/// Pick the pipeline engine for this build.
pub fn build_engine(config: &SpeakerConfig) -> Result<Arc<dyn MediaEngine>, EngineError> {
    #[cfg(feature = "gstreamer")]
    {
        let _ = config;
        Ok(Arc::new(crate::gst::GstEngine::new()?))
    }
    #[cfg(not(feature = "gstreamer"))]
    {
        Ok(Arc::new(crate::launch::GstLaunchEngine::new(
            config.engine.program.clone(),
        )))
    }
}

/// Feed bus events to the controller until cancelled or the stream ends.
pub async fn run_bus<S>(controller: Arc<ClientController>, events: S, cancel: CancellationToken)
where
    S: Stream<Item = BusEvent> + Send,
{
    futures::pin_mut!(events);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.next() => match event {
                Some(event) => controller.on_bus_event(event).await,
                None => {
                    debug!("bus event stream ended");
                    break;
                }
            },
        }
    }
}

/// Feed pipeline lifecycle events to the controller.
pub async fn run_lifecycle(
    controller: Arc<ClientController>,
    mut events: EventReceiver,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => controller.on_lifecycle(event).await,
                None => break,
            },
        }
    }
}

/// Deliver watchdog ticks to the controller.
pub async fn run_watchdog(
    controller: Arc<ClientController>,
    mut ticks: WatchdogTicks,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            tick = ticks.next() => match tick {
                Some(epoch) => controller.on_watchdog_tick(epoch).await,
                None => break,
            },
        }
    }
}

/// Run the speaker client until SIGINT/SIGTERM.
pub async fn run(config: SpeakerConfig, hostname: String) -> Result<()> {
    let output = open_output(&config.gpio).context("Failed to acquire output pin")?;
    let engine = build_engine(&config).context("Failed to set up pipeline engine")?;
    let description = PipelineDescription::rtsp(&config.rtsp, &config.audio);
    info!("pipeline: {}", description);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let supervisor = PipelineSupervisor::new(engine, description, events_tx);
    let (watchdog, ticks) = Watchdog::new(config.watchdog.period());

    let peer_config = PeerConfig::from_config(&config, &hostname);
    info!(
        "connecting to MQTT broker {}:{} as {}",
        peer_config.host, peer_config.port, peer_config.client_id
    );
    let (peer, bus_events) = MqttPeer::connect(&peer_config);
    let peer = Arc::new(peer);

    let topics = Topics::new(hostname);
    info!("listening on {}", topics.command_filter());

    let controller = Arc::new(
        ClientController::new(topics, peer.clone(), supervisor, watchdog, output)
            .with_restart_on_error(config.watchdog.restart_on_error),
    );

    let cancel = CancellationToken::new();
    let bus_task = tokio::spawn(run_bus(
        Arc::clone(&controller),
        bus_events.into_stream(),
        cancel.clone(),
    ));
    let lifecycle_task = tokio::spawn(run_lifecycle(
        Arc::clone(&controller),
        events_rx,
        cancel.clone(),
    ));
    let watchdog_task = tokio::spawn(run_watchdog(
        Arc::clone(&controller),
        ticks,
        cancel.clone(),
    ));

    shutdown_signal().await;

    controller.shutdown().await;
    peer.disconnect();
    cancel.cancel();

    let (bus, lifecycle, watchdog) = tokio::join!(bus_task, lifecycle_task, watchdog_task);
    bus.context("bus task panicked")?;
    lifecycle.context("lifecycle task panicked")?;
    watchdog.context("watchdog task panicked")?;

    info!("speakerd shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = sigterm() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!("Failed to set up SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}
