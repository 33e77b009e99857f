//! ClientController - mute state, session and watchdog behind one lock.
//!
//! Three sources call in here: bus deliveries, lifecycle events from the
//! engine and watchdog ticks. Each entry point takes the lock for its whole
//! step, so a command, an event and a tick never interleave.
//!
//! Commands update the mute flag right away and publish it; lifecycle events
//! then correct it to what the pipeline actually did.

use std::sync::Arc;

use speakerproto::{BusClient, BusEvent, Command, Topics};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::engine::{EngineState, LifecycleEvent, SessionEvent, SessionId};
use crate::output::OutputToggle;
use crate::status::StatusPublisher;
use crate::supervisor::{PipelineSupervisor, SessionState};
use crate::watchdog::Watchdog;

struct ControllerState {
    muted: bool,
    supervisor: PipelineSupervisor,
    watchdog: Watchdog,
}

/// Read-only view of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub muted: bool,
    pub session: Option<SessionId>,
    pub session_state: SessionState,
    pub watchdog_armed: bool,
}

pub struct ClientController {
    state: Mutex<ControllerState>,
    topics: Topics,
    bus: Arc<dyn BusClient>,
    status: StatusPublisher,
    output: Box<dyn OutputToggle>,
    restart_on_error: bool,
}

impl ClientController {
    /// Starts muted with no session.
    pub fn new(
        topics: Topics,
        bus: Arc<dyn BusClient>,
        supervisor: PipelineSupervisor,
        watchdog: Watchdog,
        output: Box<dyn OutputToggle>,
    ) -> Self {
        let status = StatusPublisher::new(Arc::clone(&bus), &topics);
        Self {
            state: Mutex::new(ControllerState {
                muted: true,
                supervisor,
                watchdog,
            }),
            topics,
            bus,
            status,
            output,
            restart_on_error: false,
        }
    }

    /// Treat pipeline errors like end-of-stream.
    pub fn with_restart_on_error(mut self, restart: bool) -> Self {
        self.restart_on_error = restart;
        self
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        let state = self.state.lock().await;
        ControllerSnapshot {
            muted: state.muted,
            session: state.supervisor.session_id(),
            session_state: state.supervisor.state(),
            watchdog_armed: state.watchdog.is_armed(),
        }
    }

    pub async fn set_mute(&self, mute: bool) {
        let mut state = self.state.lock().await;
        if mute {
            state.supervisor.stop();
            state.watchdog.disarm();
        } else {
            if !state.supervisor.is_playing() {
                state.supervisor.start();
            }
            state.watchdog.arm();
        }
        state.muted = mute;
        info!("mute set to {}", mute);
        self.status.publish(mute);
    }

    /// Republish the current mute flag.
    pub async fn get_status(&self) {
        let state = self.state.lock().await;
        self.status.publish(state.muted);
    }

    /// Dispatch one bus delivery.
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) {
        debug!("received {} ({} bytes)", topic, payload.len());
        match Command::parse(topic, payload) {
            Command::SetMute(mute) => self.set_mute(mute).await,
            Command::GetStatus => self.get_status().await,
            Command::Ignored => debug!("ignoring message on {}", topic),
        }
    }

    /// Subscribe to commands, then announce the current state.
    pub async fn on_connected(&self) {
        let filter = self.topics.command_filter();
        match self.bus.subscribe(&filter) {
            Ok(()) => info!("subscribed to {}", filter),
            Err(e) => warn!("{}", e),
        }
        self.get_status().await;
    }

    pub async fn on_bus_event(&self, event: BusEvent) {
        match event {
            BusEvent::Connected => self.on_connected().await,
            BusEvent::Message { topic, payload } => self.handle_message(&topic, &payload).await,
            BusEvent::Disconnected { reason } => warn!("bus disconnected: {}", reason),
        }
    }

    pub async fn on_lifecycle(&self, event: SessionEvent) {
        let mut state = self.state.lock().await;
        let current = state.supervisor.observe(&event);
        let session = event.session;

        match event.event {
            LifecycleEvent::StateChanged { old, new } => {
                if !current {
                    debug!("{} stale state change {} -> {}", session, old, new);
                    return;
                }
                info!("{} state changed {} -> {}", session, old, new);
                if new == EngineState::Playing {
                    state.muted = false;
                    if !state.watchdog.is_armed() {
                        state.watchdog.arm();
                    }
                    self.drive_output(true);
                    self.status.publish(false);
                } else if old == EngineState::Playing {
                    state.muted = true;
                    self.drive_output(false);
                    state.watchdog.disarm();
                    self.status.publish(true);
                }
            }
            LifecycleEvent::EndOfStream => {
                if !current {
                    debug!("{} stale end of stream", session);
                    return;
                }
                info!("{} end of stream, restarting", session);
                state.supervisor.stop();
                state.supervisor.start();
            }
            LifecycleEvent::Error { message, debug: detail } => {
                error!(
                    "{} error: {} ({})",
                    session,
                    message,
                    detail.as_deref().unwrap_or("no debug info")
                );
                if current && self.restart_on_error && !state.muted {
                    info!("{} restarting after error", session);
                    state.supervisor.stop();
                    state.supervisor.start();
                }
            }
            LifecycleEvent::Warning { message, debug: detail } => {
                warn!(
                    "{} warning: {} ({})",
                    session,
                    message,
                    detail.as_deref().unwrap_or("no debug info")
                );
            }
        }
    }

    /// Restart the session if it should be playing and is not, then rearm.
    pub async fn on_watchdog_tick(&self, epoch: u64) {
        let mut state = self.state.lock().await;
        if !state.watchdog.is_current(epoch) {
            debug!("dropping stale watchdog tick {}", epoch);
            return;
        }
        if state.muted {
            state.watchdog.disarm();
            return;
        }
        if !state.supervisor.is_playing() {
            warn!(
                "watchdog: session {} while unmuted, restarting",
                state.supervisor.state().as_str()
            );
            state.supervisor.start();
        }
        state.watchdog.arm();
    }

    /// Disarm the watchdog and stop the session. The output is released
    /// when the controller is dropped.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.watchdog.disarm();
        state.supervisor.stop();
        if let Err(e) = self.output.reset() {
            warn!("{}", e);
        }
        info!("controller stopped");
    }

    fn drive_output(&self, active: bool) {
        let result = if active {
            self.output.set()
        } else {
            self.output.reset()
        };
        if let Err(e) = result {
            warn!("{}", e);
        }
    }
}
