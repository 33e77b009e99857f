//! PipelineSupervisor - owns the one media session.
//!
//! Each `start` launches a brand new session with the next [`SessionId`];
//! nothing is reused. Lifecycle events are fed back through
//! [`PipelineSupervisor::observe`], which keeps the session state current and
//! tells the caller whether the event still matters.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::engine::{
    EngineState, EventSender, LifecycleEvent, MediaEngine, PipelineDescription, SessionEvent,
    SessionHandle, SessionId,
};

/// Where the current session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Launched, not yet playing
    Unstarted,
    Playing,
    /// Stopped on request, or left playing on its own
    Stopped,
    /// Reported an error or never launched
    Errored,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unstarted => "unstarted",
            SessionState::Playing => "playing",
            SessionState::Stopped => "stopped",
            SessionState::Errored => "errored",
        }
    }
}

struct ActiveSession {
    id: SessionId,
    handle: Option<Box<dyn SessionHandle>>,
    state: SessionState,
    stop_issued: bool,
}

pub struct PipelineSupervisor {
    engine: Arc<dyn MediaEngine>,
    description: PipelineDescription,
    events: EventSender,
    next_id: u64,
    current: Option<ActiveSession>,
}

impl PipelineSupervisor {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        description: PipelineDescription,
        events: EventSender,
    ) -> Self {
        Self {
            engine,
            description,
            events,
            next_id: 0,
            current: None,
        }
    }

    pub fn description(&self) -> &PipelineDescription {
        &self.description
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.current.as_ref().map(|s| s.id)
    }

    /// State of the current session; `Unstarted` before the first start.
    pub fn state(&self) -> SessionState {
        self.current
            .as_ref()
            .map_or(SessionState::Unstarted, |s| s.state)
    }

    pub fn is_playing(&self) -> bool {
        self.state() == SessionState::Playing
    }

    /// Launch a fresh session, tearing down any previous one first.
    ///
    /// Launch failures are logged and leave an `Errored` session behind.
    pub fn start(&mut self) {
        self.stop();

        self.next_id += 1;
        let id = SessionId(self.next_id);

        let session = match self
            .engine
            .launch(&self.description, id, self.events.clone())
        {
            Ok(handle) => {
                info!("{} starting via {}", id, self.engine.name());
                ActiveSession {
                    id,
                    handle: Some(handle),
                    state: SessionState::Unstarted,
                    stop_issued: false,
                }
            }
            Err(e) => {
                error!("{} failed to launch: {}", id, e);
                ActiveSession {
                    id,
                    handle: None,
                    state: SessionState::Errored,
                    stop_issued: true,
                }
            }
        };
        self.current = Some(session);
    }

    /// Stop the current session. No-op without one or when already stopped.
    pub fn stop(&mut self) {
        let Some(session) = self.current.as_mut() else {
            return;
        };
        if session.stop_issued {
            debug!("{} already stopped", session.id);
            return;
        }

        session.stop_issued = true;
        if session.state != SessionState::Errored {
            session.state = SessionState::Stopped;
        }
        if let Some(handle) = session.handle.as_mut() {
            info!("{} stopping", session.id);
            handle.stop();
        }
    }

    /// Fold an event into the session state.
    ///
    /// Returns `false` when the event is stale: it came from a replaced
    /// session, or it claims playback or end-of-stream for a session that
    /// was already told to stop.
    pub fn observe(&mut self, event: &SessionEvent) -> bool {
        let Some(session) = self.current.as_mut().filter(|s| s.id == event.session) else {
            return false;
        };

        match &event.event {
            LifecycleEvent::StateChanged { new, .. } => {
                if session.stop_issued && *new == EngineState::Playing {
                    return false;
                }
                session.state = match (*new, session.state) {
                    (EngineState::Playing, _) => SessionState::Playing,
                    (_, SessionState::Playing) => SessionState::Stopped,
                    (_, state) => state,
                };
            }
            LifecycleEvent::EndOfStream => {
                if session.stop_issued {
                    return false;
                }
            }
            LifecycleEvent::Error { .. } => session.state = SessionState::Errored,
            LifecycleEvent::Warning { .. } => {}
        }
        true
    }
}
