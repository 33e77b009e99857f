//! In-process GStreamer engine (`gstreamer` feature).
//!
//! Parses the description with `gst::parse::launch` and forwards messages
//! from the pipeline bus. Only state changes whose source is the pipeline
//! itself are reported; element-level transitions are noise.

use futures::StreamExt;
use gstreamer as gst;
use gstreamer::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{
    EngineError, EngineState, EventSender, LifecycleEvent, MediaEngine, PipelineDescription,
    SessionEvent, SessionHandle, SessionId,
};

fn engine_state(state: gst::State) -> Option<EngineState> {
    match state {
        gst::State::Null => Some(EngineState::Null),
        gst::State::Ready => Some(EngineState::Ready),
        gst::State::Paused => Some(EngineState::Paused),
        gst::State::Playing => Some(EngineState::Playing),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct GstEngine;

impl GstEngine {
    /// Initialise GStreamer once for the process.
    pub fn new() -> Result<Self, EngineError> {
        gst::init().map_err(|e| EngineError::Launch {
            message: format!("GStreamer init failed: {}", e),
        })?;
        Ok(Self)
    }
}

impl MediaEngine for GstEngine {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn launch(
        &self,
        description: &PipelineDescription,
        session: SessionId,
        events: EventSender,
    ) -> Result<Box<dyn SessionHandle>, EngineError> {
        let pipeline = gst::parse::launch(description.as_str()).map_err(|e| {
            EngineError::Launch {
                message: e.to_string(),
            }
        })?;
        let bus = pipeline.bus().ok_or_else(|| EngineError::Launch {
            message: "pipeline has no bus".to_string(),
        })?;

        let cancel = CancellationToken::new();
        tokio::spawn(forward_bus(
            pipeline.clone(),
            bus,
            session,
            events,
            cancel.clone(),
        ));

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            // The bus carries the reason as an error message
            warn!("{} failed to start playing: {}", session, e);
        }
        info!("{} launched in-process", session);

        Ok(Box::new(GstHandle { session, cancel }))
    }
}

struct GstHandle {
    session: SessionId,
    cancel: CancellationToken,
}

impl SessionHandle for GstHandle {
    fn stop(&mut self) {
        debug!("stopping {}", self.session);
        self.cancel.cancel();
    }
}

impl Drop for GstHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn forward_bus(
    pipeline: gst::Element,
    bus: gst::Bus,
    session: SessionId,
    events: EventSender,
    cancel: CancellationToken,
) {
    let mut messages = bus.stream();
    let mut current = EngineState::Null;
    let send = |event: LifecycleEvent| {
        let _ = events.send(SessionEvent::new(session, event));
    };

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = messages.next() => match message {
                Some(message) => message,
                None => break,
            },
        };

        match message.view() {
            gst::MessageView::StateChanged(change) => {
                if change.src() != Some(pipeline.upcast_ref::<gst::Object>()) {
                    continue;
                }
                if let (Some(old), Some(new)) =
                    (engine_state(change.old()), engine_state(change.current()))
                {
                    current = new;
                    send(LifecycleEvent::StateChanged { old, new });
                }
            }
            gst::MessageView::Eos(_) => send(LifecycleEvent::EndOfStream),
            gst::MessageView::Error(err) => send(LifecycleEvent::Error {
                message: err.error().to_string(),
                debug: err.debug().map(|d| d.to_string()),
            }),
            gst::MessageView::Warning(w) => send(LifecycleEvent::Warning {
                message: w.error().to_string(),
                debug: w.debug().map(|d| d.to_string()),
            }),
            _ => {}
        }
    }

    if let Err(e) = pipeline.set_state(gst::State::Null) {
        warn!("{} failed to reach NULL: {}", session, e);
    }
    if current != EngineState::Null {
        send(LifecycleEvent::StateChanged {
            old: current,
            new: EngineState::Null,
        });
    }
}
