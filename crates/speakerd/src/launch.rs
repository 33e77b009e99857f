//! GstLaunchEngine - pipelines as `gst-launch-1.0` child processes
//!
//! gst-launch reports what its pipeline bus sees as plain text:
//!
//! ```text
//! Setting pipeline to PAUSED ...
//! Setting pipeline to PLAYING ...
//! Got EOS from element "pipeline0".
//! ERROR: from element /GstPipeline:pipeline0/GstRTSPSrc:rtspsrc0: Could not open resource for reading and writing.
//! Additional debug info:
//! ../gst/rtsp/gstrtspsrc.c(8130): gst_rtspsrc_retrieve_sdp (): Failed to connect.
//! ```
//!
//! [`LaunchOutputParser`] turns those lines back into [`LifecycleEvent`]s.
//! Stopping a session kills the child; its exit is reported as a final
//! transition to `NULL`.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::engine::{
    EngineError, EngineState, EventSender, LifecycleEvent, MediaEngine, PipelineDescription,
    SessionEvent, SessionHandle, SessionId,
};

const STATE_PREFIX: &str = "Setting pipeline to ";
const EOS_PREFIX: &str = "Got EOS from element";
const ERROR_PREFIX: &str = "ERROR: ";
const WARNING_PREFIX: &str = "WARNING: ";
const DEBUG_MARKER: &str = "Additional debug info:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageKind {
    Error,
    Warning,
}

#[derive(Debug)]
struct PendingMessage {
    kind: MessageKind,
    message: String,
    awaiting_debug: bool,
}

impl PendingMessage {
    fn into_event(self, debug: Option<String>) -> LifecycleEvent {
        match self.kind {
            MessageKind::Error => LifecycleEvent::Error {
                message: self.message,
                debug,
            },
            MessageKind::Warning => LifecycleEvent::Warning {
                message: self.message,
                debug,
            },
        }
    }
}

/// Line-oriented parser for gst-launch output.
///
/// Errors and warnings are held back for one line in case gst-launch follows
/// them with debug detail.
#[derive(Debug)]
pub struct LaunchOutputParser {
    current: EngineState,
    pending: Option<PendingMessage>,
}

impl Default for LaunchOutputParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LaunchOutputParser {
    pub fn new() -> Self {
        Self {
            current: EngineState::Null,
            pending: None,
        }
    }

    /// Last state the pipeline was set to.
    pub fn current(&self) -> EngineState {
        self.current
    }

    pub fn feed(&mut self, line: &str) -> Vec<LifecycleEvent> {
        let line = line.trim_end();
        let mut events = Vec::new();

        if let Some(pending) = self.pending.take() {
            if pending.awaiting_debug {
                let detail = line.trim();
                let detail = (!detail.is_empty()).then(|| detail.to_string());
                events.push(pending.into_event(detail));
                return events;
            }
            if line.starts_with(DEBUG_MARKER) {
                self.pending = Some(PendingMessage {
                    awaiting_debug: true,
                    ..pending
                });
                return events;
            }
            events.push(pending.into_event(None));
        }

        if let Some(rest) = line.strip_prefix(STATE_PREFIX) {
            let name = rest.split_whitespace().next().unwrap_or_default();
            match EngineState::parse(name) {
                Some(new) if new != self.current => {
                    events.push(LifecycleEvent::StateChanged {
                        old: self.current,
                        new,
                    });
                    self.current = new;
                }
                Some(_) => {}
                None => trace!("unrecognised state in {:?}", line),
            }
        } else if line.starts_with(EOS_PREFIX) {
            events.push(LifecycleEvent::EndOfStream);
        } else if let Some(message) = line.strip_prefix(ERROR_PREFIX) {
            self.pending = Some(PendingMessage {
                kind: MessageKind::Error,
                message: message.trim().to_string(),
                awaiting_debug: false,
            });
        } else if let Some(message) = line.strip_prefix(WARNING_PREFIX) {
            self.pending = Some(PendingMessage {
                kind: MessageKind::Warning,
                message: message.trim().to_string(),
                awaiting_debug: false,
            });
        }

        events
    }

    /// The process is gone: flush anything held back and report the
    /// pipeline as torn down.
    pub fn finish(&mut self) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        if let Some(pending) = self.pending.take() {
            events.push(pending.into_event(None));
        }
        if self.current != EngineState::Null {
            events.push(LifecycleEvent::StateChanged {
                old: self.current,
                new: EngineState::Null,
            });
            self.current = EngineState::Null;
        }
        events
    }
}

/// Runs each session as `{program} {description tokens}`.
#[derive(Debug, Clone)]
pub struct GstLaunchEngine {
    program: String,
}

impl GstLaunchEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl MediaEngine for GstLaunchEngine {
    fn name(&self) -> &'static str {
        "gst-launch"
    }

    fn launch(
        &self,
        description: &PipelineDescription,
        session: SessionId,
        events: EventSender,
    ) -> Result<Box<dyn SessionHandle>, EngineError> {
        let child = Command::new(&self.program)
            .args(description.tokens())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        info!("{} launched {} (pid {:?})", session, self.program, child.id());

        let cancel = CancellationToken::new();
        tokio::spawn(watch_child(child, session, events, cancel.clone()));

        Ok(Box::new(LaunchHandle { session, cancel }))
    }
}

struct LaunchHandle {
    session: SessionId,
    cancel: CancellationToken,
}

impl SessionHandle for LaunchHandle {
    fn stop(&mut self) {
        debug!("stopping {}", self.session);
        self.cancel.cancel();
    }
}

impl Drop for LaunchHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn emit(events: &EventSender, session: SessionId, batch: Vec<LifecycleEvent>) {
    for event in batch {
        // Receiver gone means the daemon is shutting down
        let _ = events.send(SessionEvent::new(session, event));
    }
}

async fn watch_child(
    mut child: Child,
    session: SessionId,
    events: EventSender,
    cancel: CancellationToken,
) {
    let mut parser = LaunchOutputParser::new();

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        warn!("{} has no output pipes, killing it", session);
        if let Err(e) = child.kill().await {
            warn!("failed to kill {}: {}", session, e);
        }
        return;
    };

    let mut stdout = BufReader::new(stdout).lines();
    let mut stderr = BufReader::new(stderr).lines();
    let mut stdout_open = true;
    let mut stderr_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!("failed to kill {}: {}", session, e);
                }
                break;
            }
            line = stdout.next_line(), if stdout_open => match line {
                Ok(Some(line)) => {
                    trace!("{} stdout: {}", session, line);
                    emit(&events, session, parser.feed(&line));
                }
                Ok(None) => stdout_open = false,
                Err(e) => {
                    debug!("{} stdout read failed: {}", session, e);
                    stdout_open = false;
                }
            },
            line = stderr.next_line(), if stderr_open => match line {
                Ok(Some(line)) => {
                    trace!("{} stderr: {}", session, line);
                    emit(&events, session, parser.feed(&line));
                }
                Ok(None) => stderr_open = false,
                Err(e) => {
                    debug!("{} stderr read failed: {}", session, e);
                    stderr_open = false;
                }
            },
            status = child.wait(), if !stdout_open && !stderr_open => {
                match status {
                    Ok(status) => info!("{} exited: {}", session, status),
                    Err(e) => warn!("{} wait failed: {}", session, e),
                }
                break;
            }
        }
    }

    emit(&events, session, parser.finish());
}
