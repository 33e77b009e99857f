//! End-to-end controller behaviour with a scripted engine, bus and output.
//!
//! The fake engine never runs anything: tests push lifecycle events for a
//! launched session by hand and then pump them through the controller, the
//! same way the daemon's lifecycle task does.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use pretty_assertions::assert_eq;
use speakerd::daemon::{run_bus, run_lifecycle, run_watchdog};
use speakerd::engine::{EngineError, EventReceiver, EventSender};
use speakerd::output::OutputError;
use speakerd::{
    ClientController, EngineState, LifecycleEvent, MediaEngine, OutputToggle, PipelineDescription,
    PipelineSupervisor, SessionEvent, SessionHandle, SessionId, SessionState, Watchdog,
    WatchdogTicks,
};
use speakerproto::{BusClient, BusError, BusEvent, Topics};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const PERIOD: Duration = Duration::from_secs(5);
const STATUS_TOPIC: &str = "snapcast/out/client/host1/mute";

// --- fakes ---

#[derive(Default)]
struct FakeBus {
    subscriptions: Mutex<Vec<String>>,
    published: Mutex<Vec<(String, String)>>,
}

impl FakeBus {
    fn payloads(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    fn clear(&self) {
        self.published.lock().unwrap().clear();
    }
}

impl BusClient for FakeBus {
    fn subscribe(&self, filter: &str) -> Result<(), BusError> {
        self.subscriptions.lock().unwrap().push(filter.to_string());
        Ok(())
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        self.published.lock().unwrap().push((
            topic.to_string(),
            String::from_utf8_lossy(payload).into_owned(),
        ));
        Ok(())
    }
}

#[derive(Default)]
struct FakeEngine {
    launched: Mutex<Vec<(SessionId, EventSender)>>,
    stopped: Arc<Mutex<Vec<SessionId>>>,
}

impl FakeEngine {
    fn launches(&self) -> Vec<SessionId> {
        self.launched.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }

    fn stops(&self) -> Vec<SessionId> {
        self.stopped.lock().unwrap().clone()
    }

    /// Report an event as if session `id` produced it.
    fn emit(&self, id: SessionId, event: LifecycleEvent) {
        let launched = self.launched.lock().unwrap();
        let (_, events) = launched
            .iter()
            .find(|(session, _)| *session == id)
            .expect("session was never launched");
        events.send(SessionEvent::new(id, event)).unwrap();
    }
}

struct FakeHandle {
    id: SessionId,
    stopped: Arc<Mutex<Vec<SessionId>>>,
}

impl SessionHandle for FakeHandle {
    fn stop(&mut self) {
        self.stopped.lock().unwrap().push(self.id);
    }
}

impl MediaEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn launch(
        &self,
        _description: &PipelineDescription,
        session: SessionId,
        events: EventSender,
    ) -> Result<Box<dyn SessionHandle>, EngineError> {
        self.launched.lock().unwrap().push((session, events));
        Ok(Box::new(FakeHandle {
            id: session,
            stopped: Arc::clone(&self.stopped),
        }))
    }
}

struct FakeOutput(Arc<Mutex<Vec<bool>>>);

impl OutputToggle for FakeOutput {
    fn set(&self) -> Result<(), OutputError> {
        self.0.lock().unwrap().push(true);
        Ok(())
    }

    fn reset(&self) -> Result<(), OutputError> {
        self.0.lock().unwrap().push(false);
        Ok(())
    }
}

// --- harness ---

struct Harness {
    controller: Arc<ClientController>,
    bus: Arc<FakeBus>,
    engine: Arc<FakeEngine>,
    output: Arc<Mutex<Vec<bool>>>,
    events: EventReceiver,
    ticks: Option<WatchdogTicks>,
}

impl Harness {
    fn new() -> Self {
        Self::with_restart_on_error(false)
    }

    fn with_restart_on_error(restart: bool) -> Self {
        let bus = Arc::new(FakeBus::default());
        let engine = Arc::new(FakeEngine::default());
        let output = Arc::new(Mutex::new(Vec::new()));

        let (tx, events) = mpsc::unbounded_channel();
        let supervisor = PipelineSupervisor::new(
            engine.clone(),
            PipelineDescription::new("rtspsrc ! alsasink"),
            tx,
        );
        let (watchdog, ticks) = Watchdog::new(PERIOD);

        let controller = ClientController::new(
            Topics::new("host1"),
            bus.clone(),
            supervisor,
            watchdog,
            Box::new(FakeOutput(Arc::clone(&output))),
        )
        .with_restart_on_error(restart);

        Self {
            controller: Arc::new(controller),
            bus,
            engine,
            output,
            events,
            ticks: Some(ticks),
        }
    }

    /// Deliver every queued lifecycle event to the controller.
    async fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.controller.on_lifecycle(event).await;
        }
    }

    async fn emit(&mut self, id: SessionId, event: LifecycleEvent) {
        self.engine.emit(id, event);
        self.pump().await;
    }

    async fn reach_playing(&mut self, id: SessionId) {
        self.emit(
            id,
            LifecycleEvent::StateChanged {
                old: EngineState::Null,
                new: EngineState::Paused,
            },
        )
        .await;
        self.emit(
            id,
            LifecycleEvent::StateChanged {
                old: EngineState::Paused,
                new: EngineState::Playing,
            },
        )
        .await;
    }

    /// Unmuted with session 1 playing, and no publishes recorded yet.
    async fn playing() -> Self {
        let mut h = Self::new();
        h.controller.set_mute(false).await;
        h.reach_playing(SessionId(1)).await;
        h.bus.clear();
        h.output.lock().unwrap().clear();
        h
    }

    fn spawn_watchdog(&mut self, cancel: &CancellationToken) {
        let ticks = self.ticks.take().expect("watchdog already running");
        tokio::spawn(run_watchdog(
            Arc::clone(&self.controller),
            ticks,
            cancel.clone(),
        ));
    }

    fn output(&self) -> Vec<bool> {
        self.output.lock().unwrap().clone()
    }
}

fn message(topic: &str, payload: &'static [u8]) -> BusEvent {
    BusEvent::Message {
        topic: topic.to_string(),
        payload: Bytes::from_static(payload),
    }
}

// --- scenarios ---

#[tokio::test]
async fn test_starts_muted_without_session() {
    let h = Harness::new();
    let snapshot = h.controller.snapshot().await;
    assert!(snapshot.muted);
    assert_eq!(snapshot.session, None);
    assert!(!snapshot.watchdog_armed);
}

#[tokio::test]
async fn test_connect_subscribes_then_publishes_status() {
    let h = Harness::new();
    h.controller.on_bus_event(BusEvent::Connected).await;

    assert_eq!(
        *h.bus.subscriptions.lock().unwrap(),
        vec!["snapcast/in/client/host1/#".to_string()]
    );
    assert_eq!(
        *h.bus.published.lock().unwrap(),
        vec![(STATUS_TOPIC.to_string(), "1".to_string())]
    );
}

#[tokio::test]
async fn test_reconnect_resubscribes_and_republishes_unmuted() {
    let h = Harness::playing().await;
    h.controller.on_bus_event(BusEvent::Connected).await;
    h.controller
        .on_bus_event(BusEvent::Disconnected {
            reason: "connection reset".to_string(),
        })
        .await;
    h.controller.on_bus_event(BusEvent::Connected).await;

    assert_eq!(
        *h.bus.subscriptions.lock().unwrap(),
        vec![
            "snapcast/in/client/host1/#".to_string(),
            "snapcast/in/client/host1/#".to_string(),
        ]
    );
    assert_eq!(
        *h.bus.published.lock().unwrap(),
        vec![
            (STATUS_TOPIC.to_string(), "0".to_string()),
            (STATUS_TOPIC.to_string(), "0".to_string()),
        ]
    );
    assert_eq!(h.engine.launches(), vec![SessionId(1)]);
}

#[tokio::test]
async fn test_unmute_then_playing_publishes_unmuted_and_sets_output() {
    let mut h = Harness::new();

    h.controller
        .on_bus_event(message("snapcast/in/client/host1/mute", b"0"))
        .await;
    assert_eq!(h.engine.launches(), vec![SessionId(1)]);
    assert_eq!(h.bus.payloads(), vec!["0"]);
    assert!(h.controller.snapshot().await.watchdog_armed);

    h.reach_playing(SessionId(1)).await;

    let snapshot = h.controller.snapshot().await;
    assert!(!snapshot.muted);
    assert_eq!(snapshot.session_state, SessionState::Playing);
    assert_eq!(h.bus.payloads(), vec!["0", "0"]);
    assert_eq!(h.output(), vec![true]);
}

#[tokio::test]
async fn test_mute_while_muted_only_republishes() {
    let h = Harness::new();

    h.controller.set_mute(true).await;
    h.controller.set_mute(true).await;

    assert!(h.engine.launches().is_empty());
    assert!(h.engine.stops().is_empty());
    assert_eq!(h.bus.payloads(), vec!["1", "1"]);
}

#[tokio::test]
async fn test_mute_stops_session_and_disarms_watchdog() {
    let mut h = Harness::playing().await;

    h.controller.set_mute(true).await;
    let snapshot = h.controller.snapshot().await;
    assert!(snapshot.muted);
    assert!(!snapshot.watchdog_armed);
    assert_eq!(h.engine.stops(), vec![SessionId(1)]);
    assert_eq!(h.bus.payloads(), vec!["1"]);

    // The engine confirms the teardown
    h.emit(
        SessionId(1),
        LifecycleEvent::StateChanged {
            old: EngineState::Playing,
            new: EngineState::Null,
        },
    )
    .await;
    assert!(h.controller.snapshot().await.muted);
    assert_eq!(h.bus.payloads(), vec!["1", "1"]);
    assert_eq!(h.output(), vec![false]);
}

#[tokio::test]
async fn test_unmute_while_playing_does_not_restart() {
    let h = Harness::playing().await;

    h.controller.set_mute(false).await;

    assert_eq!(h.engine.launches(), vec![SessionId(1)]);
    assert_eq!(h.bus.payloads(), vec!["0"]);
}

#[tokio::test]
async fn test_status_republishes_without_change() {
    let h = Harness::playing().await;
    let before = h.controller.snapshot().await;

    h.controller
        .on_bus_event(message("snapcast/in/client/host1/status", b"whatever"))
        .await;

    assert_eq!(h.controller.snapshot().await, before);
    assert_eq!(h.bus.payloads(), vec!["0"]);
}

#[tokio::test]
async fn test_last_mute_command_wins() {
    let mut h = Harness::new();
    for mute in [false, true, false, true, true, false] {
        h.controller.set_mute(mute).await;
    }
    h.pump().await;

    assert_eq!(h.bus.payloads().last().map(String::as_str), Some("0"));
    assert!(!h.controller.snapshot().await.muted);

    h.controller.set_mute(true).await;
    assert_eq!(h.bus.payloads().last().map(String::as_str), Some("1"));
    assert!(h.controller.snapshot().await.muted);
}

#[tokio::test]
async fn test_unknown_command_is_ignored() {
    let h = Harness::new();
    let before = h.controller.snapshot().await;

    h.controller
        .on_bus_event(message("snapcast/in/client/host1/unknown", b"1"))
        .await;
    h.controller
        .on_bus_event(message("snapcast/in/client/host1/mute", b"yes"))
        .await;

    assert_eq!(h.controller.snapshot().await, before);
    assert!(h.bus.payloads().is_empty());
    assert!(h.engine.launches().is_empty());
}

#[tokio::test]
async fn test_end_of_stream_restarts_once_without_publishing() {
    let mut h = Harness::playing().await;

    h.emit(SessionId(1), LifecycleEvent::EndOfStream).await;

    assert_eq!(h.engine.stops(), vec![SessionId(1)]);
    assert_eq!(h.engine.launches(), vec![SessionId(1), SessionId(2)]);
    assert!(h.bus.payloads().is_empty());

    // Teardown of the replaced session is stale
    h.emit(
        SessionId(1),
        LifecycleEvent::StateChanged {
            old: EngineState::Playing,
            new: EngineState::Null,
        },
    )
    .await;
    assert!(h.bus.payloads().is_empty());
    assert!(h.output().is_empty());
    assert!(!h.controller.snapshot().await.muted);
    assert_eq!(h.controller.snapshot().await.session, Some(SessionId(2)));
}

#[tokio::test]
async fn test_stale_playing_from_replaced_session_is_ignored() {
    let mut h = Harness::new();
    h.controller.set_mute(false).await;
    h.emit(SessionId(1), LifecycleEvent::EndOfStream).await;
    h.bus.clear();

    h.emit(
        SessionId(1),
        LifecycleEvent::StateChanged {
            old: EngineState::Paused,
            new: EngineState::Playing,
        },
    )
    .await;

    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.session, Some(SessionId(2)));
    assert_eq!(snapshot.session_state, SessionState::Unstarted);
    assert!(h.bus.payloads().is_empty());
}

#[tokio::test]
async fn test_leaving_playing_mutes_and_disarms() {
    let mut h = Harness::playing().await;

    h.emit(
        SessionId(1),
        LifecycleEvent::StateChanged {
            old: EngineState::Playing,
            new: EngineState::Paused,
        },
    )
    .await;

    let snapshot = h.controller.snapshot().await;
    assert!(snapshot.muted);
    assert!(!snapshot.watchdog_armed);
    assert_eq!(h.bus.payloads(), vec!["1"]);
    assert_eq!(h.output(), vec![false]);
}

#[tokio::test(start_paused = true)]
async fn test_returning_to_playing_rearms_watchdog() {
    let mut h = Harness::playing().await;
    let cancel = CancellationToken::new();
    h.spawn_watchdog(&cancel);

    h.emit(
        SessionId(1),
        LifecycleEvent::StateChanged {
            old: EngineState::Playing,
            new: EngineState::Paused,
        },
    )
    .await;
    h.emit(
        SessionId(1),
        LifecycleEvent::StateChanged {
            old: EngineState::Paused,
            new: EngineState::Playing,
        },
    )
    .await;

    let snapshot = h.controller.snapshot().await;
    assert!(!snapshot.muted);
    assert!(snapshot.watchdog_armed);

    // A later failure is picked up by the next tick
    h.emit(
        SessionId(1),
        LifecycleEvent::Error {
            message: "Could not read from resource.".to_string(),
            debug: None,
        },
    )
    .await;
    tokio::time::sleep(PERIOD + Duration::from_millis(100)).await;

    assert_eq!(h.engine.launches(), vec![SessionId(1), SessionId(2)]);
    assert!(h.controller.snapshot().await.watchdog_armed);

    cancel.cancel();
}

#[tokio::test]
async fn test_error_is_logged_only_by_default() {
    let mut h = Harness::playing().await;

    h.emit(
        SessionId(1),
        LifecycleEvent::Error {
            message: "Could not read from resource.".to_string(),
            debug: None,
        },
    )
    .await;

    assert_eq!(h.engine.launches(), vec![SessionId(1)]);
    assert!(h.engine.stops().is_empty());
    assert!(h.bus.payloads().is_empty());
    assert_eq!(
        h.controller.snapshot().await.session_state,
        SessionState::Errored
    );
}

#[tokio::test]
async fn test_error_restarts_when_enabled() {
    let mut h = Harness::with_restart_on_error(true);
    h.controller.set_mute(false).await;
    h.reach_playing(SessionId(1)).await;

    h.emit(
        SessionId(1),
        LifecycleEvent::Error {
            message: "Internal data stream error.".to_string(),
            debug: Some("streaming stopped, reason error (-5)".to_string()),
        },
    )
    .await;

    assert_eq!(h.engine.stops(), vec![SessionId(1)]);
    assert_eq!(h.engine.launches(), vec![SessionId(1), SessionId(2)]);
}

#[tokio::test]
async fn test_warning_changes_nothing() {
    let mut h = Harness::playing().await;
    let before = h.controller.snapshot().await;

    h.emit(
        SessionId(1),
        LifecycleEvent::Warning {
            message: "Can't record audio fast enough".to_string(),
            debug: None,
        },
    )
    .await;

    assert_eq!(h.controller.snapshot().await, before);
    assert!(h.bus.payloads().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_restarts_stalled_session_once_per_period() {
    let mut h = Harness::new();
    let cancel = CancellationToken::new();
    h.spawn_watchdog(&cancel);

    h.controller.set_mute(false).await;
    assert_eq!(h.engine.launches().len(), 1);

    tokio::time::sleep(PERIOD + Duration::from_millis(100)).await;
    assert_eq!(h.engine.launches().len(), 2);
    assert!(h.controller.snapshot().await.watchdog_armed);

    tokio::time::sleep(PERIOD).await;
    assert_eq!(h.engine.launches().len(), 3);

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_leaves_playing_session_alone() {
    let mut h = Harness::playing().await;
    let cancel = CancellationToken::new();
    h.spawn_watchdog(&cancel);

    // Rearm so the timer task sees a fresh period
    h.controller.set_mute(false).await;
    tokio::time::sleep(PERIOD * 3).await;

    assert_eq!(h.engine.launches(), vec![SessionId(1)]);
    assert!(h.controller.snapshot().await.watchdog_armed);

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_mute_stops_watchdog() {
    let mut h = Harness::new();
    let cancel = CancellationToken::new();
    h.spawn_watchdog(&cancel);

    h.controller.set_mute(false).await;
    h.controller.set_mute(true).await;
    assert!(!h.controller.snapshot().await.watchdog_armed);

    tokio::time::sleep(PERIOD * 3).await;
    assert_eq!(h.engine.launches(), vec![SessionId(1)]);

    cancel.cancel();
}

#[tokio::test]
async fn test_stale_watchdog_tick_is_dropped() {
    let h = Harness::new();
    h.controller.set_mute(false).await;

    // Epoch 1 belonged to the first arm; muting and unmuting moved past it
    h.controller.set_mute(true).await;
    h.controller.set_mute(false).await;
    h.controller.on_watchdog_tick(1).await;

    assert_eq!(h.engine.launches().len(), 2);
}

#[tokio::test]
async fn test_shutdown_stops_session_and_watchdog() {
    let h = Harness::playing().await;

    h.controller.shutdown().await;

    let snapshot = h.controller.snapshot().await;
    assert!(!snapshot.watchdog_armed);
    assert_eq!(snapshot.session_state, SessionState::Stopped);
    assert_eq!(h.engine.stops(), vec![SessionId(1)]);
    assert_eq!(h.output(), vec![false]);
}

#[tokio::test]
async fn test_bus_task_dispatches_until_stream_ends() {
    let h = Harness::new();
    let events = futures::stream::iter(vec![
        BusEvent::Connected,
        message("snapcast/in/client/host1/mute", b"0"),
        BusEvent::Disconnected {
            reason: "connection reset".to_string(),
        },
    ]);

    run_bus(Arc::clone(&h.controller), events, CancellationToken::new()).await;

    assert_eq!(h.bus.payloads(), vec!["1", "0"]);
    assert_eq!(h.engine.launches(), vec![SessionId(1)]);
}

#[tokio::test]
async fn test_lifecycle_task_feeds_controller_until_cancelled() {
    let mut h = Harness::new();
    h.controller.set_mute(false).await;

    let (_, idle) = mpsc::unbounded_channel();
    let events = std::mem::replace(&mut h.events, idle);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_lifecycle(
        Arc::clone(&h.controller),
        events,
        cancel.clone(),
    ));

    h.engine.emit(
        SessionId(1),
        LifecycleEvent::StateChanged {
            old: EngineState::Paused,
            new: EngineState::Playing,
        },
    );
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.controller.snapshot().await.session_state != SessionState::Playing {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    task.await.unwrap();
    assert_eq!(h.output(), vec![true]);
}
