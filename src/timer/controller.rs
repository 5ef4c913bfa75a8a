use std::{io, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::{self, JoinHandle},
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    audio::AlertPlayer,
    error::LaunchError,
    launcher::{LaunchOutcome, ProcessLauncher},
    sensing::WindowInspector,
    settings::Settings,
};

use super::{
    schedule::{build_schedule, PhaseKind},
    state::{CycleState, CycleStatus, Effect, Tuning},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CycleSnapshot {
    pub cycle_id: Option<String>,
    pub status: CycleStatus,
    pub phase_index: usize,
    pub phase_count: usize,
    pub phase_kind: Option<PhaseKind>,
    pub phase_label: Option<String>,
    pub target_title: Option<String>,
    pub phase_remaining_secs: u64,
    pub focus_lost_secs: u64,
    pub alert_stage: u8,
    pub started_at: Option<DateTime<Utc>>,
}

impl From<&CycleState> for CycleSnapshot {
    fn from(state: &CycleState) -> Self {
        let phase = state.current_phase();
        Self {
            cycle_id: state.cycle_id().map(str::to_string),
            status: state.status(),
            phase_index: state.phase_index(),
            phase_count: state.schedule().len(),
            phase_kind: phase.map(|p| p.kind),
            phase_label: phase.map(|p| p.label()),
            target_title: phase.map(|p| p.target_title.clone()),
            phase_remaining_secs: state.phase_remaining_secs(),
            focus_lost_secs: state.focus_lost_secs(),
            alert_stage: state.alert_stage(),
            started_at: state.started_at(),
        }
    }
}

/// Advisory notifications for the presentation layer.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum CycleEvent {
    PhaseStarted {
        index: usize,
        label: String,
        duration_secs: u64,
    },
    LaunchSucceeded {
        path: String,
        pid: u32,
        already_running: bool,
    },
    LaunchFailed {
        path: String,
        reason: String,
    },
    StageEscalated {
        stage: u8,
    },
    FocusRegained,
    Paused,
    Resumed,
    Completed,
    Cancelled,
}

/// The OS-facing pieces the controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub inspector: Arc<dyn WindowInspector>,
    pub player: Arc<dyn AlertPlayer>,
    pub launcher: Arc<dyn ProcessLauncher>,
}

#[derive(Clone)]
pub struct CycleController {
    state: Arc<Mutex<CycleState>>,
    deps: Collaborators,
    ticker: Arc<Mutex<Option<(JoinHandle<()>, CancellationToken)>>>,
    snapshot_tx: Arc<watch::Sender<CycleSnapshot>>,
    events_tx: broadcast::Sender<CycleEvent>,
}

impl CycleController {
    pub fn new(deps: Collaborators) -> Self {
        let state = CycleState::new();
        let (snapshot_tx, _) = watch::channel(CycleSnapshot::from(&state));
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);

        Self {
            state: Arc::new(Mutex::new(state)),
            deps,
            ticker: Arc::new(Mutex::new(None)),
            snapshot_tx: Arc::new(snapshot_tx),
            events_tx,
        }
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<CycleSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CycleEvent> {
        self.events_tx.subscribe()
    }

    pub async fn get_snapshot(&self) -> CycleSnapshot {
        CycleSnapshot::from(&*self.state.lock().await)
    }

    /// Starts a new cycle from a snapshot of `settings`; later edits do not affect it.
    pub async fn start(&self, settings: &Settings) -> Result<CycleSnapshot> {
        let tuning = Tuning::from(&settings.enforcement);

        let (effects, snapshot) = {
            let mut state = self.state.lock().await;
            let effects = state.begin(
                Uuid::new_v4().to_string(),
                build_schedule(settings),
                tuning,
                Utc::now(),
            )?;
            (effects, CycleSnapshot::from(&*state))
        };

        log_info!(
            "Cycle {} started ({} phases)",
            snapshot.cycle_id.as_deref().unwrap_or("?"),
            snapshot.phase_count
        );

        self.deps.player.configure(&settings.sounds.stage_sounds());
        self.apply(effects).await;
        self.spawn_ticker(Duration::from_secs(tuning.tick_secs)).await;
        self.publish(snapshot.clone());

        Ok(snapshot)
    }

    pub async fn pause(&self) -> Result<CycleSnapshot> {
        let (effects, snapshot) = {
            let mut state = self.state.lock().await;
            let effects = state.pause()?;
            (effects, CycleSnapshot::from(&*state))
        };

        self.apply(effects).await;
        self.emit(CycleEvent::Paused);
        self.publish(snapshot.clone());
        Ok(snapshot)
    }

    pub async fn resume(&self) -> Result<CycleSnapshot> {
        let (effects, snapshot) = {
            let mut state = self.state.lock().await;
            let effects = state.resume()?;
            (effects, CycleSnapshot::from(&*state))
        };

        self.apply(effects).await;
        self.emit(CycleEvent::Resumed);
        self.publish(snapshot.clone());
        Ok(snapshot)
    }

    /// Cancels the cycle from any state, silencing alerts before returning.
    pub async fn stop(&self) -> Result<CycleSnapshot> {
        let (effects, was_active, snapshot) = {
            let mut state = self.state.lock().await;
            let was_active = state.status().is_active();
            let effects = state.stop();
            (effects, was_active, CycleSnapshot::from(&*state))
        };

        self.cancel_ticker().await?;
        self.apply(effects).await;
        if was_active {
            log_info!("Cycle cancelled");
            self.emit(CycleEvent::Cancelled);
        }
        self.publish(snapshot.clone());
        Ok(snapshot)
    }

    /// Runs one tick. Returns false once there is nothing left to tick.
    pub async fn tick_once(&self) -> bool {
        let (effects, watched_phase) = {
            let mut state = self.state.lock().await;
            match state.status() {
                CycleStatus::Running => {}
                CycleStatus::Paused => return true,
                CycleStatus::Idle | CycleStatus::Completed => return false,
            }

            let effects = state.advance_clock();
            let watched_phase = match state.current_phase() {
                Some(phase) if state.status() == CycleStatus::Running && phase.is_enforced() => {
                    Some(state.phase_index())
                }
                _ => None,
            };
            (effects, watched_phase)
        };
        self.apply(effects).await;

        if let Some(index) = watched_phase {
            let title = self.probe_window().await;
            let effects = {
                let mut state = self.state.lock().await;
                // A command may have landed while the window was being probed.
                if state.status() == CycleStatus::Running && state.phase_index() == index {
                    state.observe(title.as_deref())
                } else {
                    Vec::new()
                }
            };
            self.apply(effects).await;
        }

        let snapshot = self.get_snapshot().await;
        let keep_going = snapshot.status.is_active();
        self.publish(snapshot);
        keep_going
    }

    async fn spawn_ticker(&self, tick_interval: Duration) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some((handle, token)) = ticker_guard.take() {
            token.cancel();
            handle.abort();
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let controller = self.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + tick_interval, tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !controller.tick_once().await {
                            log_info!("cycle ticker finished");
                            break;
                        }
                    }
                    _ = cancelled.cancelled() => {
                        log_info!("cycle ticker shutting down");
                        break;
                    }
                }
            }
        });

        *ticker_guard = Some((handle, token));
    }

    async fn cancel_ticker(&self) -> Result<()> {
        let ticker = self.ticker.lock().await.take();
        if let Some((handle, token)) = ticker {
            token.cancel();
            match handle.await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {}
                Err(err) => return Err(anyhow!("cycle ticker task failed to join: {err}")),
            }
        }
        Ok(())
    }

    /// Window probing spawns processes, so it runs on the blocking pool.
    /// The probe bounds its own run time.
    async fn probe_window(&self) -> Option<String> {
        let inspector = Arc::clone(&self.deps.inspector);
        match task::spawn_blocking(move || inspector.active_window_title()).await {
            Ok(title) => title,
            Err(err) => {
                log_warn!("Window probe worker failed: {}", err);
                None
            }
        }
    }

    async fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::PhaseStarted {
                    index,
                    label,
                    duration_secs,
                } => {
                    log_info!("Phase {} started: {} ({}s)", index + 1, label, duration_secs);
                    self.emit(CycleEvent::PhaseStarted {
                        index,
                        label,
                        duration_secs,
                    });
                }
                Effect::Launch { path } => self.launch(path).await,
                Effect::PlayAlert(stage) => self.deps.player.play(stage),
                Effect::StopAlerts => self.deps.player.stop_all(),
                Effect::StageEscalated(stage) => {
                    log_warn!("Focus lost, alert stage {}", stage);
                    self.emit(CycleEvent::StageEscalated { stage });
                }
                Effect::FocusRegained => self.emit(CycleEvent::FocusRegained),
                Effect::Completed => {
                    log_info!("All cycles complete");
                    self.emit(CycleEvent::Completed);
                }
            }
        }
    }

    async fn launch(&self, path: String) {
        let launcher = Arc::clone(&self.deps.launcher);
        let target = path.clone();
        let result = task::spawn_blocking(move || launcher.launch(&target))
            .await
            .unwrap_or_else(|err| {
                Err(LaunchError::Spawn {
                    path: PathBuf::from(&path),
                    source: io::Error::other(err.to_string()),
                })
            });

        match result {
            Ok(outcome) => self.emit(CycleEvent::LaunchSucceeded {
                pid: outcome.pid(),
                already_running: matches!(outcome, LaunchOutcome::AlreadyRunning(_)),
                path,
            }),
            Err(err) => {
                log_warn!("Could not launch '{}': {}", path, err);
                self.emit(CycleEvent::LaunchFailed {
                    path,
                    reason: err.to_string(),
                });
            }
        }
    }

    fn emit(&self, event: CycleEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.events_tx.send(event);
    }

    fn publish(&self, snapshot: CycleSnapshot) {
        self.snapshot_tx.send_replace(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Mutex as StdMutex,
    };

    struct ScriptedInspector {
        title: StdMutex<Option<String>>,
    }

    impl ScriptedInspector {
        fn constant(title: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                title: StdMutex::new(title.map(str::to_string)),
            })
        }

        fn set(&self, title: Option<&str>) {
            *self.title.lock().unwrap() = title.map(str::to_string);
        }
    }

    impl WindowInspector for ScriptedInspector {
        fn active_window_title(&self) -> Option<String> {
            self.title.lock().unwrap().clone()
        }
    }

    /// Blocks the calling thread until the test opens the gate.
    struct GatedInspector {
        gate: StdMutex<mpsc::Receiver<()>>,
        opened: AtomicBool,
    }

    impl WindowInspector for GatedInspector {
        fn active_window_title(&self) -> Option<String> {
            let opened = self
                .gate
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .is_ok();
            self.opened.store(opened, Ordering::SeqCst);
            opened.then(|| "Solitaire".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingPlayer {
        calls: StdMutex<Vec<String>>,
    }

    impl RecordingPlayer {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl AlertPlayer for RecordingPlayer {
        fn configure(&self, sounds: &crate::settings::StageSounds) {
            let configured = sounds.iter().filter(|s| s.is_some()).count();
            self.calls
                .lock()
                .unwrap()
                .push(format!("configure:{configured}"));
        }

        fn play(&self, stage: u8) {
            self.calls.lock().unwrap().push(format!("play:{stage}"));
        }

        fn stop_all(&self) {
            self.calls.lock().unwrap().push("stop".into());
        }
    }

    #[derive(Default)]
    struct FakeLauncher {
        fail: bool,
        launched: StdMutex<Vec<String>>,
    }

    impl ProcessLauncher for FakeLauncher {
        fn launch(&self, path: &str) -> Result<LaunchOutcome, LaunchError> {
            self.launched.lock().unwrap().push(path.to_string());
            if self.fail {
                Err(LaunchError::NotFound(path.into()))
            } else {
                Ok(LaunchOutcome::Spawned(4242))
            }
        }
    }

    struct Harness {
        controller: CycleController,
        inspector: Arc<ScriptedInspector>,
        player: Arc<RecordingPlayer>,
        launcher: Arc<FakeLauncher>,
    }

    fn harness(title: Option<&str>, launch_fails: bool) -> Harness {
        let inspector = ScriptedInspector::constant(title);
        let player = Arc::new(RecordingPlayer::default());
        let launcher = Arc::new(FakeLauncher {
            fail: launch_fails,
            ..FakeLauncher::default()
        });
        let controller = CycleController::new(Collaborators {
            inspector: inspector.clone(),
            player: player.clone(),
            launcher: launcher.clone(),
        });
        Harness {
            controller,
            inspector,
            player,
            launcher,
        }
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.apps.game_path = "/usr/games/sol".into();
        settings.apps.game_title = "Solitaire".into();
        settings.apps.study_app_path = "/usr/bin/anki".into();
        settings.apps.study_app_title = "Anki".into();
        settings.sounds.stage_2 = Some("/tmp/siren.wav".into());
        settings.enforcement.launch_grace_secs = 0;
        settings
    }

    fn drain(rx: &mut broadcast::Receiver<CycleEvent>) -> Vec<CycleEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn start_launches_first_phase_and_reports_it() {
        let h = harness(Some("Solitaire"), false);
        let mut events = h.controller.subscribe_events();

        let snapshot = h.controller.start(&settings()).await.unwrap();
        assert_eq!(snapshot.status, CycleStatus::Running);
        assert_eq!(snapshot.phase_label.as_deref(), Some("Game Time (1/4)"));
        assert_eq!(snapshot.phase_count, 8);
        assert_eq!(snapshot.phase_remaining_secs, 25 * 60);
        assert!(snapshot.cycle_id.is_some());

        assert_eq!(*h.launcher.launched.lock().unwrap(), vec!["/usr/games/sol"]);
        assert_eq!(h.player.calls(), vec!["configure:1"]);

        let events = drain(&mut events);
        assert!(matches!(events[0], CycleEvent::PhaseStarted { index: 0, .. }));
        assert_eq!(
            events[1],
            CycleEvent::LaunchSucceeded {
                path: "/usr/games/sol".into(),
                pid: 4242,
                already_running: false
            }
        );

        assert!(h.controller.start(&settings()).await.is_err());
        h.controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn escalates_and_resets_through_ticks() {
        let h = harness(Some("Terminal"), false);
        h.controller.start(&settings()).await.unwrap();
        h.controller.cancel_ticker().await.unwrap();

        for _ in 0..20 {
            assert!(h.controller.tick_once().await);
        }
        let snapshot = h.controller.get_snapshot().await;
        assert_eq!(snapshot.alert_stage, 2);
        assert_eq!(snapshot.focus_lost_secs, 20);
        assert_eq!(
            h.player.calls(),
            vec!["configure:1", "play:0", "play:1", "play:2"]
        );

        h.inspector.set(None);
        h.controller.tick_once().await;
        assert_eq!(h.controller.get_snapshot().await.alert_stage, 2);

        h.inspector.set(Some("Solitaire - Free Cell"));
        h.controller.tick_once().await;
        let snapshot = h.controller.get_snapshot().await;
        assert_eq!(snapshot.alert_stage, 0);
        assert_eq!(snapshot.focus_lost_secs, 0);
        assert_eq!(h.player.calls().last().map(String::as_str), Some("stop"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_ticking_and_audio() {
        let h = harness(Some("Terminal"), false);
        let mut events = h.controller.subscribe_events();
        h.controller.start(&settings()).await.unwrap();

        time::sleep(Duration::from_millis(45_500)).await;
        assert_eq!(h.controller.get_snapshot().await.alert_stage, 4);

        let snapshot = h.controller.stop().await.unwrap();
        assert_eq!(snapshot.status, CycleStatus::Idle);
        assert_eq!(h.player.calls().last().map(String::as_str), Some("stop"));
        assert!(drain(&mut events).contains(&CycleEvent::Cancelled));

        let calls = h.player.calls().len();
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.player.calls().len(), calls);
        assert!(!h.controller.tick_once().await);
    }

    #[tokio::test(start_paused = true)]
    async fn launch_failure_does_not_abort_the_cycle() {
        let h = harness(Some("Terminal"), true);
        let mut events = h.controller.subscribe_events();
        h.controller.start(&settings()).await.unwrap();

        let events = drain(&mut events);
        assert!(events
            .iter()
            .any(|e| matches!(e, CycleEvent::LaunchFailed { path, .. } if path == "/usr/games/sol")));

        time::sleep(Duration::from_millis(10_500)).await;
        let snapshot = h.controller.get_snapshot().await;
        assert_eq!(snapshot.status, CycleStatus::Running);
        assert_eq!(snapshot.alert_stage, 1);
        h.controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_time_and_resume_continues() {
        let h = harness(Some("Solitaire"), false);
        h.controller.start(&settings()).await.unwrap();

        time::sleep(Duration::from_millis(5_500)).await;
        let paused = h.controller.pause().await.unwrap();
        assert_eq!(paused.status, CycleStatus::Paused);
        assert_eq!(paused.phase_remaining_secs, 25 * 60 - 5);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(
            h.controller.get_snapshot().await.phase_remaining_secs,
            25 * 60 - 5
        );
        assert!(h.controller.pause().await.is_err());

        h.controller.resume().await.unwrap();
        time::sleep(Duration::from_secs(3)).await;
        assert!(h.controller.get_snapshot().await.phase_remaining_secs < 25 * 60 - 5);
        h.controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn runs_degenerate_schedule_to_completion() {
        let h = harness(Some("Solitaire Anki"), false);
        let mut events = h.controller.subscribe_events();
        let mut settings = settings();
        settings.durations.game_min = 0;
        settings.durations.short_study_min = 0;
        settings.durations.long_study_min = 0;

        let mut snapshots = h.controller.subscribe_snapshots();
        h.controller.start(&settings).await.unwrap();
        let finished = loop {
            snapshots.changed().await.unwrap();
            let snapshot = snapshots.borrow_and_update().clone();
            if !snapshot.status.is_active() {
                break snapshot;
            }
        };

        assert_eq!(finished.status, CycleStatus::Completed);
        assert_eq!(h.launcher.launched.lock().unwrap().len(), 8);
        let events = drain(&mut events);
        assert_eq!(events.last(), Some(&CycleEvent::Completed));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, CycleEvent::PhaseStarted { .. }))
                .count(),
            8
        );

        h.controller.start(&settings).await.unwrap();
        h.controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn window_probe_runs_off_the_async_thread() {
        let (open_gate, gate) = mpsc::channel();
        let inspector = Arc::new(GatedInspector {
            gate: StdMutex::new(gate),
            opened: AtomicBool::new(false),
        });
        let controller = CycleController::new(Collaborators {
            inspector: inspector.clone(),
            player: Arc::new(RecordingPlayer::default()),
            launcher: Arc::new(FakeLauncher::default()),
        });
        controller.start(&settings()).await.unwrap();
        controller.cancel_ticker().await.unwrap();

        // On a single-threaded runtime the gate can only open if the probe
        // is not holding the runtime thread.
        let (ticked, ()) = tokio::join!(controller.tick_once(), async {
            time::sleep(Duration::from_millis(20)).await;
            open_gate.send(()).unwrap();
        });

        assert!(ticked);
        assert!(inspector.opened.load(Ordering::SeqCst));
        assert_eq!(controller.get_snapshot().await.focus_lost_secs, 0);
        controller.stop().await.unwrap();
    }
}
