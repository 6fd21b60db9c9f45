use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::controller::{ControllerUpdate, PollingController};
use super::shutdown::ShutdownGuard;
use crate::alert::{AlertState, OnsetDetector};
use crate::analysis::Analyst;
use crate::config::MonitorCfg;
use crate::history::HistoricalProvider;
use crate::sound::SoundNotifier;
use crate::types::{ConnectionStatus, SensorReading, SoundType, Thresholds};

/// Requests a front end can send to a running [`Monitor`].
#[derive(Debug)]
pub enum Command {
    ConnectMock,
    /// `None` uses the configured default address.
    ConnectDevice(Option<String>),
    Disconnect,
    SetThresholds(Thresholds),
    /// Assess the current reading. Replies with the fallback text when there
    /// is no reading or the service fails.
    Analyze(oneshot::Sender<String>),
    /// One day of historical readings; empty on failure.
    QueryHistory(NaiveDate, oneshot::Sender<Vec<SensorReading>>),
    /// Play a pattern once regardless of alerts or the sound toggle.
    PreviewSound(SoundType),
    Shutdown,
}

/// Snapshot published after every change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardStatus {
    pub connection: ConnectionStatus,
    pub current: Option<SensorReading>,
    pub alerts: AlertState,
    pub thresholds: Thresholds,
    pub history: Vec<SensorReading>,
    /// Alert onsets seen this session.
    pub onsets: u64,
    pub last_error: Option<String>,
}

/// Session actor: owns the polling controller, alert edge state, sound
/// output, analysis client and historical provider, and applies commands and
/// poll events one at a time.
///
/// Not `Send` (the audio output is thread-bound); run it on the task that
/// created it.
pub struct Monitor {
    cfg: Arc<MonitorCfg>,
    controller: PollingController,
    thresholds: Thresholds,
    onset: OnsetDetector,
    alerts: AlertState,
    onsets: u64,
    last_error: Option<String>,
    notifier: SoundNotifier,
    analyst: Analyst,
    archive: HistoricalProvider,
    shutdown: ShutdownGuard,
    status_tx: watch::Sender<DashboardStatus>,
}

impl Monitor {
    pub fn new(
        cfg: Arc<MonitorCfg>,
        analyst: Analyst,
        notifier: SoundNotifier,
    ) -> (Self, watch::Receiver<DashboardStatus>) {
        let thresholds = cfg.thresholds();
        let (status_tx, status_rx) = watch::channel(DashboardStatus {
            thresholds,
            ..DashboardStatus::default()
        });
        let monitor = Self {
            controller: PollingController::new(Arc::clone(&cfg)),
            archive: HistoricalProvider::new(cfg.history_query_latency()),
            cfg,
            thresholds,
            onset: OnsetDetector::new(),
            alerts: AlertState::default(),
            onsets: 0,
            last_error: None,
            notifier,
            analyst,
            shutdown: ShutdownGuard::new(),
            status_tx,
        };
        (monitor, status_rx)
    }

    /// Reproducible simulated and historical data.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.controller = PollingController::new(Arc::clone(&self.cfg)).with_sim_seed(seed);
        self.archive = self.archive.with_seed(seed);
        self
    }

    /// Token that ends [`run`](Self::run) when cancelled.
    pub fn token(&self) -> CancellationToken {
        self.shutdown.token()
    }

    /// Actor loop. Returns after `Shutdown`, token cancellation, or once every
    /// command sender is gone. Always tears down before returning.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) {
        self.shutdown.spawn_signal_listener();
        let token = self.shutdown.token();
        tracing::info!(poll_interval_ms = self.cfg.poll_interval_ms, "monitor started");

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => None,
                cmd = commands.recv() => cmd.map(Step::Command),
                update = self.controller.next_update() => Some(Step::Update(update)),
            };
            match next {
                Some(Step::Command(Command::Shutdown)) | None => break,
                Some(Step::Command(cmd)) => self.handle(cmd),
                Some(Step::Update(update)) => self.on_update(update),
            }
        }

        self.teardown();
    }

    /// Apply one command. `Shutdown` only tears down; use [`run`](Self::run)
    /// to stop the loop.
    pub fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::ConnectMock => {
                self.last_error = None;
                self.controller.connect_mock();
            }
            Command::ConnectDevice(address) => {
                self.last_error = None;
                self.controller.connect_device(address.as_deref());
            }
            Command::Disconnect => self.controller.disconnect(),
            Command::SetThresholds(t) => self.set_thresholds(t),
            Command::Analyze(reply) => self.spawn_analysis(reply),
            Command::QueryHistory(date, reply) => self.spawn_history_query(date, reply),
            Command::PreviewSound(sound) => {
                self.notifier.play(sound);
            }
            Command::Shutdown => self.teardown(),
        }
        self.publish();
    }

    /// Wait for the next poll update from the live session and apply it.
    pub async fn pump(&mut self) {
        let update = self.controller.next_update().await;
        self.on_update(update);
    }

    /// Cancel polling and release the audio output. Idempotent.
    pub fn teardown(&mut self) {
        self.controller.disconnect();
        self.notifier.release();
        self.shutdown.trigger();
        self.publish();
        tracing::info!(onsets = self.onsets, "monitor stopped");
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn controller(&self) -> &PollingController {
        &self.controller
    }

    pub fn alerts(&self) -> AlertState {
        self.alerts
    }

    pub fn onsets(&self) -> u64 {
        self.onsets
    }

    pub fn notifier(&self) -> &SoundNotifier {
        &self.notifier
    }

    fn on_update(&mut self, update: ControllerUpdate) {
        match update {
            ControllerUpdate::Status(_) => {}
            ControllerUpdate::Reading(_) => self.evaluate(),
            ControllerUpdate::Failed(error) => self.last_error = Some(error.to_string()),
        }
        self.publish();
    }

    fn set_thresholds(&mut self, thresholds: Thresholds) {
        tracing::info!(
            temp_min = thresholds.temp_min,
            temp_max = thresholds.temp_max,
            humid_min = thresholds.humid_min,
            humid_max = thresholds.humid_max,
            sound_enabled = thresholds.sound_enabled,
            sound_type = %thresholds.sound_type,
            "thresholds updated"
        );
        self.thresholds = thresholds;
        self.evaluate();
    }

    /// Recompute alert flags for the current reading and fire the notifier on
    /// onset.
    fn evaluate(&mut self) {
        self.alerts = AlertState::evaluate(self.controller.current(), &self.thresholds);
        if self.onset.observe(self.alerts.has_any()) {
            self.onsets += 1;
            tracing::info!(
                temp = self.alerts.is_temp_alert,
                humid = self.alerts.is_humid_alert,
                "alert onset"
            );
            self.notifier.on_alert_onset(&self.thresholds);
        }
    }

    fn spawn_analysis(&self, reply: oneshot::Sender<String>) {
        let analyst = self.analyst.clone();
        let thresholds = self.thresholds;
        let current = self.controller.current().copied();
        tracing::debug!(live = self.controller.status().is_connected(), "analysis requested");
        tokio::spawn(async move {
            let text = match current {
                Some(reading) => analyst.analyze(&reading, &thresholds).await,
                None => {
                    tracing::debug!("analysis requested without a reading");
                    crate::analysis::ANALYSIS_FALLBACK.to_owned()
                }
            };
            let _ = reply.send(text);
        });
    }

    fn spawn_history_query(&self, date: NaiveDate, reply: oneshot::Sender<Vec<SensorReading>>) {
        let archive = self.archive.clone();
        let deadline = self.cfg.history_query_timeout();
        tokio::spawn(async move {
            let points = match archive.fetch_within(date, deadline).await {
                Ok(points) => points,
                Err(e) => {
                    tracing::warn!(error = %e, %date, "historical query failed");
                    Vec::new()
                }
            };
            let _ = reply.send(points);
        });
    }

    fn publish(&self) {
        // send fails only when every receiver is gone
        let _ = self.status_tx.send(DashboardStatus {
            connection: self.controller.status(),
            current: self.controller.current().copied(),
            alerts: self.alerts,
            thresholds: self.thresholds,
            history: self.controller.history().to_vec(),
            onsets: self.onsets,
            last_error: self.last_error.clone(),
        });
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("controller", &self.controller)
            .field("thresholds", &self.thresholds)
            .field("alerts", &self.alerts)
            .field("onsets", &self.onsets)
            .field("notifier", &self.notifier)
            .finish()
    }
}

enum Step {
    Command(Command),
    Update(ControllerUpdate),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ANALYSIS_FALLBACK;
    use crate::sound::{AudioSink, SoundError};
    use envmon_llm::provider::MockProvider;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    struct CountingSink(Rc<RefCell<usize>>);

    impl AudioSink for CountingSink {
        fn sample_rate(&self) -> u32 {
            8_000
        }

        fn play(&mut self, _samples: &[f32]) -> Result<(), SoundError> {
            *self.0.borrow_mut() += 1;
            Ok(())
        }
    }

    fn monitor(analyst: Analyst) -> (Monitor, watch::Receiver<DashboardStatus>, Rc<RefCell<usize>>) {
        let plays = Rc::new(RefCell::new(0));
        let p = Rc::clone(&plays);
        let notifier = SoundNotifier::with_backend(move || {
            Ok(Box::new(CountingSink(Rc::clone(&p))) as Box<dyn AudioSink>)
        });
        let (m, rx) = Monitor::new(Arc::new(MonitorCfg::default()), analyst, notifier);
        (m.with_seed(11), rx, plays)
    }

    fn no_analyst() -> Analyst {
        Analyst::new(None, Duration::from_secs(15))
    }

    /// Thresholds every simulated reading (baseline 24 °C) violates.
    fn hot() -> Thresholds {
        Thresholds { temp_max: 10.0, ..Thresholds::default() }
    }

    /// Pump until the history holds `n` readings.
    async fn pump_readings(m: &mut Monitor, n: usize) {
        while m.controller().history().len() < n {
            m.pump().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_alert_sounds_once() {
        let (mut m, rx, plays) = monitor(no_analyst());
        m.handle(Command::SetThresholds(hot()));
        m.handle(Command::ConnectMock);
        pump_readings(&mut m, 5).await;

        assert!(m.alerts().is_temp_alert);
        assert_eq!(m.onsets(), 1);
        assert_eq!(*plays.borrow(), 1);

        let status = rx.borrow().clone();
        assert_eq!(status.connection, ConnectionStatus::ConnectedMock);
        assert_eq!(status.history.len(), 5);
        assert!(status.alerts.has_any());
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_change_can_trigger_onset() {
        let (mut m, _rx, plays) = monitor(no_analyst());
        m.handle(Command::ConnectMock);
        pump_readings(&mut m, 2).await;
        assert_eq!(m.onsets(), 0);

        m.handle(Command::SetThresholds(hot()));
        assert_eq!(m.onsets(), 1);
        m.handle(Command::SetThresholds(Thresholds::default()));
        assert!(!m.alerts().has_any());
        m.handle(Command::SetThresholds(hot()));
        assert_eq!(m.onsets(), 2);
        assert_eq!(*plays.borrow(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn muted_alert_counts_onset_without_sound() {
        let (mut m, _rx, plays) = monitor(no_analyst());
        m.handle(Command::SetThresholds(Thresholds { sound_enabled: false, ..hot() }));
        m.handle(Command::ConnectMock);
        pump_readings(&mut m, 2).await;
        assert_eq!(m.onsets(), 1);
        assert_eq!(*plays.borrow(), 0);
        assert!(!m.notifier().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn no_reading_means_no_alert() {
        let (mut m, _rx, plays) = monitor(no_analyst());
        m.handle(Command::SetThresholds(hot()));
        assert!(!m.alerts().has_any());
        assert_eq!(*plays.borrow(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn preview_ignores_mute() {
        let (mut m, _rx, plays) = monitor(no_analyst());
        m.handle(Command::SetThresholds(Thresholds { sound_enabled: false, ..Thresholds::default() }));
        m.handle(Command::PreviewSound(SoundType::Chime));
        assert_eq!(*plays.borrow(), 1);
        assert_eq!(m.onsets(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn analysis_uses_current_reading() {
        let analyst = Analyst::new(
            Some(Arc::new(MockProvider::new("Comfortable."))),
            Duration::from_secs(15),
        );
        let (mut m, _rx, _) = monitor(analyst);

        let (tx, rx) = oneshot::channel();
        m.handle(Command::Analyze(tx));
        assert_eq!(rx.await.unwrap(), ANALYSIS_FALLBACK);

        m.handle(Command::ConnectMock);
        pump_readings(&mut m, 1).await;
        let (tx, rx) = oneshot::channel();
        m.handle(Command::Analyze(tx));
        assert_eq!(rx.await.unwrap(), "Comfortable.");
    }

    #[tokio::test(start_paused = true)]
    async fn history_query_replies_with_a_day() {
        let (mut m, _rx, _) = monitor(no_analyst());
        let (tx, rx) = oneshot::channel();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        m.handle(Command::QueryHistory(date, tx));
        assert_eq!(rx.await.unwrap().len(), 48);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_history_query_replies_empty() {
        let cfg = MonitorCfg {
            history_query_latency_ms: 5_000,
            history_query_timeout_secs: 1,
            ..MonitorCfg::default()
        };
        let (mut m, _rx) = Monitor::new(Arc::new(cfg), no_analyst(), SoundNotifier::silent(8_000));
        let start = tokio::time::Instant::now();

        let (tx, rx) = oneshot::channel();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        m.handle(Command::QueryHistory(date, tx));
        assert!(rx.await.unwrap().is_empty());
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_releases_everything() {
        let (mut m, rx, _) = monitor(no_analyst());
        m.handle(Command::SetThresholds(hot()));
        m.handle(Command::ConnectMock);
        pump_readings(&mut m, 1).await;
        assert!(m.notifier().is_open());

        m.teardown();
        m.teardown();
        assert!(!m.notifier().is_open());
        assert!(!m.controller().is_polling());
        assert!(m.token().is_cancelled());
        assert_eq!(rx.borrow().connection, ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown_command() {
        let (mut m, rx, _) = monitor(no_analyst());
        let (tx, cmd_rx) = mpsc::channel(8);
        tx.send(Command::ConnectMock).await.unwrap();
        tx.send(Command::Shutdown).await.unwrap();
        m.run(cmd_rx).await;
        assert!(!m.controller().is_polling());
        assert_eq!(rx.borrow().connection, ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn run_applies_poll_updates() {
        let (mut m, mut rx, _) = monitor(no_analyst());
        let (tx, cmd_rx) = mpsc::channel(8);
        let token = m.token();

        let driver = async move {
            tx.send(Command::ConnectMock).await.unwrap();
            loop {
                rx.changed().await.unwrap();
                if rx.borrow().history.len() >= 3 {
                    break;
                }
            }
            token.cancel();
        };
        tokio::join!(m.run(cmd_rx), driver);
        assert_eq!(m.controller().history().len(), 3);
    }
}
