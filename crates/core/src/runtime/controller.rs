use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use super::poller::{self, PollEvent, PollHandle, PollSchedule};
use crate::config::MonitorCfg;
use crate::history::HistoryBuffer;
use crate::sensor::{AcquisitionError, DeviceClient, ReadingSource, Simulator};
use crate::types::{ConnectionStatus, SensorReading};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What changed after applying a poll event.
#[derive(Debug)]
pub enum ControllerUpdate {
    Status(ConnectionStatus),
    Reading(SensorReading),
    /// Acquisition failed; status is now [`ConnectionStatus::Error`] and
    /// polling has stopped.
    Failed(AcquisitionError),
}

/// Connection state machine. Owns at most one poll task at a time plus the
/// rolling history it feeds.
///
/// Every connect bumps the session counter and cancels the previous task, so
/// a late event from an abandoned session can never touch state.
pub struct PollingController {
    cfg: Arc<MonitorCfg>,
    status: ConnectionStatus,
    history: HistoryBuffer,
    session: u64,
    poll: Option<PollHandle>,
    events_tx: mpsc::Sender<PollEvent>,
    events_rx: mpsc::Receiver<PollEvent>,
    fetches: Arc<AtomicU64>,
    sim_seed: Option<u64>,
}

impl PollingController {
    pub fn new(cfg: Arc<MonitorCfg>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            history: HistoryBuffer::new(cfg.history_capacity),
            cfg,
            status: ConnectionStatus::Disconnected,
            session: 0,
            poll: None,
            events_tx,
            events_rx,
            fetches: Arc::new(AtomicU64::new(0)),
            sim_seed: None,
        }
    }

    /// Seed simulated sessions for reproducible runs. Each session still
    /// gets its own walk.
    pub fn with_sim_seed(mut self, seed: u64) -> Self {
        self.sim_seed = Some(seed);
        self
    }

    /// Start a simulated session. Any live session is cancelled first.
    pub fn connect_mock(&mut self) {
        let session = self.begin_session();
        let sim = match self.sim_seed {
            Some(seed) => Simulator::with_seed(seed ^ session),
            None => Simulator::new(),
        };
        tracing::info!(session, "connecting to simulated source");
        self.start(ReadingSource::Simulated(sim), session);
    }

    /// Start a device session against `address`; `None` uses the configured
    /// default. The probe runs in the background.
    pub fn connect_device(&mut self, address: Option<&str>) {
        let address = address
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.cfg.default_device_ip)
            .to_owned();
        let session = self.begin_session();
        let client = DeviceClient::new(&address, self.cfg.device_timeout());
        tracing::info!(session, url = client.url(), "connecting to device");
        self.start(ReadingSource::Device(client), session);
    }

    /// Stop polling. History and the current reading are kept.
    pub fn disconnect(&mut self) {
        self.stop_polling();
        if self.status != ConnectionStatus::Disconnected {
            tracing::info!(session = self.session, "disconnected");
        }
        self.status = ConnectionStatus::Disconnected;
    }

    /// Wait for the next event that belongs to the live session and apply it.
    /// Cancel safe.
    pub async fn next_update(&mut self) -> ControllerUpdate {
        loop {
            // the controller keeps a sender alive, so the channel never closes
            let Some(event) = self.events_rx.recv().await else {
                continue;
            };
            if let Some(update) = self.apply(event) {
                return update;
            }
        }
    }

    /// Apply one poll event. Stale events yield `None`.
    pub fn apply(&mut self, event: PollEvent) -> Option<ControllerUpdate> {
        let live = self.poll.as_ref().is_some_and(|p| p.session() == event.session());
        if !live {
            tracing::trace!(session = event.session(), current = self.session, "stale poll event dropped");
            return None;
        }

        match event {
            PollEvent::Connected { mode, .. } => {
                self.status = ConnectionStatus::connected(mode);
                tracing::info!(session = self.session, status = %self.status, "connected");
                Some(ControllerUpdate::Status(self.status))
            }
            PollEvent::Reading { reading, .. } => {
                self.history.push(reading);
                Some(ControllerUpdate::Reading(reading))
            }
            PollEvent::Failed { error, .. } => {
                self.stop_polling();
                self.status = ConnectionStatus::Error;
                tracing::warn!(session = self.session, error = %error, "connection lost");
                Some(ControllerUpdate::Failed(error))
            }
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Latest accepted reading.
    pub fn current(&self) -> Option<&SensorReading> {
        self.history.latest()
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    /// True while a poll task is live.
    pub fn is_polling(&self) -> bool {
        self.poll.is_some()
    }

    /// Acquisition attempts across all sessions so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    fn begin_session(&mut self) -> u64 {
        self.stop_polling();
        self.session += 1;
        self.status = ConnectionStatus::Connecting;
        self.session
    }

    fn start(&mut self, source: ReadingSource, session: u64) {
        let schedule = PollSchedule {
            connect_delay: self.cfg.mock_connect_delay(),
            interval: self.cfg.poll_interval(),
        };
        self.poll = Some(poller::spawn(
            source,
            session,
            schedule,
            self.events_tx.clone(),
            Arc::clone(&self.fetches),
        ));
    }

    fn stop_polling(&mut self) {
        if let Some(handle) = self.poll.take() {
            handle.cancel();
        }
    }
}

impl std::fmt::Debug for PollingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingController")
            .field("status", &self.status)
            .field("session", &self.session)
            .field("polling", &self.is_polling())
            .field("history_len", &self.history.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{serve_n, serve_with};
    use crate::types::SourceMode;
    use std::time::Duration;
    use tokio::time::Instant;

    const DEVICE_BODY: &str = r#"{"temperature":23.5,"humidity":48.0,"pressure":1012.1}"#;

    fn cfg() -> Arc<MonitorCfg> {
        Arc::new(MonitorCfg::default())
    }

    fn fast_cfg() -> Arc<MonitorCfg> {
        Arc::new(MonitorCfg {
            poll_interval_ms: 200,
            device_timeout_ms: 300,
            ..MonitorCfg::default()
        })
    }

    /// Drain updates until `deadline`, counting readings.
    async fn readings_until(c: &mut PollingController, deadline: Instant) -> usize {
        let mut n = 0;
        while let Ok(update) = tokio::time::timeout_at(deadline, c.next_update()).await {
            if matches!(update, ControllerUpdate::Reading(_)) {
                n += 1;
            }
        }
        n
    }

    #[tokio::test(start_paused = true)]
    async fn mock_connect_goes_through_connecting() {
        let mut c = PollingController::new(cfg()).with_sim_seed(1);
        assert_eq!(c.status(), ConnectionStatus::Disconnected);

        c.connect_mock();
        assert_eq!(c.status(), ConnectionStatus::Connecting);
        assert!(c.current().is_none());

        let start = Instant::now();
        let update = c.next_update().await;
        assert!(matches!(update, ControllerUpdate::Status(ConnectionStatus::ConnectedMock)));
        assert_eq!(start.elapsed(), Duration::from_millis(800));

        assert!(matches!(c.next_update().await, ControllerUpdate::Reading(_)));
        assert_eq!(c.history().len(), 1);
        assert!(c.current().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnecting_keeps_a_single_timer() {
        let mut c = PollingController::new(cfg()).with_sim_seed(2);
        c.connect_mock();
        c.connect_mock();
        let start = Instant::now();

        // connected at 0.8s, then readings at 0.8, 2.8, 4.8, 6.8, 8.8
        let n = readings_until(&mut c, start + Duration::from_millis(9_900)).await;
        assert_eq!(n, 5);
        assert_eq!(c.fetch_count(), 5);
        assert_eq!(c.status(), ConnectionStatus::ConnectedMock);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_from_env_keeps_polling() {
        let vars = [("ENVMON_POLL_INTERVAL_MS".to_owned(), "0".to_owned())];
        let mut c = PollingController::new(Arc::new(MonitorCfg::from_vars(vars))).with_sim_seed(9);
        c.connect_mock();
        let start = Instant::now();

        let n = readings_until(&mut c, start + Duration::from_millis(900)).await;
        assert!(n > 10, "only {n} readings");
        assert_eq!(c.status(), ConnectionStatus::ConnectedMock);
        assert!(c.is_polling());
        assert_eq!(c.history().len(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_stops_polling_and_keeps_history() {
        let mut c = PollingController::new(cfg()).with_sim_seed(3);
        c.connect_mock();
        let start = Instant::now();
        readings_until(&mut c, start + Duration::from_millis(3_000)).await;
        assert_eq!(c.history().len(), 2);

        c.disconnect();
        c.disconnect();
        assert_eq!(c.status(), ConnectionStatus::Disconnected);
        assert!(!c.is_polling());

        let fetched = c.fetch_count();
        let n = readings_until(&mut c, Instant::now() + Duration::from_secs(10)).await;
        assert_eq!(n, 0);
        assert_eq!(c.fetch_count(), fetched);
        assert_eq!(c.history().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn history_is_capped() {
        let cfg = Arc::new(MonitorCfg { history_capacity: 50, ..MonitorCfg::default() });
        let mut c = PollingController::new(cfg).with_sim_seed(4);
        c.connect_mock();
        let start = Instant::now();
        readings_until(&mut c, start + Duration::from_secs(130)).await;
        assert_eq!(c.history().len(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_events_are_ignored() {
        let mut c = PollingController::new(cfg());
        c.connect_mock();
        let stale = PollEvent::Connected { session: 99, mode: SourceMode::Device };
        assert!(c.apply(stale).is_none());
        assert_eq!(c.status(), ConnectionStatus::Connecting);
    }

    #[tokio::test]
    async fn device_connect_probes_then_polls() {
        let addr = serve_with("200 OK", DEVICE_BODY).await;
        let mut c = PollingController::new(fast_cfg());
        c.connect_device(Some(&addr));
        assert_eq!(c.status(), ConnectionStatus::Connecting);

        let update = c.next_update().await;
        assert!(matches!(update, ControllerUpdate::Status(ConnectionStatus::ConnectedReal)));
        let ControllerUpdate::Reading(r) = c.next_update().await else {
            panic!("expected a reading");
        };
        assert_eq!(r.temperature, 23.5);
        assert!((r.altitude - 9.6).abs() < 0.5);
        c.disconnect();
    }

    #[tokio::test]
    async fn failed_probe_sets_error() {
        let addr = serve_with("503 Service Unavailable", "").await;
        let mut c = PollingController::new(fast_cfg());
        c.connect_device(Some(&addr));

        let update = c.next_update().await;
        assert!(matches!(update, ControllerUpdate::Failed(AcquisitionError::Status(503))));
        assert_eq!(c.status(), ConnectionStatus::Error);
        assert!(!c.is_polling());
        assert!(c.history().is_empty());
    }

    #[tokio::test]
    async fn failing_tick_stops_polling() {
        // probe + first tick succeed, the second tick is refused
        let addr = serve_n("200 OK", DEVICE_BODY, 2).await;
        let mut c = PollingController::new(fast_cfg());
        c.connect_device(Some(&addr));

        assert!(matches!(c.next_update().await, ControllerUpdate::Status(ConnectionStatus::ConnectedReal)));
        assert!(matches!(c.next_update().await, ControllerUpdate::Reading(_)));
        assert!(matches!(c.next_update().await, ControllerUpdate::Failed(_)));
        assert_eq!(c.status(), ConnectionStatus::Error);
        assert!(!c.is_polling());
        assert_eq!(c.history().len(), 1);

        let fetched = c.fetch_count();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(c.fetch_count(), fetched);
    }

    #[tokio::test]
    async fn reconnect_after_error() {
        let bad = serve_with("500 Internal Server Error", "").await;
        let good = serve_with("200 OK", DEVICE_BODY).await;
        let mut c = PollingController::new(fast_cfg());

        c.connect_device(Some(&bad));
        assert!(matches!(c.next_update().await, ControllerUpdate::Failed(_)));
        c.connect_device(Some(&good));
        assert_eq!(c.status(), ConnectionStatus::Connecting);
        assert!(matches!(c.next_update().await, ControllerUpdate::Status(ConnectionStatus::ConnectedReal)));
        c.disconnect();
    }
}
