use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::sensor::{AcquisitionError, ReadingSource};
use crate::types::{SensorReading, SourceMode};

/// What a poll task reports back to its controller. Every event carries the
/// session it belongs to so events from a cancelled task can be discarded.
#[derive(Debug)]
pub enum PollEvent {
    /// Handshake done (simulated delay elapsed, or device probe succeeded).
    Connected { session: u64, mode: SourceMode },
    Reading { session: u64, reading: SensorReading },
    /// Probe or tick failed; the task has exited.
    Failed { session: u64, error: AcquisitionError },
}

impl PollEvent {
    pub fn session(&self) -> u64 {
        match self {
            Self::Connected { session, .. }
            | Self::Reading { session, .. }
            | Self::Failed { session, .. } => *session,
        }
    }
}

/// Timing of one poll session.
#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    /// Simulated handshake before a mock session reports connected.
    pub connect_delay: Duration,
    pub interval: Duration,
}

/// Handle to a running poll task. Dropping it cancels the task.
#[derive(Debug)]
pub struct PollHandle {
    session: u64,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Stop the task. Idempotent.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            self.token.cancel();
            self.task.abort();
            tracing::debug!(session = self.session, "poll task cancelled");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Spawn the poll task for `session`. `fetches` counts every acquisition
/// attempt across all tasks sharing the counter.
pub fn spawn(
    source: ReadingSource,
    session: u64,
    schedule: PollSchedule,
    events: mpsc::Sender<PollEvent>,
    fetches: Arc<AtomicU64>,
) -> PollHandle {
    let token = CancellationToken::new();
    let task = tokio::spawn(run(source, session, schedule, events, fetches, token.clone()));
    PollHandle { session, token, task }
}

async fn run(
    mut source: ReadingSource,
    session: u64,
    schedule: PollSchedule,
    events: mpsc::Sender<PollEvent>,
    fetches: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    let mode = source.mode();

    // Handshake
    match mode {
        SourceMode::Mock => {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(schedule.connect_delay) => {}
            }
        }
        SourceMode::Device => {
            fetches.fetch_add(1, Ordering::Relaxed);
            let probe = tokio::select! {
                _ = cancel.cancelled() => return,
                r = source.fetch() => r,
            };
            if let Err(error) = probe {
                tracing::warn!(session, error = %error, "device probe failed");
                let _ = events.send(PollEvent::Failed { session, error }).await;
                return;
            }
        }
    }

    if events.send(PollEvent::Connected { session, mode }).await.is_err() {
        return;
    }
    tracing::info!(session, ?mode, interval_ms = schedule.interval.as_millis() as u64, "polling started");

    // First tick completes immediately.
    // interval() panics on a zero period
    let mut ticker = tokio::time::interval(schedule.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_timestamp = i64::MIN;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        fetches.fetch_add(1, Ordering::Relaxed);
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            r = source.fetch() => r,
        };

        let event = match result {
            Ok(reading) => {
                let reading = reading.stamped_after(last_timestamp);
                last_timestamp = reading.timestamp;
                PollEvent::Reading { session, reading }
            }
            Err(error) => {
                tracing::warn!(session, error = %error, "poll tick failed, stopping");
                let _ = events.send(PollEvent::Failed { session, error }).await;
                return;
            }
        };

        if events.send(event).await.is_err() {
            tracing::debug!(session, "poll event channel closed");
            return;
        }
    }
}
