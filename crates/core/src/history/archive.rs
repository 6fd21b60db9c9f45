use std::f64::consts::PI;
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDate, TimeZone};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::SensorReading;

/// Points per day at 30-minute resolution.
pub const POINTS_PER_DAY: usize = 48;
pub const POINT_SPACING_MS: i64 = 30 * 60 * 1000;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("local midnight does not exist on {0}")]
    NoLocalMidnight(NaiveDate),
    #[error("historical query timed out after {0:?}")]
    TimedOut(Duration),
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Result<NaiveDate, HistoryError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| HistoryError::InvalidDate(s.to_owned()))
}

/// Stand-in for a time-series store: synthesizes a plausible diurnal day.
#[derive(Debug, Clone)]
pub struct HistoricalProvider {
    latency: Duration,
    seed: Option<u64>,
}

impl HistoricalProvider {
    pub fn new(latency: Duration) -> Self {
        Self { latency, seed: None }
    }

    /// Same seed and date always yield the same series.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// One day of readings starting at local midnight of `date`.
    pub async fn fetch(&self, date: NaiveDate) -> Result<Vec<SensorReading>, HistoryError> {
        tokio::time::sleep(self.latency).await;
        let start = local_midnight_millis(date)?;
        Ok(self.series(date, start))
    }

    /// [`fetch`](Self::fetch) bounded by `deadline`.
    pub async fn fetch_within(
        &self,
        date: NaiveDate,
        deadline: Duration,
    ) -> Result<Vec<SensorReading>, HistoryError> {
        tokio::time::timeout(deadline, self.fetch(date))
            .await
            .map_err(|_| HistoryError::TimedOut(deadline))?
    }

    /// Synthesize the series for `date` with the first point at `start_ms`.
    pub fn series(&self, date: NaiveDate, start_ms: i64) -> Vec<SensorReading> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ date.num_days_from_ce() as u64),
            None => StdRng::from_entropy(),
        };

        (0..POINTS_PER_DAY)
            .map(|i| {
                let hour = i as f64 / 2.0;
                let cycle = -(((hour - 4.0) / 24.0) * 2.0 * PI).cos();
                let base_temp = 22.0 + cycle * 5.0;
                let base_humid = 60.0 - cycle * 20.0;
                let pressure = 1013.0 + rng.gen_range(-2.5..=2.5);

                SensorReading::derived(
                    start_ms + i as i64 * POINT_SPACING_MS,
                    base_temp + rng.gen_range(-1.0..=1.0),
                    base_humid + rng.gen_range(-2.5..=2.5),
                    pressure,
                )
            })
            .collect()
    }
}

fn local_midnight_millis(date: NaiveDate) -> Result<i64, HistoryError> {
    let naive = date.and_hms_opt(0, 0, 0).ok_or(HistoryError::NoLocalMidnight(date))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.timestamp_millis())
        .ok_or(HistoryError::NoLocalMidnight(date))
}
