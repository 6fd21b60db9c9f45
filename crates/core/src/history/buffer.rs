use std::collections::VecDeque;

use crate::alert::Violation;
use crate::types::{Metric, SensorReading, Thresholds};

/// One out-of-bounds reading for the alert log.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertLogEntry {
    pub reading: SensorReading,
    pub violations: Vec<Violation>,
}

/// Rolling window of the most recent readings, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    readings: VecDeque<SensorReading>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Buffer holding the last `capacity` of `readings`.
    pub fn from_readings(capacity: usize, readings: impl IntoIterator<Item = SensorReading>) -> Self {
        let mut buf = Self::new(capacity);
        for r in readings {
            buf.push(r);
        }
        buf
    }

    /// Append a reading, evicting from the front once over capacity.
    pub fn push(&mut self, reading: SensorReading) {
        self.readings.push_back(reading);
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
        }
    }

    /// Most recent reading.
    pub fn latest(&self) -> Option<&SensorReading> {
        self.readings.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &SensorReading> + ExactSizeIterator {
        self.readings.iter()
    }

    pub fn to_vec(&self) -> Vec<SensorReading> {
        self.readings.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `(timestamp, value)` pairs of one metric, oldest first.
    pub fn series(&self, metric: Metric) -> Vec<(i64, f64)> {
        self.readings
            .iter()
            .map(|r| (r.timestamp, r.value(metric)))
            .collect()
    }

    /// Readings outside `thresholds`, newest first.
    pub fn alert_log(&self, thresholds: &Thresholds) -> Vec<AlertLogEntry> {
        self.readings
            .iter()
            .rev()
            .filter_map(|r| {
                let violations = Violation::collect(r, thresholds);
                (!violations.is_empty()).then(|| AlertLogEntry { reading: *r, violations })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(ts: i64, temperature: f64, humidity: f64) -> SensorReading {
        SensorReading::derived(ts, temperature, humidity, 1013.25)
    }

    #[test]
    fn keeps_last_capacity_readings_in_order() {
        let mut h = HistoryBuffer::new(50);
        for i in 0..137 {
            h.push(reading(i, 20.0, 50.0));
        }
        assert_eq!(h.len(), 50);
        let stamps: Vec<i64> = h.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, (87..137).collect::<Vec<_>>());
        assert_eq!(h.latest().map(|r| r.timestamp), Some(136));
    }

    #[test]
    fn under_capacity_keeps_everything() {
        let mut h = HistoryBuffer::new(50);
        assert!(h.is_empty());
        assert!(h.latest().is_none());
        for i in 0..10 {
            h.push(reading(i, 20.0, 50.0));
        }
        assert_eq!(h.len(), 10);
        assert_eq!(h.to_vec()[0].timestamp, 0);
    }

    #[test]
    fn series_extracts_metric() {
        let mut h = HistoryBuffer::new(5);
        h.push(reading(1, 20.0, 40.0));
        h.push(reading(2, 21.5, 41.0));
        assert_eq!(h.series(Metric::Temperature), vec![(1, 20.0), (2, 21.5)]);
        assert_eq!(h.series(Metric::Humidity), vec![(1, 40.0), (2, 41.0)]);
    }

    #[test]
    fn alert_log_lists_violations_newest_first() {
        let t = Thresholds::default();
        let mut h = HistoryBuffer::new(10);
        h.push(reading(1, 30.0, 50.0)); // temp high
        h.push(reading(2, 22.0, 50.0)); // fine
        h.push(reading(3, 15.0, 80.0)); // temp low + humid high
        h.push(reading(4, 28.0, 70.0)); // on the bounds, fine

        let log = h.alert_log(&t);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].reading.timestamp, 3);
        assert_eq!(log[0].violations, vec![Violation::TempLow, Violation::HumidHigh]);
        assert_eq!(log[1].reading.timestamp, 1);
        assert_eq!(log[1].violations, vec![Violation::TempHigh]);
    }
}
