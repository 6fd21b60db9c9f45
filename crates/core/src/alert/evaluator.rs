use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{SensorReading, Thresholds};

/// Alert flags for the current reading. Derived, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertState {
    pub is_temp_alert: bool,
    pub is_humid_alert: bool,
}

impl AlertState {
    /// Strict inequalities: a value sitting exactly on a bound is not an alert.
    /// No reading means no alert.
    pub fn evaluate(reading: Option<&SensorReading>, thresholds: &Thresholds) -> Self {
        let Some(r) = reading else {
            return Self::default();
        };
        Self {
            is_temp_alert: r.temperature > thresholds.temp_max || r.temperature < thresholds.temp_min,
            is_humid_alert: r.humidity > thresholds.humid_max || r.humidity < thresholds.humid_min,
        }
    }

    pub fn has_any(self) -> bool {
        self.is_temp_alert || self.is_humid_alert
    }
}

/// Which bound a reading crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Violation {
    TempHigh,
    TempLow,
    HumidHigh,
    HumidLow,
}

impl Violation {
    pub fn collect(r: &SensorReading, t: &Thresholds) -> Vec<Self> {
        let mut out = Vec::new();
        if r.temperature > t.temp_max {
            out.push(Self::TempHigh);
        }
        if r.temperature < t.temp_min {
            out.push(Self::TempLow);
        }
        if r.humidity > t.humid_max {
            out.push(Self::HumidHigh);
        }
        if r.humidity < t.humid_min {
            out.push(Self::HumidLow);
        }
        out
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TempHigh => "temperature high",
            Self::TempLow => "temperature low",
            Self::HumidHigh => "humidity high",
            Self::HumidLow => "humidity low",
        })
    }
}
