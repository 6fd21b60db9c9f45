use std::fmt;

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

/// Standard sea-level pressure used by the barometric formula (hPa).
pub const SEA_LEVEL_PRESSURE_HPA: f64 = 1013.25;

/// Estimated altitude in metres for a station pressure in hPa, using the
/// international barometric formula.
pub fn altitude_from_pressure(pressure_hpa: f64) -> f64 {
    44330.0 * (1.0 - (pressure_hpa / SEA_LEVEL_PRESSURE_HPA).powf(1.0 / 5.255))
}

/// Current wall-clock time as epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One timestamped snapshot from the DHT22 + BMP280 pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// °C
    pub temperature: f64,
    /// %
    pub humidity: f64,
    /// hPa
    pub pressure: f64,
    /// m
    pub altitude: f64,
}

impl SensorReading {
    /// Build a reading whose altitude is derived from `pressure`.
    pub fn derived(timestamp: i64, temperature: f64, humidity: f64, pressure: f64) -> Self {
        Self {
            timestamp,
            temperature,
            humidity,
            pressure,
            altitude: altitude_from_pressure(pressure),
        }
    }

    /// Copy of this reading stamped no earlier than `floor`.
    pub fn stamped_after(self, floor: i64) -> Self {
        Self { timestamp: self.timestamp.max(floor), ..self }
    }

    /// Local wall-clock time of the reading, `HH:MM:SS`.
    pub fn time_label(&self) -> String {
        match Local.timestamp_millis_opt(self.timestamp).single() {
            Some(t) => t.format("%H:%M:%S").to_string(),
            None => "--:--:--".to_owned(),
        }
    }

    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Pressure => self.pressure,
            Metric::Altitude => self.altitude,
        }
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.1}°C {:.1}% {:.1}hPa {:.0}m",
            self.time_label(),
            self.temperature,
            self.humidity,
            self.pressure,
            self.altitude
        )
    }
}

/// A single plotted quantity of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Temperature,
    Humidity,
    Pressure,
    Altitude,
}

impl Metric {
    pub fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Humidity => "%",
            Self::Pressure => "hPa",
            Self::Altitude => "m",
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "temp" | "temperature" => Ok(Self::Temperature),
            "humid" | "humidity" => Ok(Self::Humidity),
            "pressure" => Ok(Self::Pressure),
            "alt" | "altitude" => Ok(Self::Altitude),
            other => Err(format!("unknown metric: {other}")),
        }
    }
}

/// Audible alert pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundType {
    #[default]
    Beep,
    Alarm,
    Chime,
}

impl std::str::FromStr for SoundType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "beep" => Ok(Self::Beep),
            "alarm" => Ok(Self::Alarm),
            "chime" => Ok(Self::Chime),
            other => Err(format!("unknown sound type: {other}")),
        }
    }
}

impl fmt::Display for SoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Beep => "beep",
            Self::Alarm => "alarm",
            Self::Chime => "chime",
        })
    }
}

/// User-adjustable alert bounds and sound preferences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub temp_min: f64,
    pub temp_max: f64,
    pub humid_min: f64,
    pub humid_max: f64,
    pub sound_enabled: bool,
    pub sound_type: SoundType,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temp_min: 18.0,
            temp_max: 28.0,
            humid_min: 30.0,
            humid_max: 70.0,
            sound_enabled: true,
            sound_type: SoundType::Beep,
        }
    }
}

/// Which reading source a live connection polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceMode {
    Mock,
    Device,
}

/// Connection state of the dashboard. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    ConnectedMock,
    ConnectedReal,
    Error,
}

impl ConnectionStatus {
    /// True when a poll loop is expected to be live.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::ConnectedMock | Self::ConnectedReal)
    }

    pub fn connected(mode: SourceMode) -> Self {
        match mode {
            SourceMode::Mock => Self::ConnectedMock,
            SourceMode::Device => Self::ConnectedReal,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting...",
            Self::ConnectedMock => "connected (simulated)",
            Self::ConnectedReal => "connected (device)",
            Self::Error => "device not found",
        })
    }
}
