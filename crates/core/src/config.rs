use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::types::{SoundType, Thresholds};

/// Environment variable prefix for every [`MonitorCfg`] key.
pub const ENV_PREFIX: &str = "ENVMON_";

/// All monitor parameters. Loaded from `ENVMON_*` environment variables at
/// startup; anything missing or unparsable keeps its default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorCfg {
    // polling
    pub poll_interval_ms: u64,
    pub mock_connect_delay_ms: u64,
    pub device_timeout_ms: u64,
    pub default_device_ip: String,

    // rolling history
    pub history_capacity: usize,

    // historical query
    pub history_query_latency_ms: u64,
    pub history_query_timeout_secs: u64,

    // analysis
    pub analysis_timeout_secs: u64,

    // audio
    pub audio_sample_rate: u32,

    // default thresholds
    pub temp_min: f64,
    pub temp_max: f64,
    pub humid_min: f64,
    pub humid_max: f64,
    pub sound_enabled: bool,
    pub sound_type: SoundType,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        let t = Thresholds::default();
        Self {
            poll_interval_ms: 2000,
            mock_connect_delay_ms: 800,
            device_timeout_ms: 3000,
            default_device_ip: "192.168.1.100".to_owned(),
            history_capacity: 50,
            history_query_latency_ms: 800,
            history_query_timeout_secs: 10,
            analysis_timeout_secs: 15,
            audio_sample_rate: 44_100,
            temp_min: t.temp_min,
            temp_max: t.temp_max,
            humid_min: t.humid_min,
            humid_max: t.humid_max,
            sound_enabled: t.sound_enabled,
            sound_type: t.sound_type,
        }
    }
}

impl MonitorCfg {
    /// Load from process environment (`ENVMON_POLL_INTERVAL_MS`, ...).
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Load from arbitrary `(name, value)` pairs; only `ENVMON_`-prefixed
    /// names are considered, matched case-insensitively.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let map: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(ENV_PREFIX).map(|key| (key.to_ascii_lowercase(), v))
            })
            .collect();
        Self::from_map(&map)
    }

    fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            poll_interval_ms: get_or(m, "poll_interval_ms", d.poll_interval_ms).max(1),
            mock_connect_delay_ms: get_or(m, "mock_connect_delay_ms", d.mock_connect_delay_ms),
            device_timeout_ms: get_or(m, "device_timeout_ms", d.device_timeout_ms),
            default_device_ip: get_or(m, "default_device_ip", d.default_device_ip),
            history_capacity: get_or(m, "history_capacity", d.history_capacity).max(1),
            history_query_latency_ms: get_or(m, "history_query_latency_ms", d.history_query_latency_ms),
            history_query_timeout_secs: get_or(m, "history_query_timeout_secs", d.history_query_timeout_secs),
            analysis_timeout_secs: get_or(m, "analysis_timeout_secs", d.analysis_timeout_secs),
            audio_sample_rate: get_or(m, "audio_sample_rate", d.audio_sample_rate),
            temp_min: get_or(m, "temp_min", d.temp_min),
            temp_max: get_or(m, "temp_max", d.temp_max),
            humid_min: get_or(m, "humid_min", d.humid_min),
            humid_max: get_or(m, "humid_max", d.humid_max),
            sound_enabled: get_or(m, "sound_enabled", d.sound_enabled),
            sound_type: get_or(m, "sound_type", d.sound_type),
        }
    }

    /// Every key with its current value and a short description.
    pub fn to_entries(&self) -> Vec<(&'static str, String, &'static str)> {
        vec![
            ("poll_interval_ms", self.poll_interval_ms.to_string(), "Polling tick interval ms"),
            ("mock_connect_delay_ms", self.mock_connect_delay_ms.to_string(), "Simulated connect handshake ms"),
            ("device_timeout_ms", self.device_timeout_ms.to_string(), "Device fetch timeout ms"),
            ("default_device_ip", self.default_device_ip.clone(), "Device address used when none is given"),
            ("history_capacity", self.history_capacity.to_string(), "Rolling history max entries"),
            ("history_query_latency_ms", self.history_query_latency_ms.to_string(), "Simulated archive round trip ms"),
            ("history_query_timeout_secs", self.history_query_timeout_secs.to_string(), "Historical query deadline seconds"),
            ("analysis_timeout_secs", self.analysis_timeout_secs.to_string(), "Analysis request deadline seconds"),
            ("audio_sample_rate", self.audio_sample_rate.to_string(), "Alert synthesis sample rate"),
            ("temp_min", self.temp_min.to_string(), "Default lower temperature bound °C"),
            ("temp_max", self.temp_max.to_string(), "Default upper temperature bound °C"),
            ("humid_min", self.humid_min.to_string(), "Default lower humidity bound %"),
            ("humid_max", self.humid_max.to_string(), "Default upper humidity bound %"),
            ("sound_enabled", self.sound_enabled.to_string(), "Play a sound on alert onset"),
            ("sound_type", self.sound_type.to_string(), "Alert pattern: beep, alarm or chime"),
        ]
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            temp_min: self.temp_min,
            temp_max: self.temp_max,
            humid_min: self.humid_min,
            humid_max: self.humid_max,
            sound_enabled: self.sound_enabled,
            sound_type: self.sound_type,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn mock_connect_delay(&self) -> Duration {
        Duration::from_millis(self.mock_connect_delay_ms)
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }

    pub fn history_query_latency(&self) -> Duration {
        Duration::from_millis(self.history_query_latency_ms)
    }

    pub fn history_query_timeout(&self) -> Duration {
        Duration::from_secs(self.history_query_timeout_secs)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
