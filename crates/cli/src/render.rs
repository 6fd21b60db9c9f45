use std::fmt::Write;

use chrono::NaiveDate;
use envmon_core::alert::Violation;
use envmon_core::history::AlertLogEntry;
use envmon_core::runtime::DashboardStatus;
use envmon_core::types::{Metric, SensorReading, Thresholds};

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Summary card: connection, current reading, alert flags.
pub fn dashboard(s: &DashboardStatus) -> String {
    let mut out = format!("connection: {}\n", s.connection);
    if let Some(err) = &s.last_error {
        let _ = writeln!(out, "last error: {err}");
    }
    match &s.current {
        Some(r) => {
            let _ = writeln!(
                out,
                "reading @ {}\n  temperature {:>6.1} °C {}\n  humidity    {:>6.1} %  {}\n  pressure    {:>6.1} hPa\n  altitude    {:>6.0} m",
                r.time_label(),
                r.temperature,
                flag(s.alerts.is_temp_alert),
                r.humidity,
                flag(s.alerts.is_humid_alert),
                r.pressure,
                r.altitude,
            );
        }
        None => out.push_str("no reading yet\n"),
    }
    let _ = write!(out, "history: {} readings, {} alert onsets", s.history.len(), s.onsets);
    out
}

fn flag(alert: bool) -> &'static str {
    if alert { "[ALERT]" } else { "" }
}

pub fn thresholds(t: &Thresholds) -> String {
    format!(
        "temperature {}–{} °C, humidity {}–{} %, sound {} ({})",
        t.temp_min,
        t.temp_max,
        t.humid_min,
        t.humid_max,
        if t.sound_enabled { "on" } else { "off" },
        t.sound_type,
    )
}

/// Lines worth announcing between two snapshots.
pub fn transitions(prev: &DashboardStatus, cur: &DashboardStatus) -> Vec<String> {
    let mut lines = Vec::new();
    if prev.connection != cur.connection {
        lines.push(format!("* {}", cur.connection));
    }
    if cur.last_error != prev.last_error
        && let Some(err) = &cur.last_error
    {
        lines.push(format!("! {err}; reconnect to resume"));
    }
    if cur.onsets > prev.onsets
        && let Some(r) = &cur.current
    {
        let kinds = Violation::collect(r, &cur.thresholds);
        lines.push(format!("ALERT {}: {r}", join(&kinds)));
    }
    lines
}

pub fn alert_log(entries: &[AlertLogEntry]) -> String {
    if entries.is_empty() {
        return "no readings outside the current bounds".into();
    }
    entries
        .iter()
        .map(|e| format!("{}  {}", e.reading, join(&e.violations)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn join(kinds: &[Violation]) -> String {
    kinds.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// One-line sparkline of a metric with its range and latest value.
pub fn chart(metric: Metric, series: &[(i64, f64)]) -> String {
    let Some(&(_, last)) = series.last() else {
        return "no readings yet".into();
    };
    let (min, max) = series
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, v)| (lo.min(v), hi.max(v)));
    let unit = metric.unit();
    format!(
        "{}  min {min:.1}{unit}  max {max:.1}{unit}  now {last:.1}{unit}",
        sparkline(series.iter().map(|&(_, v)| v), min, max)
    )
}

fn sparkline(values: impl Iterator<Item = f64>, min: f64, max: f64) -> String {
    let span = max - min;
    values
        .map(|v| {
            if span <= f64::EPSILON {
                return BARS[BARS.len() / 2];
            }
            let idx = ((v - min) / span * (BARS.len() - 1) as f64).round() as usize;
            BARS[idx.min(BARS.len() - 1)]
        })
        .collect()
}

/// Hourly table of a historical day plus temperature and humidity charts.
pub fn historical(date: NaiveDate, points: &[SensorReading]) -> String {
    if points.is_empty() {
        return format!("no data for {date}");
    }
    let temps: Vec<(i64, f64)> = points.iter().map(|r| (r.timestamp, r.temperature)).collect();
    let humids: Vec<(i64, f64)> = points.iter().map(|r| (r.timestamp, r.humidity)).collect();
    let mut out = format!("{date}: {} points\n", points.len());
    let _ = writeln!(out, "temp  {}", chart(Metric::Temperature, &temps));
    let _ = writeln!(out, "humid {}", chart(Metric::Humidity, &humids));
    for r in points.iter().step_by(2) {
        let _ = writeln!(out, "  {r}");
    }
    out.trim_end().to_owned()
}

pub fn config(entries: &[(&str, String, &str)]) -> String {
    entries
        .iter()
        .map(|(key, value, desc)| format!("{key:<28} {value:<16} {desc}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use envmon_core::alert::AlertState;
    use envmon_core::types::ConnectionStatus;

    fn reading(temperature: f64, humidity: f64) -> SensorReading {
        SensorReading::derived(0, temperature, humidity, 1013.25)
    }

    #[test]
    fn sparkline_spans_the_range() {
        let series = [(0, 1.0), (1, 2.0), (2, 3.0)];
        let line = chart(Metric::Temperature, &series);
        assert!(line.starts_with("▁▅█"));
        assert!(line.contains("now 3.0°C"));
        assert_eq!(chart(Metric::Humidity, &[]), "no readings yet");
    }

    #[test]
    fn flat_series_draws_mid_bars() {
        assert_eq!(sparkline([5.0, 5.0].into_iter(), 5.0, 5.0), "▅▅");
    }

    #[test]
    fn announces_connection_and_onset() {
        let prev = DashboardStatus::default();
        let cur = DashboardStatus {
            connection: ConnectionStatus::ConnectedMock,
            current: Some(reading(31.0, 50.0)),
            alerts: AlertState { is_temp_alert: true, is_humid_alert: false },
            onsets: 1,
            ..DashboardStatus::default()
        };
        let lines = transitions(&prev, &cur);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "* connected (simulated)");
        assert!(lines[1].starts_with("ALERT temperature high"));
        assert!(transitions(&cur, &cur).is_empty());
    }

    #[test]
    fn announces_errors_once() {
        let prev = DashboardStatus::default();
        let cur = DashboardStatus {
            connection: ConnectionStatus::Error,
            last_error: Some("device returned status 503".into()),
            ..DashboardStatus::default()
        };
        assert_eq!(transitions(&prev, &cur).len(), 2);
        assert!(transitions(&cur, &cur).is_empty());
    }

    #[test]
    fn dashboard_without_reading() {
        let text = dashboard(&DashboardStatus::default());
        assert!(text.contains("disconnected"));
        assert!(text.contains("no reading yet"));
    }

    #[test]
    fn dashboard_flags_alerts() {
        let s = DashboardStatus {
            current: Some(reading(24.04, 75.0)),
            alerts: AlertState { is_temp_alert: false, is_humid_alert: true },
            ..DashboardStatus::default()
        };
        let text = dashboard(&s);
        assert!(text.contains("24.0 °C"));
        assert!(text.contains("75.0 %  [ALERT]"));
    }
}
