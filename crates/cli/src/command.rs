use chrono::NaiveDate;
use envmon_core::history::archive::parse_date;
use envmon_core::types::{Metric, SoundType};

/// One parsed REPL line.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Help,
    Quit,
    Mock,
    Connect(Option<String>),
    Disconnect,
    Status,
    Thresholds,
    SetTemp { min: f64, max: f64 },
    SetHumid { min: f64, max: f64 },
    SoundOn,
    SoundOff,
    SoundPattern(SoundType),
    Analyze,
    /// `None` means today.
    History(Option<NaiveDate>),
    Log,
    Chart(Metric),
    Config,
}

pub const HELP: &str = "\
commands:
  mock                      connect to the simulated sensor
  connect [ip]              connect to a device (GET http://<ip>/data)
  disconnect                stop polling
  status                    current reading, alerts and connection
  thresholds                show alert bounds
  temp <min> <max>          set temperature bounds (°C)
  humid <min> <max>         set humidity bounds (%)
  sound on|off              toggle the alert sound
  sound beep|alarm|chime    pick the alert pattern (plays a preview)
  analyze                   AI assessment of the current reading
  history [YYYY-MM-DD]      one day of historical readings
  log                       readings outside the current bounds
  chart <metric>            temp, humid, pressure or alt over the rolling history
  config                    effective configuration
  quit";

pub fn parse(line: &str) -> Result<Action, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".into());
    };
    let args: Vec<&str> = words.collect();

    let action = match (head.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("help" | "?", []) => Action::Help,
        ("quit" | "exit" | "q" | "/q" | "/quit" | "/exit", []) => Action::Quit,
        ("mock", []) => Action::Mock,
        ("connect", []) => Action::Connect(None),
        ("connect", [ip]) => Action::Connect(Some((*ip).to_owned())),
        ("disconnect", []) => Action::Disconnect,
        ("status", []) => Action::Status,
        ("thresholds", []) => Action::Thresholds,
        ("temp", [min, max]) => {
            let (min, max) = bounds(min, max)?;
            Action::SetTemp { min, max }
        }
        ("humid", [min, max]) => {
            let (min, max) = bounds(min, max)?;
            Action::SetHumid { min, max }
        }
        ("sound", [arg]) => match arg.to_ascii_lowercase().as_str() {
            "on" => Action::SoundOn,
            "off" => Action::SoundOff,
            pattern => Action::SoundPattern(pattern.parse()?),
        },
        ("analyze", []) => Action::Analyze,
        ("history", []) => Action::History(None),
        ("history", [date]) => Action::History(Some(parse_date(date).map_err(|e| e.to_string())?)),
        ("log", []) => Action::Log,
        ("chart", [metric]) => Action::Chart(metric.parse()?),
        ("config", []) => Action::Config,
        (other, _) => return Err(format!("unknown command or arguments: {other} (try `help`)")),
    };
    Ok(action)
}

fn bounds(min: &str, max: &str) -> Result<(f64, f64), String> {
    let min: f64 = min.parse().map_err(|_| format!("not a number: {min}"))?;
    let max: f64 = max.parse().map_err(|_| format!("not a number: {max}"))?;
    if !min.is_finite() || !max.is_finite() {
        return Err("bounds must be finite".into());
    }
    if min > max {
        return Err(format!("min {min} is above max {max}"));
    }
    Ok((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connection_commands() {
        assert_eq!(parse("mock"), Ok(Action::Mock));
        assert_eq!(parse("  connect  "), Ok(Action::Connect(None)));
        assert_eq!(parse("connect 10.0.0.7"), Ok(Action::Connect(Some("10.0.0.7".into()))));
        assert_eq!(parse("DISCONNECT"), Ok(Action::Disconnect));
    }

    #[test]
    fn parses_bounds() {
        assert_eq!(parse("temp 16 26.5"), Ok(Action::SetTemp { min: 16.0, max: 26.5 }));
        assert_eq!(parse("humid 40 60"), Ok(Action::SetHumid { min: 40.0, max: 60.0 }));
        assert!(parse("temp 30 20").is_err());
        assert!(parse("temp warm 20").is_err());
        assert!(parse("temp 20").is_err());
        assert!(parse("humid NaN 60").is_err());
    }

    #[test]
    fn parses_sound_settings() {
        assert_eq!(parse("sound off"), Ok(Action::SoundOff));
        assert_eq!(parse("Sound On"), Ok(Action::SoundOn));
        assert_eq!(parse("sound OFF"), Ok(Action::SoundOff));
        assert_eq!(parse("sound Alarm"), Ok(Action::SoundPattern(SoundType::Alarm)));
        assert!(parse("sound siren").is_err());
    }

    #[test]
    fn parses_history_and_chart() {
        assert_eq!(parse("history"), Ok(Action::History(None)));
        assert_eq!(
            parse("history 2024-01-01"),
            Ok(Action::History(NaiveDate::from_ymd_opt(2024, 1, 1)))
        );
        assert!(parse("history yesterday").is_err());
        assert_eq!(parse("chart humid"), Ok(Action::Chart(Metric::Humidity)));
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(parse("reboot").is_err());
        assert!(parse("mock now").is_err());
    }
}
