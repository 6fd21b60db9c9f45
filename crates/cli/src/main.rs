mod command;
mod render;

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use envmon_core::analysis::Analyst;
use envmon_core::config::MonitorCfg;
use envmon_core::history::HistoryBuffer;
use envmon_core::runtime::{Command, DashboardStatus, Monitor};
use envmon_core::sound::SoundNotifier;
use envmon_core::types::SensorReading;
use envmon_llm::provider::LlmProvider;
use rustyline::error::ReadlineError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::command::{Action, HELP};

const DEFAULT_LOG_FILE: &str = "/tmp/envmon.log";
const PROMPT: &str = "envmon> ";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing: write to file when RUST_LOG is set so the REPL stays readable
    if std::env::var("RUST_LOG").is_ok() {
        let path = std::env::var("ENVMON_LOG_FILE").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_owned());
        let file = std::fs::File::create(&path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(fmt::layer().json().with_target(true).with_writer(file))
            .init();
    }

    let cfg = Arc::new(MonitorCfg::from_env());

    let provider: Option<Arc<dyn LlmProvider>> =
        envmon_llm::http::from_env(cfg.analysis_timeout()).map(|p| Arc::new(p) as _);
    let analyst = Analyst::new(provider, cfg.analysis_timeout());
    let startup_notice = (!analyst.is_configured())
        .then(|| "note: ENVMON_LLM_API_KEY is not set, `analyze` will only return the fallback message".to_owned());
    let notifier = SoundNotifier::new(cfg.audio_sample_rate);

    let (mut monitor, status_rx) = Monitor::new(Arc::clone(&cfg), analyst, notifier);
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let token = monitor.token();
    spawn_sigint_canceler(token.clone());

    let repl_token = token.clone();
    let monitor_fut = monitor.run(cmd_rx);
    let repl_fut = run_repl(cmd_tx, status_rx, repl_token, cfg, startup_notice);
    tokio::pin!(monitor_fut);
    tokio::pin!(repl_fut);

    tokio::select! {
        _ = &mut monitor_fut => {
            token.cancel();
            (&mut repl_fut).await
        }
        result = &mut repl_fut => {
            token.cancel();
            (&mut monitor_fut).await;
            result
        }
    }
}

/// Request awaiting a reply from the monitor. One at a time; the prompt is
/// withheld until it resolves.
enum Pending {
    Analysis(oneshot::Receiver<String>),
    History(NaiveDate, oneshot::Receiver<Vec<SensorReading>>),
}

enum Reply {
    Analysis(String),
    History(NaiveDate, Vec<SensorReading>),
    Dropped,
}

enum Ui {
    Spin,
    Input(Option<InputEvent>),
    Status,
    Reply(Reply),
}

async fn run_repl(
    cmd_tx: mpsc::Sender<Command>,
    mut status_rx: watch::Receiver<DashboardStatus>,
    token: CancellationToken,
    cfg: Arc<MonitorCfg>,
    startup_notice: Option<String>,
) -> anyhow::Result<()> {
    const SPINNER: [&str; 4] = ["-", "\\", "|", "/"];

    println!("envmon: environmental monitor. type `help` for commands.");
    if let Some(notice) = startup_notice {
        println!("{notice}");
    }
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<InputEvent>();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
    spawn_input_thread(line_tx, ready_rx);
    request_next_prompt(&ready_tx);

    let mut last = status_rx.borrow_and_update().clone();
    let mut pending: Option<Pending> = None;
    let mut spinner_idx: usize = 0;
    let mut spinner_interval = tokio::time::interval(Duration::from_millis(100));
    spinner_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            _ = spinner_interval.tick(), if pending.is_some() => Ui::Spin,
            line = line_rx.recv() => Ui::Input(line),
            changed = status_rx.changed() => match changed {
                Ok(()) => Ui::Status,
                Err(_) => break,
            },
            reply = wait_reply(&mut pending) => Ui::Reply(reply),
        };

        match event {
            Ui::Spin => {
                spinner_idx = (spinner_idx + 1) % SPINNER.len();
                draw_waiting_frame(SPINNER[spinner_idx])?;
            }
            Ui::Status => {
                let cur = status_rx.borrow_and_update().clone();
                let lines = render::transitions(&last, &cur);
                if !lines.is_empty() {
                    clear_current_line()?;
                    for line in lines {
                        println!("{line}");
                    }
                    if pending.is_none() {
                        print!("{PROMPT}");
                        io::stdout().flush()?;
                    }
                }
                last = cur;
            }
            Ui::Reply(reply) => {
                pending = None;
                clear_current_line()?;
                match reply {
                    Reply::Analysis(text) => println!("{text}"),
                    Reply::History(date, points) => println!("{}", render::historical(date, &points)),
                    Reply::Dropped => println!("request was dropped"),
                }
                request_next_prompt(&ready_tx);
            }
            Ui::Input(None) | Ui::Input(Some(InputEvent::Eof)) => break,
            Ui::Input(Some(InputEvent::Interrupted)) => {
                token.cancel();
                break;
            }
            Ui::Input(Some(InputEvent::Error(err))) => {
                eprintln!("input error: {err}");
                break;
            }
            Ui::Input(Some(InputEvent::Line(line))) => {
                let text = line.trim();
                if text.is_empty() {
                    request_next_prompt(&ready_tx);
                    continue;
                }
                let action = match command::parse(text) {
                    Ok(action) => action,
                    Err(e) => {
                        println!("{e}");
                        request_next_prompt(&ready_tx);
                        continue;
                    }
                };
                if action == Action::Quit {
                    let _ = cmd_tx.send(Command::Shutdown).await;
                    break;
                }
                let snapshot = status_rx.borrow().clone();
                match dispatch(action, &snapshot, &cmd_tx, &cfg).await {
                    Ok(Some(p)) => {
                        pending = Some(p);
                        spinner_idx = 0;
                        draw_waiting_frame(SPINNER[spinner_idx])?;
                    }
                    Ok(None) => request_next_prompt(&ready_tx),
                    Err(_) => break,
                }
            }
        }
    }
    drop(ready_tx);

    if pending.is_some() {
        clear_current_line()?;
    }
    println!();
    Ok(())
}

/// Run one action. Returns a pending request when the monitor will answer
/// asynchronously; errors only when the monitor has gone away.
async fn dispatch(
    action: Action,
    status: &DashboardStatus,
    cmd_tx: &mpsc::Sender<Command>,
    cfg: &MonitorCfg,
) -> Result<Option<Pending>, mpsc::error::SendError<Command>> {
    let mut thresholds = status.thresholds;
    let cmd = match action {
        Action::Help => {
            println!("{HELP}");
            return Ok(None);
        }
        Action::Quit => Command::Shutdown,
        Action::Mock => Command::ConnectMock,
        Action::Connect(ip) => Command::ConnectDevice(ip),
        Action::Disconnect => Command::Disconnect,
        Action::Status => {
            println!("{}", render::dashboard(status));
            return Ok(None);
        }
        Action::Thresholds => {
            println!("{}", render::thresholds(&thresholds));
            return Ok(None);
        }
        Action::SetTemp { min, max } => {
            thresholds.temp_min = min;
            thresholds.temp_max = max;
            Command::SetThresholds(thresholds)
        }
        Action::SetHumid { min, max } => {
            thresholds.humid_min = min;
            thresholds.humid_max = max;
            Command::SetThresholds(thresholds)
        }
        Action::SoundOn => {
            thresholds.sound_enabled = true;
            Command::SetThresholds(thresholds)
        }
        Action::SoundOff => {
            thresholds.sound_enabled = false;
            Command::SetThresholds(thresholds)
        }
        Action::SoundPattern(sound) => {
            thresholds.sound_type = sound;
            cmd_tx.send(Command::SetThresholds(thresholds)).await?;
            Command::PreviewSound(sound)
        }
        Action::Analyze => {
            let (tx, rx) = oneshot::channel();
            cmd_tx.send(Command::Analyze(tx)).await?;
            return Ok(Some(Pending::Analysis(rx)));
        }
        Action::History(date) => {
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            let (tx, rx) = oneshot::channel();
            cmd_tx.send(Command::QueryHistory(date, tx)).await?;
            return Ok(Some(Pending::History(date, rx)));
        }
        Action::Log => {
            let history = HistoryBuffer::from_readings(cfg.history_capacity, status.history.iter().copied());
            println!("{}", render::alert_log(&history.alert_log(&thresholds)));
            return Ok(None);
        }
        Action::Chart(metric) => {
            let history = HistoryBuffer::from_readings(cfg.history_capacity, status.history.iter().copied());
            println!("{}", render::chart(metric, &history.series(metric)));
            return Ok(None);
        }
        Action::Config => {
            println!("{}", render::config(&cfg.to_entries()));
            return Ok(None);
        }
    };
    cmd_tx.send(cmd).await?;
    Ok(None)
}

async fn wait_reply(pending: &mut Option<Pending>) -> Reply {
    match pending {
        Some(Pending::Analysis(rx)) => rx.await.map(Reply::Analysis).unwrap_or(Reply::Dropped),
        Some(Pending::History(date, rx)) => {
            let date = *date;
            rx.await.map(|points| Reply::History(date, points)).unwrap_or(Reply::Dropped)
        }
        None => std::future::pending().await,
    }
}

fn draw_waiting_frame(frame: &str) -> anyhow::Result<()> {
    print!("\rwaiting... {frame}");
    io::stdout().flush()?;
    Ok(())
}

fn clear_current_line() -> anyhow::Result<()> {
    print!("\r\x1b[2K");
    io::stdout().flush()?;
    Ok(())
}

fn request_next_prompt(ready_tx: &std::sync::mpsc::Sender<()>) {
    let _ = ready_tx.send(());
}

fn spawn_input_thread(
    line_tx: mpsc::UnboundedSender<InputEvent>,
    ready_rx: std::sync::mpsc::Receiver<()>,
) {
    std::thread::spawn(move || {
        let mut editor = match rustyline::DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                let _ = line_tx.send(InputEvent::Error(e.to_string()));
                return;
            }
        };

        while ready_rx.recv().is_ok() {
            match editor.readline(PROMPT) {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    if line_tx.send(InputEvent::Line(line)).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    let _ = line_tx.send(InputEvent::Interrupted);
                    break;
                }
                Err(ReadlineError::Eof) => {
                    let _ = line_tx.send(InputEvent::Eof);
                    break;
                }
                Err(e) => {
                    let _ = line_tx.send(InputEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    });
}

enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
    Error(String),
}

fn spawn_sigint_canceler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            if let Ok(mut sigint) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            {
                let _ = sigint.recv().await;
                tracing::info!("received SIGINT, shutting down");
                token.cancel();
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        }
    });
}
