//! Terminal front end: REPL parsing and execution
//!
//! Lines are read on a dedicated OS thread (rustyline blocks) and handed to
//! the event loop over an mpsc channel. Execution runs on the event loop with
//! `&mut Controller`.

use chrono::Local;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::controller::{CommandIssuer, Controller, IssueOutcome};
use crate::input::InputId;
use crate::logger::Journal;
use crate::protocol::{form_for, CommandError, FieldRule, FormError, LogicalCommand, FORMS};

const PROMPT: &str = "rig> ";
const DEFAULT_LOG_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CliError {
    #[error("unknown command '{0}', type 'help'")]
    UnknownCommand(String),
    #[error("{command} needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("'{0}' is not a valid count")]
    InvalidCount(String),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// One parsed REPL line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Connect,
    Disconnect,
    /// Connect when disconnected, disconnect when connected
    Toggle,
    Status,
    Press(InputId),
    Release(InputId),
    Tap(InputId),
    Send(LogicalCommand),
    /// Auto-command form: opcode, seconds, cycles
    Auto {
        opcode: String,
        seconds: Option<String>,
        cycles: Option<String>,
    },
    Select(String),
    Raw(String),
    Timer,
    Log(usize),
    Export(Option<PathBuf>),
    ClearLog,
    Help,
    Quit,
}

/// Single characters are keyboard keys, longer names are panel buttons
fn parse_input(token: &str) -> InputId {
    if token.chars().count() == 1 {
        InputId::key(token)
    } else {
        InputId::pointer(token)
    }
}

impl ReplCommand {
    /// Parse a non-empty line
    pub fn parse(line: &str) -> Result<Self, CliError> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let args: Vec<&str> = rest.split_whitespace().collect();
        let first = args.first().copied();

        let command = match word.to_ascii_lowercase().as_str() {
            "connect" => Self::Connect,
            "disconnect" => Self::Disconnect,
            "toggle" => Self::Toggle,
            "status" => Self::Status,
            "press" => Self::Press(parse_input(first.ok_or(CliError::MissingArgument {
                command: "press",
                argument: "a key or button",
            })?)),
            "release" => Self::Release(parse_input(first.ok_or(
                CliError::MissingArgument {
                    command: "release",
                    argument: "a key or button",
                },
            )?)),
            "tap" => Self::Tap(parse_input(first.ok_or(CliError::MissingArgument {
                command: "tap",
                argument: "a key or button",
            })?)),
            "cmd" | "send" => {
                if rest.is_empty() {
                    return Err(CliError::MissingArgument {
                        command: "cmd",
                        argument: "a command name",
                    });
                }
                Self::Send(LogicalCommand::from_name(rest)?)
            }
            "auto" => {
                let opcode = first.ok_or(CliError::MissingArgument {
                    command: "auto",
                    argument: "an opcode",
                })?;
                let placeholder = |arg: Option<&&str>| {
                    arg.filter(|a| **a != "-").map(|a| a.to_string())
                };
                Self::Auto {
                    opcode: opcode.to_string(),
                    seconds: placeholder(args.get(1)),
                    cycles: placeholder(args.get(2)),
                }
            }
            "select" => Self::Select(
                first
                    .ok_or(CliError::MissingArgument {
                        command: "select",
                        argument: "an opcode",
                    })?
                    .to_string(),
            ),
            "raw" => {
                if rest.is_empty() {
                    return Err(CliError::MissingArgument {
                        command: "raw",
                        argument: "command text",
                    });
                }
                Self::Raw(rest.to_string())
            }
            "timer" => Self::Timer,
            "log" => match first {
                Some(count) => Self::Log(
                    count
                        .parse()
                        .map_err(|_| CliError::InvalidCount(count.to_string()))?,
                ),
                None => Self::Log(DEFAULT_LOG_LINES),
            },
            "export" => Self::Export(first.map(PathBuf::from)),
            "clear-log" => Self::ClearLog,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(CliError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

/// What the event loop should do after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Read lines on a blocking thread and forward them to the event loop
///
/// Ctrl-C or Ctrl-D at the prompt forwards `quit`.
pub fn spawn_reader(
    tx: mpsc::Sender<String>,
    history: Option<PathBuf>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                warn!("Terminal input unavailable: {}", e);
                return;
            }
        };
        if let Some(path) = history.as_ref().filter(|p| p.exists()) {
            if let Err(e) = rl.load_history(path) {
                debug!("Could not load history: {}", e);
            }
        }

        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(line.as_str());
                    let quit = matches!(ReplCommand::parse(&line), Ok(ReplCommand::Quit));
                    if tx.blocking_send(line).is_err() || quit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    let _ = tx.blocking_send("quit".to_string());
                    break;
                }
                Err(e) => {
                    warn!("Input error: {}", e);
                    let _ = tx.blocking_send("quit".to_string());
                    break;
                }
            }
        }

        if let Some(path) = &history {
            if let Err(e) = rl.save_history(path) {
                debug!("Could not save history: {}", e);
            }
        }
    })
}

pub fn print_help() {
    println!("\n{}", "Rig remote commands".bold().cyan());
    let rows = [
        ("connect | disconnect | toggle", "manage the link to the rig"),
        ("status", "connection state"),
        ("press <input> / release <input>", "hold and let go of a key or panel button"),
        ("tap <input>", "press and release"),
        ("cmd <name>", "send a command by name (up, stop, estop, 93, dows1s...)"),
        ("select <opcode>", "show the auto-command fields for an opcode"),
        ("auto <opcode> [seconds|-] [cycles]", "send an auto command; '-' uses the last run time"),
        ("raw <text>", "send free text"),
        ("timer", "run timer state"),
        ("log [n] | export [dir] | clear-log", "event journal"),
        ("help | quit", ""),
    ];
    for (usage, about) in rows {
        println!("  {:<38} {}", usage.yellow(), about);
    }
    println!(
        "\n  Inputs: single characters are keys ({}), names are panel buttons ({})",
        "8 2 6 4 5 3 0".green(),
        "up down forward back stop estop tool-on tool-off".green()
    );
    let opcodes: Vec<&str> = FORMS.iter().map(|f| f.opcode).collect();
    println!("  Auto opcodes: {}\n", opcodes.join(" ").green());
}

fn describe(rule: &FieldRule) -> String {
    match rule {
        FieldRule::Disabled => "disabled".to_string(),
        FieldRule::Enabled {
            min,
            max: Some(max),
            step,
        } => format!("{} to {}, step {}", min, max, step),
        FieldRule::Enabled { min, max: None, step } => format!("at least {}, step {}", min, step),
    }
}

/// Outcome text for commands issued from the prompt
fn report(outcome: IssueOutcome) {
    match outcome {
        IssueOutcome::Sent => {}
        IssueOutcome::NotConnected => println!("{}", "not connected".red()),
        IssueOutcome::Failed => println!("{}", "send failed".red()),
    }
}

/// Build the command from the auto-command form
///
/// A missing seconds value falls back to the last measured run.
pub fn build_auto(
    opcode: &str,
    seconds: Option<&str>,
    cycles: Option<&str>,
    default_seconds: Option<u64>,
) -> Result<LogicalCommand, FormError> {
    let form = form_for(opcode)?;
    let fallback = default_seconds.map(|s| s.to_string());
    let seconds = match seconds {
        Some(s) => Some(s),
        None if form.seconds.is_enabled() => fallback.as_deref(),
        None => None,
    };
    form.build(seconds, cycles)
}

/// Run one parsed command against the controller
pub async fn execute(
    command: ReplCommand,
    controller: &mut Controller,
    journal: Option<&Journal>,
    export_dir: &Path,
) -> Flow {
    match command {
        ReplCommand::Connect => {
            let _ = controller.connect().await;
        }
        ReplCommand::Disconnect => {
            let _ = controller.disconnect().await;
        }
        ReplCommand::Toggle => {
            let _ = controller.toggle_connection().await;
        }
        ReplCommand::Status => {
            let status = controller.session().status();
            let label = if status.is_connected() {
                status.label().green()
            } else {
                status.label().yellow()
            };
            println!("{} via {}", label, controller.session().transport_name());
        }
        ReplCommand::Press(input) => {
            if let Some(outcome) = controller.press(&input).await {
                report(outcome);
            }
        }
        ReplCommand::Release(input) => {
            if let Some(outcome) = controller.release(&input).await {
                report(outcome);
            }
        }
        ReplCommand::Tap(input) => {
            for outcome in controller.tap(&input).await {
                report(outcome);
            }
        }
        ReplCommand::Send(command) => report(controller.issue(command).await),
        ReplCommand::Auto {
            opcode,
            seconds,
            cycles,
        } => {
            let default = controller.default_cycle_seconds();
            match build_auto(&opcode, seconds.as_deref(), cycles.as_deref(), default) {
                Ok(command) => report(controller.issue(command).await),
                Err(e) => controller.logger().log(&e.to_string(), true),
            }
        }
        ReplCommand::Select(opcode) => match form_for(&opcode) {
            Ok(form) => {
                controller.logger().log(form.hint, false);
                if form.seconds.is_enabled() {
                    let default = controller
                        .default_cycle_seconds()
                        .filter(|_| form.cycles.is_enabled())
                        .map_or_else(String::new, |s| format!(" (default {}s)", s));
                    println!("  seconds: {}{}", describe(&form.seconds), default);
                }
                if form.cycles.is_enabled() {
                    println!("  cycles:  {}", describe(&form.cycles));
                }
            }
            Err(e) => controller.logger().log(&e.to_string(), true),
        },
        ReplCommand::Raw(text) => match text.parse::<LogicalCommand>() {
            Ok(command) => report(controller.issue(command).await),
            Err(e) => controller.logger().log(&e.to_string(), true),
        },
        ReplCommand::Timer => {
            let timer = controller.timer();
            match timer.running_for(Instant::now()) {
                Some(elapsed) => println!("running for {:.2}s", elapsed.as_secs_f64()),
                None => println!("idle"),
            }
            match timer.last_measurement() {
                Some(m) => println!(
                    "last run {}s, auto-cycle default {}s",
                    m.display().green(),
                    m.rounded_secs()
                ),
                None => println!("no run measured yet"),
            }
        }
        ReplCommand::Log(count) => match journal {
            Some(journal) => match journal.recent(count) {
                Ok(entries) => {
                    for entry in entries {
                        let line = entry.render();
                        if entry.is_error {
                            println!("{}", line.red());
                        } else {
                            println!("{}", line);
                        }
                    }
                }
                Err(e) => warn!("Failed to read journal: {:#}", e),
            },
            None => println!("{}", "journal disabled".yellow()),
        },
        ReplCommand::Export(dir) => match journal {
            Some(journal) => {
                let dir = dir.unwrap_or_else(|| export_dir.to_path_buf());
                match journal.export(&dir, Local::now()).await {
                    Ok(Some(path)) => println!("exported to {}", path.display().to_string().green()),
                    Ok(None) => println!("nothing to export"),
                    Err(e) => controller.logger().log(&format!("export failed: {:#}", e), true),
                }
            }
            None => println!("{}", "journal disabled".yellow()),
        },
        ReplCommand::ClearLog => match journal {
            Some(journal) => match journal.clear() {
                Ok(()) => println!("journal cleared"),
                Err(e) => warn!("Failed to clear journal: {:#}", e),
            },
            None => println!("{}", "journal disabled".yellow()),
        },
        ReplCommand::Help => print_help(),
        ReplCommand::Quit => return Flow::Quit,
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::logger::MemoryLogger;
    use crate::protocol::Seconds;
    use crate::session::TransportSession;
    use crate::transport::{GattProfile, ScanFilter, SimulatedRig};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn make_controller(rig: &SimulatedRig) -> (Controller, Arc<MemoryLogger>) {
        let logger = Arc::new(MemoryLogger::new());
        let session = TransportSession::new(
            Arc::new(rig.clone()),
            GattProfile::default(),
            ScanFilter::default(),
            logger.clone(),
        );
        (
            Controller::new(session, &AppConfig::default(), logger.clone()),
            logger,
        )
    }

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(ReplCommand::parse("connect"), Ok(ReplCommand::Connect));
        assert_eq!(ReplCommand::parse("  QUIT "), Ok(ReplCommand::Quit));
        assert_eq!(ReplCommand::parse("log"), Ok(ReplCommand::Log(DEFAULT_LOG_LINES)));
        assert_eq!(ReplCommand::parse("log 5"), Ok(ReplCommand::Log(5)));
        assert_eq!(
            ReplCommand::parse("log many"),
            Err(CliError::InvalidCount("many".to_string()))
        );
        assert_eq!(
            ReplCommand::parse("dance"),
            Err(CliError::UnknownCommand("dance".to_string()))
        );
    }

    #[test]
    fn test_parse_inputs() {
        assert_eq!(ReplCommand::parse("press 8"), Ok(ReplCommand::Press(InputId::key("8"))));
        assert_eq!(
            ReplCommand::parse("release Up"),
            Ok(ReplCommand::Release(InputId::pointer("up")))
        );
        assert!(matches!(
            ReplCommand::parse("tap"),
            Err(CliError::MissingArgument { command: "tap", .. })
        ));
    }

    #[test]
    fn test_parse_send_and_auto() {
        assert_eq!(
            ReplCommand::parse("cmd estop"),
            Ok(ReplCommand::Send(LogicalCommand::EmergencyStop))
        );
        assert!(matches!(
            ReplCommand::parse("cmd nonsense"),
            Err(CliError::Command(CommandError::UnknownName(_)))
        ));
        assert_eq!(
            ReplCommand::parse("auto atl - 3"),
            Ok(ReplCommand::Auto {
                opcode: "atl".to_string(),
                seconds: None,
                cycles: Some("3".to_string()),
            })
        );
        assert_eq!(
            ReplCommand::parse("raw hello rig"),
            Ok(ReplCommand::Raw("hello rig".to_string()))
        );
    }

    #[test]
    fn test_build_auto_uses_timer_default() {
        assert_eq!(
            build_auto("atl", None, Some("2"), Some(7)),
            Ok(LogicalCommand::AutoCycleNear { seconds: Seconds::whole(7), cycles: 2 })
        );
        assert_eq!(
            build_auto("atr", Some("4"), Some("1"), Some(7)),
            Ok(LogicalCommand::AutoCycleFar { seconds: Seconds::whole(4), cycles: 1 })
        );
        assert!(matches!(
            build_auto("atl", None, Some("2"), None),
            Err(FormError::Missing { field: "seconds", .. })
        ));
        assert!(matches!(
            build_auto("dows", Some("9"), None, None),
            Err(FormError::OutOfRange { .. })
        ));
        assert_eq!(build_auto("99", None, None, Some(3)), Ok(LogicalCommand::EmergencyStop));
    }

    #[tokio::test]
    async fn test_execute_auto_after_measured_run() {
        let rig = SimulatedRig::new("RigSim");
        let (mut controller, _logger) = make_controller(&rig);
        let dir = tempdir().unwrap();

        execute(ReplCommand::Connect, &mut controller, None, dir.path()).await;
        execute(ReplCommand::Raw("21".to_string()), &mut controller, None, dir.path()).await;
        execute(ReplCommand::parse("cmd stop").unwrap(), &mut controller, None, dir.path()).await;
        assert!(controller.default_cycle_seconds().is_some());

        execute(ReplCommand::parse("auto atl 5 2").unwrap(), &mut controller, None, dir.path()).await;
        assert_eq!(
            rig.written(),
            vec![b"21\0".to_vec(), b"93\0".to_vec(), b"atl5s2c\0".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_execute_invalid_form_logs_error() {
        let rig = SimulatedRig::new("RigSim");
        let (mut controller, logger) = make_controller(&rig);
        let dir = tempdir().unwrap();

        execute(ReplCommand::Connect, &mut controller, None, dir.path()).await;
        execute(ReplCommand::parse("auto setd 0").unwrap(), &mut controller, None, dir.path()).await;

        assert!(rig.written().is_empty());
        assert_eq!(logger.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_export_journal() {
        let rig = SimulatedRig::new("RigSim");
        let (mut controller, _logger) = make_controller(&rig);
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path().join("journal")).unwrap();
        journal
            .append(&crate::logger::LogEntry::new("scanning for devices...", false))
            .unwrap();

        let exports = dir.path().join("exports");
        execute(ReplCommand::Export(None), &mut controller, Some(&journal), &exports).await;

        let files: Vec<_> = std::fs::read_dir(&exports).unwrap().collect();
        assert_eq!(files.len(), 1);

        let flow = execute(ReplCommand::Quit, &mut controller, Some(&journal), &exports).await;
        assert_eq!(flow, Flow::Quit);
    }
}
