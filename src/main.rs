//! Rig remote - terminal control panel for the carriage rig

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rig_remote::cli::{self, Flow, ReplCommand};
use rig_remote::config::{AppConfig, ConfigWatcher};
use rig_remote::controller::Controller;
use rig_remote::input::gamepad::{self, GamepadSource};
use rig_remote::logger::{EventLogger, Journal, JournalLogger, TracingLogger};
use rig_remote::paths::AppPaths;
use rig_remote::session::TransportSession;
use rig_remote::transport::{LinkEvent, SimulatedRig, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportKind {
    /// Bluetooth LE link to the rig
    Ble,
    /// In-process simulated rig
    Sim,
}

impl Default for TransportKind {
    fn default() -> Self {
        if cfg!(feature = "ble") {
            Self::Ble
        } else {
            Self::Sim
        }
    }
}

/// Rig remote - drive the carriage rig from the terminal, keyboard or gamepad
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the application data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Link implementation
    #[arg(short, long, value_enum, env = "RIG_TRANSPORT", default_value_t = TransportKind::default())]
    transport: TransportKind,

    /// Connect to the rig on startup
    #[arg(long)]
    connect: bool,

    /// Ignore gamepads even if enabled in the config
    #[arg(long)]
    no_gamepad: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut paths = AppPaths::detect();
    if let Some(config) = &args.config {
        paths = paths.with_config(config);
    }
    paths.ensure_directories()?;

    let _log_guard = init_logging(&args.log_level, &paths)?;

    info!("Starting rig remote v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", paths.config.display());

    let (config_watcher, config) = if paths.config.exists() {
        let (watcher, config) = ConfigWatcher::new(&paths.config).await?;
        info!("Configuration loaded with hot-reload enabled");
        (Some(watcher), config)
    } else {
        info!("No configuration file, using defaults");
        (None, AppConfig::default())
    };

    let journal = if config.journal.enabled {
        Some(Journal::open(paths.journal_db_path()).context("Failed to open event journal")?)
    } else {
        None
    };
    let logger: Arc<dyn EventLogger> = match &journal {
        Some(journal) => Arc::new(JournalLogger::new(journal.clone())),
        None => Arc::new(TracingLogger),
    };

    let transport = make_transport(args.transport)?;
    let mut session = TransportSession::new(
        transport,
        config.gatt_profile(),
        config.scan_filter(),
        logger.clone(),
    );
    let events_rx = session
        .take_event_receiver()
        .context("Transport event receiver already taken")?;

    let mut controller = Controller::new(session, &config, logger);
    let gamepad = gamepad::open_source(config.gamepad.enabled && !args.no_gamepad);
    info!("Gamepad source: {}", gamepad.name());

    if args.connect {
        let _ = controller.connect().await;
    }

    let export_dir = config
        .journal
        .export_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    let app = App {
        controller,
        events_rx,
        gamepad,
        poll_interval: config.gamepad.poll_interval(),
        config_watcher,
        journal,
        export_dir,
        history: paths.state_dir.join("history.txt"),
    };
    app.run(shutdown_signal()).await?;

    info!("Rig remote shutdown complete");
    Ok(())
}

fn make_transport(kind: TransportKind) -> Result<Arc<dyn Transport>> {
    match kind {
        TransportKind::Sim => Ok(Arc::new(SimulatedRig::new("RigSim"))),
        #[cfg(feature = "ble")]
        TransportKind::Ble => Ok(Arc::new(rig_remote::transport::BtleplugTransport::new())),
        #[cfg(not(feature = "ble"))]
        TransportKind::Ble => {
            anyhow::bail!("this build has no Bluetooth support (enable the `ble` feature or use --transport sim)")
        }
    }
}

struct App {
    controller: Controller,
    events_rx: mpsc::UnboundedReceiver<LinkEvent>,
    gamepad: Box<dyn GamepadSource>,
    poll_interval: Duration,
    config_watcher: Option<ConfigWatcher>,
    journal: Option<Journal>,
    export_dir: PathBuf,
    history: PathBuf,
}

impl App {
    async fn run(mut self, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        let (line_tx, mut line_rx) = mpsc::channel::<String>(32);
        cli::spawn_reader(line_tx, Some(self.history.clone()));
        cli::print_help();

        let mut gamepad_tick = new_tick(self.poll_interval);

        info!("Event loop started");
        loop {
            tokio::select! {
                Some(line) = line_rx.recv() => {
                    match ReplCommand::parse(&line) {
                        Ok(command) => {
                            let flow = cli::execute(
                                command,
                                &mut self.controller,
                                self.journal.as_ref(),
                                &self.export_dir,
                            )
                            .await;
                            if flow == Flow::Quit {
                                break;
                            }
                        }
                        Err(e) => println!("{}", e.to_string().red()),
                    }
                }

                Some(event) = self.events_rx.recv() => {
                    self.controller.handle_transport_event(event).await;
                }

                _ = gamepad_tick.tick() => {
                    let snapshot = self.gamepad.poll();
                    // Nothing to diff while no pad is or was present
                    if snapshot.is_some() || self.controller.gamepad_present() {
                        self.controller.on_gamepad_snapshot(snapshot.as_ref()).await;
                    }
                }

                Some(new_config) = next_config(&mut self.config_watcher) => {
                    info!("Configuration file changed, applying");
                    self.controller.apply_config(&new_config);
                    if new_config.gamepad.poll_interval() != self.poll_interval {
                        self.poll_interval = new_config.gamepad.poll_interval();
                        gamepad_tick = new_tick(self.poll_interval);
                    }
                    if let Some(dir) = new_config.journal.export_dir {
                        self.export_dir = dir;
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping event loop");
                    break;
                }
            }
        }

        info!("Shutting down...");
        if self.controller.session().is_connected() {
            let _ = self.controller.disconnect().await;
        }
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.flush() {
                warn!("Failed to flush journal: {:#}", e);
            }
        }
        Ok(())
    }
}

fn new_tick(period: Duration) -> tokio::time::Interval {
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tick
}

async fn next_config(watcher: &mut Option<ConfigWatcher>) -> Option<AppConfig> {
    match watcher {
        Some(watcher) => watcher.next_config().await,
        None => std::future::pending().await,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Console layer on stderr plus a daily rolling file in the logs directory
fn init_logging(level: &str, paths: &AppPaths) -> Result<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::daily(&paths.logs_dir, "rig-remote.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}
