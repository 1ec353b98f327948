use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing::{debug, error, info, warn};
mod config;
mod database;
mod engine;
mod ipc;
mod models;
mod network;
mod notify;
pub use crate::config::{OutputFormat, TimerConfig};
pub use crate::database::Database;
pub use crate::engine::{
    format_elapsed, parse_anchor, plan_start, reconcile, system_clock, Clock, Effect, GoldenPhase,
    StartReason, TimerEngine, TimerState, ANCHOR_KEY,
};
pub use crate::ipc::{ConsoleSurface, Surface, GOLDEN_TEXT};
pub use crate::models::{NotificationRequest, ServerStatus, SurfaceSnapshot};
pub use crate::network::{StatusClient, StatusError};
pub use crate::notify::{DesktopNotifier, Notifier, Permission};


/// Day-start timer synced with the server, with golden hour notifications
#[derive(Parser)]
#[command(name = "golden-timer", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Server base URL serving /start and /status
    #[arg(long, global = true)]
    server: Option<String>,

    /// SQLite file holding the persisted anchor
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resume, poll the server and render the timer (default). Press Enter to start.
    Run {
        /// Perform the start action right away
        #[arg(long)]
        start: bool,

        /// Notification permission state
        #[arg(long, value_enum, default_value = "ask")]
        notifications: Permission,

        /// Surface output
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Fetch /status once and print it as JSON
    Status,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // По умолчанию info (если RUST_LOG не задан); логи в stderr, stdout занят surface
    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = TimerConfig::default();
    if let Some(server) = cli.server {
        config.server_base_url = server;
    }
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }

    // Один поток: таймеры и ответы сети чередуются на одном event loop
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let client = StatusClient::new(&config.server_base_url, config.http_timeout_secs);

    match cli.command.unwrap_or(Commands::Run {
        start: false,
        notifications: Permission::Undetermined,
        output: OutputFormat::Text,
    }) {
        Commands::Status => rt.block_on(async {
            match client.fetch_status().await {
                Ok(status) => match serde_json::to_string_pretty(&status) {
                    Ok(json) => {
                        println!("{}", json);
                        ExitCode::SUCCESS
                    }
                    Err(e) => {
                        eprintln!("Failed to encode status: {}", e);
                        ExitCode::FAILURE
                    }
                },
                Err(e) => {
                    eprintln!("Failed to fetch status from {}: {}", config.server_base_url, e);
                    ExitCode::FAILURE
                }
            }
        }),
        Commands::Run {
            start,
            notifications,
            output,
        } => {
            config.notifications = notifications;
            config.output = output;
            let db = match open_database(&config.db_path) {
                Ok(db) => Arc::new(db),
                Err(e) => {
                    eprintln!("{}", e);
                    return ExitCode::FAILURE;
                }
            };
            rt.block_on(run_widget(config, db, client, start));
            ExitCode::SUCCESS
        }
    }
}

/// Resume, optionally start, then poll forever. Never returns under normal operation.
async fn run_widget(config: TimerConfig, db: Arc<Database>, client: StatusClient, start: bool) {
    let surface: Arc<dyn Surface> = Arc::new(ConsoleSurface::new(config.output));
    let notifier: Arc<dyn Notifier> = Arc::new(DesktopNotifier::new(config.notifications));
    let engine = Arc::new(
        TimerEngine::new(Some(db), surface, notifier).with_tick_interval(config.tick_interval),
    );

    engine.resume_from_persisted();

    if start {
        if let Err(e) = engine.start_run(Some(&client)) {
            error!("[TIMER] Start failed: {}", e);
        }
    }

    // Enter на stdin — кнопка start
    let engine_for_input = engine.clone();
    let client_for_input = client.clone();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(_)) => {
                    if let Err(e) = engine_for_input.start_run(Some(&client_for_input)) {
                        error!("[TIMER] Start failed: {}", e);
                    }
                }
                Ok(None) => {
                    debug!("[INPUT] stdin closed, start only via --start or server");
                    break;
                }
                Err(e) => {
                    warn!("[INPUT] Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    info!(
        "[SYNC] Polling {} every {:?}",
        config.server_base_url, config.poll_interval
    );
    engine.run_poll_loop(client, config.poll_interval).await;
}

/// Open the anchor store, creating the directory. A corrupted file is moved aside once and
/// replaced with a fresh database.
pub fn open_database(db_path: &Path) -> Result<Database, String> {
    if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| {
            let msg = match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    "Permission denied. Check data directory is writable."
                }
                _ => "Failed to create data directory.",
            };
            format!("{} Path: {} — {}", msg, dir.display(), e)
        })?;
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| format!("Database path contains invalid UTF-8: {}", db_path.display()))?;

    match Database::new(db_path_str) {
        Ok(db) => Ok(db),
        Err(e) => {
            let err_str = e.to_string();
            let is_corruption = err_str.contains("corruption") || err_str.contains("integrity");
            if !is_corruption || !db_path.exists() {
                return Err(format!("Failed to initialize database: {}", e));
            }
            let backup_path = PathBuf::from(format!(
                "{}.corrupted.{}",
                db_path_str,
                chrono::Utc::now().timestamp()
            ));
            std::fs::rename(db_path, &backup_path).map_err(|rename_e| {
                format!(
                    "Database corrupted and could not backup to {}: {} ({})",
                    backup_path.display(),
                    e,
                    rename_e
                )
            })?;
            info!(
                "[DB] Corrupted DB backed up to {:?}, starting fresh",
                backup_path
            );
            Database::new(db_path_str).map_err(|e2| format!("Failed to create fresh database: {}", e2))
        }
    }
}
