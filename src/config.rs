use crate::notify::Permission;
use std::path::PathBuf;
use std::time::Duration;

/// Output of the console surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Single status line redrawn in place
    #[default]
    Text,
    /// One JSON event per line
    Json,
}

/// Конфигурация виджета (server, интервалы, хранилище, уведомления)
#[derive(Debug, Clone)]
pub struct TimerConfig {
    pub server_base_url: String,
    pub poll_interval: Duration,
    pub tick_interval: Duration,
    pub http_timeout_secs: u64,
    pub db_path: PathBuf,
    pub notifications: Permission,
    pub output: OutputFormat,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            server_base_url: "http://127.0.0.1:5000".to_string(),
            poll_interval: Duration::from_secs(5),
            tick_interval: Duration::from_secs(1),
            http_timeout_secs: 30,
            db_path: default_db_path(),
            notifications: Permission::Undetermined,
            output: OutputFormat::Text,
        }
    }
}

/// `<data_dir>/golden-timer/golden-timer.db`, or the working directory when no data dir exists
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("golden-timer"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("golden-timer.db")
}
