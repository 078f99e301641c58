pub mod category;
pub mod db;
pub mod errors;
pub mod models;
pub mod notify;
pub mod policy;
pub mod service;

pub use crate::errors::{AppError, AppResult};
pub use crate::service::LeadService;

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// `<platform data dir>/leadtrack`, or `./leadtrack` when the platform has none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("leadtrack")
}

/// Prepares the data directory, installs logging and opens the service.
pub fn open(data_dir: &Path) -> AppResult<LeadService> {
    std::fs::create_dir_all(data_dir)?;
    if let Err(error) = init_tracing(data_dir) {
        // A subscriber may already be installed, e.g. when embedded.
        eprintln!("logging disabled: {}", error);
    }
    LeadService::new(data_dir)
}

pub fn init_tracing(data_dir: &Path) -> Result<(), String> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "leadtrack.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
