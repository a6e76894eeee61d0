pub mod commands;
pub mod config;
mod coordinator;
pub mod db;
pub mod errors;
pub mod guard;
pub mod indexer;
pub mod models;
pub mod recorder;
pub mod snapshot;
pub mod undo;

pub use crate::commands::NotebookService;
pub use crate::config::{HistoryConfig, TransactionMode};
pub use crate::db::{Database, StoreCapabilities};
pub use crate::errors::{AppError, AppResult};
pub use crate::guard::apply_undo_for_notebook_event;
pub use crate::indexer::{NoopIndexer, SearchIndexer};
pub use crate::recorder::{append_notebook_event, verify_chain, EventLimits};

use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs the global subscriber. `RUST_LOG` overrides `config.log_filter`.
/// With `log_dir` set, JSON lines go to a daily rolling `history.log`.
pub fn init_tracing(config: &HistoryConfig) -> AppResult<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter));

    let Some(log_dir) = config.log_dir.as_ref() else {
        return tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| AppError::Internal(error.to_string()));
    };

    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "history.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
