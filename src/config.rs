use crate::errors::{AppError, AppResult};
use crate::recorder::EventLimits;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionMode {
    #[default]
    Auto,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryConfig {
    pub database_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub log_filter: String,
    pub transactions: TransactionMode,
    pub summary_max_chars: usize,
    pub error_max_chars: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        let limits = EventLimits::default();
        Self {
            database_path: PathBuf::from("notebook-history.sqlite"),
            log_dir: None,
            log_filter: "info".to_string(),
            transactions: TransactionMode::Auto,
            summary_max_chars: limits.summary_max_chars,
            error_max_chars: limits.error_max_chars,
        }
    }
}

impl HistoryConfig {
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path).map_err(|error| {
            AppError::Io(format!("failed to read config {}: {}", path.display(), error))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn event_limits(&self) -> EventLimits {
        EventLimits {
            summary_max_chars: self.summary_max_chars,
            error_max_chars: self.error_max_chars,
        }
    }

    fn validate(&self) -> AppResult<()> {
        // Room for at least one character plus the ellipsis marker.
        if self.summary_max_chars < 2 || self.error_max_chars < 2 {
            return Err(AppError::InvalidInput(
                "summaryMaxChars and errorMaxChars must be at least 2".to_string(),
            ));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(AppError::InvalidInput("databasePath cannot be empty".to_string()));
        }
        Ok(())
    }
}
