mod events;
mod notebooks;
mod notes;
mod publications;
mod sharing;

pub use events::{
    claim_undo, get_event, has_newer_live_event, insert_event, latest_event, list_events, release_undo,
};
pub use notebooks::{
    delete_index_state, delete_notebook_row, get_notebook, insert_notebook, mark_index_dirty,
    set_notebook_fields, set_note_order, set_publication_state, upsert_notebook,
};
pub use notes::{
    delete_notes_for_notebook, detach_notes_from_notebook, get_note, insert_note, list_notes_for_notebook,
    set_note_notebook, upsert_note,
};
pub use publications::{
    delete_document, delete_publication, get_document, get_publication, get_publication_by_slug, upsert_document,
    upsert_publication,
};
pub use sharing::{
    delete_memberships, delete_share_links, insert_share_link, list_memberships, list_share_links,
    upsert_membership,
};

use crate::config::TransactionMode;
use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = include_str!("schema.sql");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    pub transactions: bool,
}

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    capabilities: StoreCapabilities,
}

impl Database {
    pub fn new(path: &Path, mode: TransactionMode) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let transactions = match mode {
            TransactionMode::Enabled => true,
            TransactionMode::Disabled => false,
            TransactionMode::Auto => probe_transactions(&conn),
        };
        tracing::info!(
            path = %path.to_string_lossy(),
            transactions,
            mode = ?mode,
            "opened notebook history store"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
            capabilities: StoreCapabilities { transactions },
        })
    }

    pub fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    pub fn read<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }
}

fn probe_transactions(conn: &Connection) -> bool {
    if !conn.is_autocommit() {
        return false;
    }
    match conn.execute_batch("SAVEPOINT capability_probe; RELEASE capability_probe;") {
        Ok(()) => true,
        Err(error) => {
            tracing::warn!(error = %error, "transaction capability probe failed");
            false
        }
    }
}

pub(crate) fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| conversion_error(error.to_string()))
}

pub(crate) fn parse_optional_time(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|value| parse_time(&value)).transpose()
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|error| conversion_error(error.to_string()))
}

pub(crate) fn conversion_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

#[cfg(test)]
pub(crate) fn open_test_database(mode: TransactionMode) -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("test.db");
    let db = Database::new(&db_path, mode).expect("db");
    (dir, db)
}
