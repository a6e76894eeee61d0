use crate::db::Database;
use crate::errors::{AppError, AppResult};
use rusqlite::Connection;

impl Database {
    /// Runs one notebook command as a single unit of work.
    ///
    /// Without transaction support the command runs directly against the
    /// connection. If a transaction cannot be opened the whole command is
    /// retried once without one; a crash in between can then leave an entity
    /// write with no event, which only means that change is not undoable.
    pub fn run_command<T, F>(&self, command: &str, mut operation: F) -> AppResult<T>
    where
        F: FnMut(&Connection) -> AppResult<T>,
    {
        let mut conn = self.lock()?;
        if !self.capabilities().transactions {
            tracing::debug!(command, "store has no transactions; running command directly");
            return operation(&conn);
        }

        match run_in_transaction(&mut conn, &mut operation) {
            Err(AppError::TransactionUnsupported(reason)) => {
                tracing::warn!(
                    command,
                    reason = %reason,
                    "transaction unavailable; retrying command without one"
                );
                operation(&conn)
            }
            other => other,
        }
    }
}

fn run_in_transaction<T, F>(conn: &mut Connection, operation: &mut F) -> AppResult<T>
where
    F: FnMut(&Connection) -> AppResult<T>,
{
    if !conn.is_autocommit() {
        return Err(AppError::TransactionUnsupported(
            "connection is already inside a transaction".to_string(),
        ));
    }
    let tx = conn
        .transaction()
        .map_err(|error| AppError::TransactionUnsupported(error.to_string()))?;
    let value = operation(&tx)?;
    tx.commit()?;
    Ok(value)
}
