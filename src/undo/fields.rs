use crate::db;
use crate::errors::{AppError, AppResult};
use crate::models::{Notebook, NotebookFieldSet};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::BTreeSet;

pub(super) fn restore_notebook_fields(
    conn: &Connection,
    notebook: &Notebook,
    previous: &NotebookFieldSet,
    now: DateTime<Utc>,
) -> AppResult<BTreeSet<String>> {
    if previous.is_empty() {
        return Err(AppError::UndoUnsupportedPayload(
            "restoreNotebookFields carries none of name, color, icon, description".to_string(),
        ));
    }
    if matches!(previous.name.as_deref(), Some(name) if name.trim().is_empty()) {
        return Err(AppError::UndoUnsupportedPayload(
            "restoreNotebookFields would blank the notebook name".to_string(),
        ));
    }

    db::set_notebook_fields(conn, &notebook.id, previous, now)?
        .ok_or_else(|| AppError::NotebookNotFound(notebook.id.clone()))?;
    db::mark_index_dirty(conn, &notebook.id, now)?;
    Ok(BTreeSet::from([notebook.id.clone()]))
}

#[cfg(test)]
mod tests {
    use super::restore_notebook_fields;
    use crate::config::TransactionMode;
    use crate::db::{self, open_test_database};
    use crate::models::{Notebook, NotebookFieldSet};
    use chrono::Utc;

    fn notebook() -> Notebook {
        let now = Utc::now();
        Notebook {
            id: "nb-1".to_string(),
            owner_id: "user-1".to_string(),
            workspace_id: None,
            name: "B".to_string(),
            color: Some("blue".to_string()),
            icon: Some("star".to_string()),
            description: None,
            is_public: false,
            public_slug: None,
            public_metadata: None,
            published_at: None,
            note_order: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn restores_only_recorded_fields_including_cleared_ones() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        db.read(|conn| db::insert_notebook(conn, &notebook())).expect("insert");
        let previous = NotebookFieldSet {
            name: Some("A".to_string()),
            color: Some(None),
            ..NotebookFieldSet::default()
        };
        db.read(|conn| restore_notebook_fields(conn, &notebook(), &previous, Utc::now()))
            .expect("restore");

        let restored = db
            .read(|conn| db::get_notebook(conn, "nb-1"))
            .expect("get")
            .expect("exists");
        assert_eq!(restored.name, "A");
        assert_eq!(restored.color, None);
        assert_eq!(restored.icon.as_deref(), Some("star"));
    }

    #[test]
    fn empty_previous_is_rejected_without_writes() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        db.read(|conn| db::insert_notebook(conn, &notebook())).expect("insert");
        let error = db
            .read(|conn| restore_notebook_fields(conn, &notebook(), &NotebookFieldSet::default(), Utc::now()))
            .expect_err("empty");
        assert_eq!(error.code(), "UNDO_UNSUPPORTED_PAYLOAD");
    }

    #[test]
    fn missing_notebook_is_reported() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        let previous = NotebookFieldSet {
            name: Some("A".to_string()),
            ..NotebookFieldSet::default()
        };
        let error = db
            .read(|conn| restore_notebook_fields(conn, &notebook(), &previous, Utc::now()))
            .expect_err("missing");
        assert_eq!(error.code(), "NOTEBOOK_NOT_FOUND");
    }
}
