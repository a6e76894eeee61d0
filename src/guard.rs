//! Admission checks and bookkeeping around a single undo request.

use crate::db;
use crate::errors::{AppError, AppResult};
use crate::models::{
    CommandPayload, InversePayload, NewNotebookEvent, Notebook, NotebookEvent, NotebookEventType, UndoAction,
    UndoOutcome, UndoRequest,
};
use crate::recorder::{append_notebook_event, EventLimits};
use crate::undo::{self, Dispatch};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::{Map, Value};

/// Undoes one event. Run it inside the command's unit of work so the
/// compensating writes, the undo stamp and the `notebook.undo` event commit
/// together.
pub fn apply_undo_for_notebook_event(
    conn: &Connection,
    request: &UndoRequest,
    limits: &EventLimits,
) -> AppResult<UndoOutcome> {
    let now = Utc::now();
    let event = db::get_event(conn, &request.event_id)?
        .filter(|event| event.notebook_id == request.notebook_id)
        .ok_or_else(|| AppError::EventNotFound(request.event_id.clone()))?;
    if event.owner_id != request.owner_id {
        return Err(AppError::NotebookNotFound(request.notebook_id.clone()));
    }
    if event.is_undone() {
        return Err(AppError::EventAlreadyUndone(event.id.clone()));
    }

    let action_tag = event.inverse_payload.action_tag();
    if db::has_newer_live_event(conn, &event.notebook_id, event.seq)? {
        return Err(AppError::EventConflict(format!(
            "notebook {} has newer events than {}; undo those first",
            event.notebook_id, event.id
        )));
    }

    let notebook = resolve_notebook(conn, &event, now)?;
    if notebook.owner_id != request.owner_id {
        return Err(AppError::NotebookNotFound(request.notebook_id.clone()));
    }

    let undone_at = now.to_rfc3339();
    let mut stamped = event.metadata.clone();
    stamped.insert("undoneAt".to_string(), Value::String(undone_at.clone()));
    stamped.insert("undoneBy".to_string(), Value::String(request.actor_id.clone()));
    stamped.insert("undoAction".to_string(), Value::String(action_tag.clone()));
    if !db::claim_undo(conn, &event.id, &stamped, &undone_at)? {
        return Err(AppError::EventAlreadyUndone(event.id.clone()));
    }

    let dispatched = match undo::dispatch(conn, &notebook, &event, now) {
        Ok(dispatched) => dispatched,
        Err(error) => {
            if matches!(error, AppError::UndoUnsupportedPayload(_)) {
                tracing::error!(
                    event_id = %event.id,
                    notebook_id = %event.notebook_id,
                    action = %action_tag,
                    error = %error,
                    "undo payload cannot be applied"
                );
            }
            release_claim(conn, &event.id, &event.metadata);
            return Err(error);
        }
    };
    let (action, affected) = match dispatched {
        Dispatch::Applied {
            action,
            affected_notebook_ids,
        } => (action, affected_notebook_ids),
        Dispatch::Unsupported { action } => {
            release_claim(conn, &event.id, &event.metadata);
            return Err(AppError::UndoUnsupported(format!(
                "event {} ({}) cannot be undone",
                event.id, action
            )));
        }
    };
    let affected_notebook_ids: Vec<String> = affected.into_iter().collect();

    let summary_subject = if event.summary.is_empty() {
        event.command_name.as_str()
    } else {
        event.summary.as_str()
    };
    let undo_event = append_notebook_event(
        conn,
        NewNotebookEvent {
            notebook_id: event.notebook_id.clone(),
            owner_id: event.owner_id.clone(),
            workspace_id: event.workspace_id.clone(),
            actor_id: request.actor_id.clone(),
            event_type: NotebookEventType::Undo,
            command_name: "undo_event".to_string(),
            summary: format!("Undo: {}", summary_subject),
            version: 1,
            payload: CommandPayload::Undo {
                undone_event_id: event.id.clone(),
                action,
                affected_notebook_ids: affected_notebook_ids.clone(),
            }
            .into(),
            inverse_payload: InversePayload::Action(UndoAction::Noop),
            prev_event_id: None,
            parent_event_id: Some(event.id.clone()),
            note_id: event.note_id.clone(),
            metadata: Map::new(),
        },
        limits,
    )?;

    tracing::info!(
        event_id = %event.id,
        undo_event_id = %undo_event.id,
        notebook_id = %event.notebook_id,
        action = action.as_str(),
        affected = affected_notebook_ids.len(),
        "undid notebook event"
    );
    Ok(UndoOutcome {
        action,
        affected_notebook_ids,
        undo_event,
    })
}

/// The live notebook, or a stand-in when the inverse can work without one.
fn resolve_notebook(conn: &Connection, event: &NotebookEvent, now: DateTime<Utc>) -> AppResult<Notebook> {
    if let Some(notebook) = db::get_notebook(conn, &event.notebook_id)? {
        return Ok(notebook);
    }
    match &event.inverse_payload {
        InversePayload::Action(UndoAction::RestoreNotebook { snapshot }) => Ok(snapshot.restore_notebook(now)),
        InversePayload::Action(UndoAction::DeleteNotebook { .. }) => Ok(Notebook {
            id: event.notebook_id.clone(),
            owner_id: event.owner_id.clone(),
            workspace_id: event.workspace_id.clone(),
            name: String::new(),
            color: None,
            icon: None,
            description: None,
            is_public: false,
            public_slug: None,
            public_metadata: None,
            published_at: None,
            note_order: Vec::new(),
            created_at: event.created_at,
            updated_at: now,
        }),
        _ => Err(AppError::NotebookNotFound(event.notebook_id.clone())),
    }
}

fn release_claim(conn: &Connection, event_id: &str, original: &Map<String, Value>) {
    if let Err(error) = db::release_undo(conn, event_id, original) {
        tracing::error!(event_id = %event_id, error = %error, "failed to release undo claim");
    }
}

#[cfg(test)]
mod tests {
    use super::apply_undo_for_notebook_event;
    use crate::config::TransactionMode;
    use crate::db::{self, open_test_database};
    use crate::models::{
        CommandPayload, NewNotebookEvent, Notebook, NotebookEventType, NotebookFieldSet, UndoAction, UndoRequest,
    };
    use crate::recorder::{append_notebook_event, EventLimits};
    use chrono::Utc;
    use serde_json::json;

    fn notebook(name: &str) -> Notebook {
        let now = Utc::now();
        Notebook {
            id: "nb-1".to_string(),
            owner_id: "user-1".to_string(),
            workspace_id: None,
            name: name.to_string(),
            color: None,
            icon: None,
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

    fn rename_event(from: &str, to: &str) -> NewNotebookEvent {
        NewNotebookEvent::for_notebook(
            &notebook(to),
            "user-1",
            NotebookEventType::Update,
            CommandPayload::Update {
                changes: NotebookFieldSet {
                    name: Some(to.to_string()),
                    ..NotebookFieldSet::default()
                },
            },
            UndoAction::RestoreNotebookFields {
                previous: NotebookFieldSet {
                    name: Some(from.to_string()),
                    ..NotebookFieldSet::default()
                },
            },
        )
    }

    fn request(event_id: &str, owner_id: &str) -> UndoRequest {
        UndoRequest {
            notebook_id: "nb-1".to_string(),
            event_id: event_id.to_string(),
            owner_id: owner_id.to_string(),
            actor_id: "user-1".to_string(),
        }
    }

    #[test]
    fn stamps_the_event_and_links_the_undo_event() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        let limits = EventLimits::default();
        let renamed = db
            .read(|conn| {
                db::insert_notebook(conn, &notebook("B"))?;
                append_notebook_event(conn, rename_event("A", "B"), &limits)
            })
            .expect("seed");

        let outcome = db
            .read(|conn| apply_undo_for_notebook_event(conn, &request(&renamed.id, "user-1"), &limits))
            .expect("undo");
        assert_eq!(outcome.undo_event.parent_event_id.as_deref(), Some(renamed.id.as_str()));
        assert_eq!(outcome.undo_event.prev_event_id.as_deref(), Some(renamed.id.as_str()));
        assert_eq!(outcome.undo_event.event_type, NotebookEventType::Undo);

        let stamped = db.read(|conn| db::get_event(conn, &renamed.id)).expect("get").expect("exists");
        assert!(stamped.is_undone());
        assert_eq!(stamped.metadata.get("undoneBy"), Some(&json!("user-1")));
        assert_eq!(stamped.metadata.get("undoAction"), Some(&json!("restoreNotebookFields")));
    }

    #[test]
    fn foreign_owner_sees_notebook_not_found() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        let limits = EventLimits::default();
        let renamed = db
            .read(|conn| {
                db::insert_notebook(conn, &notebook("B"))?;
                append_notebook_event(conn, rename_event("A", "B"), &limits)
            })
            .expect("seed");
        let error = db
            .read(|conn| apply_undo_for_notebook_event(conn, &request(&renamed.id, "intruder"), &limits))
            .expect_err("foreign owner");
        assert_eq!(error.code(), "NOTEBOOK_NOT_FOUND");
    }

    #[test]
    fn event_from_another_notebook_is_not_found() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        let limits = EventLimits::default();
        let renamed = db
            .read(|conn| {
                db::insert_notebook(conn, &notebook("B"))?;
                append_notebook_event(conn, rename_event("A", "B"), &limits)
            })
            .expect("seed");
        let mut wrong = request(&renamed.id, "user-1");
        wrong.notebook_id = "nb-2".to_string();
        let error = db
            .read(|conn| apply_undo_for_notebook_event(conn, &wrong, &limits))
            .expect_err("wrong notebook");
        assert_eq!(error.code(), "EVENT_NOT_FOUND");
    }

    #[test]
    fn missing_notebook_without_stand_in_is_not_found() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        let limits = EventLimits::default();
        let renamed = db
            .read(|conn| append_notebook_event(conn, rename_event("A", "B"), &limits))
            .expect("seed");
        let error = db
            .read(|conn| apply_undo_for_notebook_event(conn, &request(&renamed.id, "user-1"), &limits))
            .expect_err("missing notebook");
        assert_eq!(error.code(), "NOTEBOOK_NOT_FOUND");
        let event = db.read(|conn| db::get_event(conn, &renamed.id)).expect("get").expect("exists");
        assert!(!event.is_undone());
    }

    #[test]
    fn unsupported_action_releases_the_claim() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        let limits = EventLimits::default();
        let synced = db
            .read(|conn| {
                db::insert_notebook(conn, &notebook("B"))?;
                append_notebook_event(
                    conn,
                    NewNotebookEvent::for_notebook(
                        &notebook("B"),
                        "user-1",
                        NotebookEventType::Sync,
                        CommandPayload::Sync {
                            device_id: "phone".to_string(),
                            status: "ok".to_string(),
                            error: None,
                        },
                        UndoAction::Noop,
                    ),
                    &limits,
                )
            })
            .expect("seed");
        let error = db
            .read(|conn| apply_undo_for_notebook_event(conn, &request(&synced.id, "user-1"), &limits))
            .expect_err("unsupported");
        assert_eq!(error.code(), "UNDO_UNSUPPORTED");
        let event = db.read(|conn| db::get_event(conn, &synced.id)).expect("get").expect("exists");
        assert!(!event.is_undone());
        assert!(event.metadata.is_empty());
    }
}
