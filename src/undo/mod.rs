mod fields;
mod notebook;
mod notes;
mod publication;

pub(crate) use notebook::remove_notebook_subtree;

use crate::errors::{AppError, AppResult};
use crate::models::{InversePayload, Notebook, NotebookEvent, UndoAction, UndoActionKind};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Applied {
        action: UndoActionKind,
        affected_notebook_ids: BTreeSet<String>,
    },
    /// Nothing can reverse this event; the caller reports `UNDO_UNSUPPORTED`.
    Unsupported { action: String },
}

/// Runs the compensating writes for `event` against `notebook`, which is the
/// live row or a stand-in when the notebook no longer exists.
pub fn dispatch(
    conn: &Connection,
    notebook: &Notebook,
    event: &NotebookEvent,
    now: DateTime<Utc>,
) -> AppResult<Dispatch> {
    let action = match &event.inverse_payload {
        InversePayload::Action(action) => action,
        InversePayload::Malformed { action, reason, .. } => {
            return Err(AppError::UndoUnsupportedPayload(format!(
                "{} payload on event {} is malformed: {}",
                action.as_str(),
                event.id,
                reason
            )));
        }
        InversePayload::Unrecognized(_) => {
            return Ok(Dispatch::Unsupported {
                action: event.inverse_payload.action_tag(),
            });
        }
    };

    let affected_notebook_ids = match action {
        UndoAction::RestoreNotebookFields { previous } => {
            fields::restore_notebook_fields(conn, notebook, previous, now)?
        }
        UndoAction::RestoreNoteNotebook { notes } => notes::restore_note_notebook(conn, notebook, notes, now)?,
        UndoAction::DeleteNotebook { notebook_id } => {
            ensure_same_notebook(event, notebook_id)?;
            notebook::delete_notebook(conn, notebook_id, now)?
        }
        UndoAction::RestoreNotebook { snapshot } => {
            ensure_same_notebook(event, &snapshot.notebook.id)?;
            notebook::restore_notebook(conn, snapshot, now)?
        }
        UndoAction::RestoreNotebookPublication { previous, publication } => {
            publication::restore_notebook_publication(conn, notebook, previous, publication.as_ref(), now)?
        }
        UndoAction::Noop => {
            return Ok(Dispatch::Unsupported {
                action: UndoActionKind::Noop.as_str().to_string(),
            });
        }
    };

    Ok(Dispatch::Applied {
        action: action.kind(),
        affected_notebook_ids,
    })
}

fn ensure_same_notebook(event: &NotebookEvent, payload_notebook_id: &str) -> AppResult<()> {
    if payload_notebook_id != event.notebook_id {
        return Err(AppError::UndoUnsupportedPayload(format!(
            "event {} targets notebook {} but its inverse names {}",
            event.id, event.notebook_id, payload_notebook_id
        )));
    }
    Ok(())
}
