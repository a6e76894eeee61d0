use crate::db;
use crate::errors::{AppError, AppResult};
use crate::models::{NotePlacement, Notebook};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};

/// Puts moved notes back where they were. `destination` is the notebook the
/// move command targeted.
pub(super) fn restore_note_notebook(
    conn: &Connection,
    destination: &Notebook,
    placements: &[NotePlacement],
    now: DateTime<Utc>,
) -> AppResult<BTreeSet<String>> {
    if placements.is_empty() {
        return Err(AppError::UndoUnsupportedPayload(
            "restoreNoteNotebook has no notes to restore".to_string(),
        ));
    }
    if placements.iter().any(|placement| placement.note_id.trim().is_empty()) {
        return Err(AppError::UndoUnsupportedPayload(
            "restoreNoteNotebook entry is missing its noteId".to_string(),
        ));
    }

    let mut moved = Vec::with_capacity(placements.len());
    for placement in placements {
        let Some(note) = db::get_note(conn, &placement.note_id)? else {
            continue;
        };
        if note.notebook_id.as_deref() != Some(destination.id.as_str()) {
            return Err(AppError::EventConflict(format!(
                "note {} has left notebook {} since it was moved there; undo the later move first",
                note.id, destination.id
            )));
        }
        moved.push((note, placement));
    }

    let mut affected = BTreeSet::from([destination.id.clone()]);
    let mut returning: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (note, placement) in moved {
        let prior = match placement.notebook_id.as_deref() {
            Some(notebook_id) if db::get_notebook(conn, notebook_id)?.is_some() => Some(notebook_id),
            _ => None,
        };
        db::set_note_notebook(conn, &note.id, prior, now)?;
        if let Some(prior) = prior {
            returning.entry(prior.to_string()).or_default().push(note.id.clone());
        }
    }

    // Drop every recorded note from the destination order, even ones deleted since.
    let recorded: BTreeSet<&str> = placements.iter().map(|placement| placement.note_id.as_str()).collect();
    if let Some(live) = db::get_notebook(conn, &destination.id)? {
        let order: Vec<String> = live
            .note_order
            .iter()
            .filter(|note_id| !recorded.contains(note_id.as_str()))
            .cloned()
            .collect();
        if order != live.note_order {
            db::set_note_order(conn, &destination.id, &order, now)?;
        }
    }

    for (notebook_id, note_ids) in returning {
        let Some(notebook) = db::get_notebook(conn, &notebook_id)? else {
            continue;
        };
        let mut order = notebook.note_order;
        for note_id in note_ids {
            if !order.contains(&note_id) {
                order.push(note_id);
            }
        }
        db::set_note_order(conn, &notebook_id, &order, now)?;
        affected.insert(notebook_id);
    }

    for notebook_id in &affected {
        db::mark_index_dirty(conn, notebook_id, now)?;
    }
    Ok(affected)
}
