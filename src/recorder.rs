use crate::db;
use crate::errors::{AppError, AppResult};
use crate::models::{ChainBreak, ChainReport, NewNotebookEvent, NotebookEvent};
use chrono::Utc;
use rusqlite::Connection;
use serde_json::Value;
use uuid::Uuid;

const ELLIPSIS: char = '…';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventLimits {
    pub summary_max_chars: usize,
    pub error_max_chars: usize,
}

impl Default for EventLimits {
    fn default() -> Self {
        Self {
            summary_max_chars: 240,
            error_max_chars: 2000,
        }
    }
}

/// Caps `value` at `max_chars` characters, ellipsis included.
pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push(ELLIPSIS);
    truncated
}

/// The only write path into `notebook_events`. Pass a `Transaction` to make the
/// append part of the caller's unit of work.
pub fn append_notebook_event(
    conn: &Connection,
    event: NewNotebookEvent,
    limits: &EventLimits,
) -> AppResult<NotebookEvent> {
    for (field, value) in [
        ("notebookId", &event.notebook_id),
        ("ownerId", &event.owner_id),
        ("actorId", &event.actor_id),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::InvalidEvent(format!("{} is required", field)));
        }
    }

    let NewNotebookEvent {
        notebook_id,
        owner_id,
        workspace_id,
        actor_id,
        event_type,
        command_name,
        summary,
        version,
        mut payload,
        inverse_payload,
        prev_event_id,
        parent_event_id,
        note_id,
        mut metadata,
    } = event;

    payload.truncate_error_text(limits.error_max_chars);
    if let Some(Value::String(error)) = metadata.get_mut("error") {
        *error = truncate_text(error, limits.error_max_chars);
    }

    let latest = db::latest_event(conn, &notebook_id)?;
    let seq = latest.as_ref().map(|previous| previous.seq + 1).unwrap_or(1);
    let prev_event_id = prev_event_id.or_else(|| latest.map(|previous| previous.id));
    let command_name = if command_name.trim().is_empty() {
        event_type.as_str().to_string()
    } else {
        command_name
    };

    let recorded = NotebookEvent {
        id: Uuid::new_v4().to_string(),
        notebook_id,
        owner_id,
        workspace_id,
        actor_id,
        seq,
        event_type,
        command_name,
        summary: truncate_text(&summary, limits.summary_max_chars),
        version: version.max(1),
        payload,
        inverse_payload,
        prev_event_id,
        parent_event_id,
        note_id,
        metadata,
        created_at: Utc::now(),
    };
    db::insert_event(conn, &recorded)?;
    Ok(recorded)
}

/// Walks a notebook's events in `seq` order and reports every link that does
/// not point at its predecessor or skips a sequence number.
pub fn verify_chain(conn: &Connection, notebook_id: &str) -> AppResult<ChainReport> {
    let events = db::list_events(conn, notebook_id)?;
    let mut breaks = Vec::new();
    let mut expected_prev: Option<String> = None;
    for (index, event) in events.iter().enumerate() {
        let expected_seq = index as i64 + 1;
        if event.prev_event_id != expected_prev || event.seq != expected_seq {
            breaks.push(ChainBreak {
                event_id: event.id.clone(),
                seq: event.seq,
                expected_prev_event_id: expected_prev.clone(),
                actual_prev_event_id: event.prev_event_id.clone(),
                expected_seq,
            });
        }
        expected_prev = Some(event.id.clone());
    }
    Ok(ChainReport {
        notebook_id: notebook_id.to_string(),
        event_count: events.len(),
        head_event_id: expected_prev,
        breaks,
    })
}
