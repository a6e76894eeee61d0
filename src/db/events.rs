use super::{conversion_error, parse_json, parse_time};
use crate::errors::AppResult;
use crate::models::{EventPayload, InversePayload, NotebookEvent, NotebookEventType};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};

const EVENT_COLUMNS: &str = "id, notebook_id, owner_id, workspace_id, actor_id, seq, event_type, command_name, summary,
     version, payload_json, inverse_payload_json, prev_event_id, parent_event_id, note_id, metadata_json, created_at";

pub fn insert_event(conn: &Connection, event: &NotebookEvent) -> AppResult<()> {
    conn.execute(
        "INSERT INTO notebook_events (
           id, notebook_id, owner_id, workspace_id, actor_id, seq, event_type, command_name, summary,
           version, payload_json, inverse_payload_json, prev_event_id, parent_event_id, note_id,
           metadata_json, undone_at, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            event.id,
            event.notebook_id,
            event.owner_id,
            event.workspace_id,
            event.actor_id,
            event.seq,
            event.event_type.as_str(),
            event.command_name,
            event.summary,
            event.version,
            serde_json::to_string(&event.payload)?,
            serde_json::to_string(&event.inverse_payload)?,
            event.prev_event_id,
            event.parent_event_id,
            event.note_id,
            serde_json::to_string(&event.metadata)?,
            event.undone_at(),
            event.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_event(conn: &Connection, event_id: &str) -> AppResult<Option<NotebookEvent>> {
    let sql = format!("SELECT {} FROM notebook_events WHERE id = ?1", EVENT_COLUMNS);
    conn.query_row(&sql, [event_id], parse_event_row)
        .optional()
        .map_err(Into::into)
}

pub fn latest_event(conn: &Connection, notebook_id: &str) -> AppResult<Option<NotebookEvent>> {
    let sql = format!(
        "SELECT {} FROM notebook_events WHERE notebook_id = ?1 ORDER BY seq DESC LIMIT 1",
        EVENT_COLUMNS
    );
    conn.query_row(&sql, [notebook_id], parse_event_row)
        .optional()
        .map_err(Into::into)
}

pub fn list_events(conn: &Connection, notebook_id: &str) -> AppResult<Vec<NotebookEvent>> {
    let sql = format!(
        "SELECT {} FROM notebook_events WHERE notebook_id = ?1 ORDER BY seq ASC",
        EVENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([notebook_id], parse_event_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// True when a later, still-live, non-undo event exists for the notebook.
pub fn has_newer_live_event(conn: &Connection, notebook_id: &str, seq: i64) -> AppResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
           SELECT 1 FROM notebook_events
           WHERE notebook_id = ?1 AND seq > ?2 AND event_type <> ?3 AND undone_at IS NULL
         )",
        params![notebook_id, seq, NotebookEventType::Undo.as_str()],
        |row| row.get(0),
    )?;
    Ok(exists != 0)
}

/// Marks the event undone only if nobody else has. Returns false when the
/// event was already claimed.
pub fn claim_undo(conn: &Connection, event_id: &str, metadata: &Map<String, Value>, undone_at: &str) -> AppResult<bool> {
    let updated = conn.execute(
        "UPDATE notebook_events SET undone_at = ?1, metadata_json = ?2 WHERE id = ?3 AND undone_at IS NULL",
        params![undone_at, serde_json::to_string(metadata)?, event_id],
    )?;
    Ok(updated == 1)
}

pub fn release_undo(conn: &Connection, event_id: &str, metadata: &Map<String, Value>) -> AppResult<()> {
    conn.execute(
        "UPDATE notebook_events SET undone_at = NULL, metadata_json = ?1 WHERE id = ?2",
        params![serde_json::to_string(metadata)?, event_id],
    )?;
    Ok(())
}

fn parse_event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotebookEvent> {
    let event_type_raw: String = row.get(6)?;
    let event_type = NotebookEventType::parse(&event_type_raw)
        .ok_or_else(|| conversion_error(format!("Unknown notebook event type '{}'", event_type_raw)))?;
    let payload: EventPayload = parse_json(&row.get::<_, String>(10)?)?;
    let inverse: Value = parse_json(&row.get::<_, String>(11)?)?;
    let metadata = match parse_json::<Value>(&row.get::<_, String>(15)?)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    Ok(NotebookEvent {
        id: row.get(0)?,
        notebook_id: row.get(1)?,
        owner_id: row.get(2)?,
        workspace_id: row.get(3)?,
        actor_id: row.get(4)?,
        seq: row.get(5)?,
        event_type,
        command_name: row.get(7)?,
        summary: row.get(8)?,
        version: row.get(9)?,
        payload,
        inverse_payload: InversePayload::from_value(inverse),
        prev_event_id: row.get(12)?,
        parent_event_id: row.get(13)?,
        note_id: row.get(14)?,
        metadata,
        created_at: parse_time(&row.get::<_, String>(16)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::{claim_undo, get_event, has_newer_live_event, insert_event, latest_event, list_events, release_undo};
    use crate::config::TransactionMode;
    use crate::db::open_test_database;
    use crate::models::{
        CommandPayload, EventPayload, InversePayload, NotebookEvent, NotebookEventType, UndoAction,
    };
    use chrono::Utc;
    use serde_json::{json, Map, Value};

    fn event(id: &str, seq: i64, event_type: NotebookEventType) -> NotebookEvent {
        NotebookEvent {
            id: id.to_string(),
            notebook_id: "nb-1".to_string(),
            owner_id: "user-1".to_string(),
            workspace_id: None,
            actor_id: "user-1".to_string(),
            seq,
            event_type,
            command_name: event_type.as_str().to_string(),
            summary: String::new(),
            version: 1,
            payload: EventPayload::Command(CommandPayload::Create {
                name: "Inbox".to_string(),
                workspace_id: None,
            }),
            inverse_payload: InversePayload::Action(UndoAction::DeleteNotebook {
                notebook_id: "nb-1".to_string(),
            }),
            prev_event_id: None,
            parent_event_id: None,
            note_id: None,
            metadata: Map::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn events_list_in_sequence_order() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        db.read(|conn| {
            insert_event(conn, &event("e-2", 2, NotebookEventType::Update))?;
            insert_event(conn, &event("e-1", 1, NotebookEventType::Create))
        })
        .expect("insert");

        let events = db.read(|conn| list_events(conn, "nb-1")).expect("list");
        let ids: Vec<&str> = events.iter().map(|event| event.id.as_str()).collect();
        assert_eq!(ids, vec!["e-1", "e-2"]);
        let latest = db.read(|conn| latest_event(conn, "nb-1")).expect("latest").expect("exists");
        assert_eq!(latest.id, "e-2");
        assert_eq!(latest.event_type, NotebookEventType::Update);
    }

    #[test]
    fn duplicate_sequence_numbers_are_rejected() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        db.read(|conn| insert_event(conn, &event("e-1", 1, NotebookEventType::Create)))
            .expect("insert");
        let error = db
            .read(|conn| insert_event(conn, &event("e-2", 1, NotebookEventType::Update)))
            .expect_err("seq clash");
        assert_eq!(error.code(), "INTERNAL");
    }

    #[test]
    fn undo_claim_is_compare_and_set() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        db.read(|conn| insert_event(conn, &event("e-1", 1, NotebookEventType::Create)))
            .expect("insert");
        let mut metadata = Map::new();
        metadata.insert("undoneAt".to_string(), Value::String("2024-05-01T00:00:00Z".to_string()));

        assert!(db
            .read(|conn| claim_undo(conn, "e-1", &metadata, "2024-05-01T00:00:00Z"))
            .expect("first claim"));
        assert!(!db
            .read(|conn| claim_undo(conn, "e-1", &metadata, "2024-05-01T00:00:01Z"))
            .expect("second claim"));
        let claimed = db.read(|conn| get_event(conn, "e-1")).expect("get").expect("exists");
        assert!(claimed.is_undone());

        db.read(|conn| release_undo(conn, "e-1", &Map::new())).expect("release");
        let released = db.read(|conn| get_event(conn, "e-1")).expect("get").expect("exists");
        assert!(!released.is_undone());
    }

    #[test]
    fn newer_live_events_ignore_undo_rows_and_undone_rows() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        db.read(|conn| {
            insert_event(conn, &event("e-1", 1, NotebookEventType::Create))?;
            insert_event(conn, &event("e-2", 2, NotebookEventType::Update))?;
            insert_event(conn, &event("e-3", 3, NotebookEventType::Undo))
        })
        .expect("insert");

        assert!(db.read(|conn| has_newer_live_event(conn, "nb-1", 1)).expect("check"));
        assert!(!db.read(|conn| has_newer_live_event(conn, "nb-1", 2)).expect("check"));

        db.read(|conn| claim_undo(conn, "e-2", &Map::new(), "2024-05-01T00:00:00Z"))
            .expect("claim");
        assert!(!db.read(|conn| has_newer_live_event(conn, "nb-1", 1)).expect("check"));
    }

    #[test]
    fn unknown_inverse_actions_survive_storage_verbatim() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        let mut stored = event("e-1", 1, NotebookEventType::Update);
        let raw = json!({ "action": "restoreTemplate", "templateId": "t-9" });
        stored.inverse_payload = InversePayload::from_value(raw.clone());
        db.read(|conn| insert_event(conn, &stored)).expect("insert");

        let loaded = db.read(|conn| get_event(conn, "e-1")).expect("get").expect("exists");
        assert!(matches!(loaded.inverse_payload, InversePayload::Unrecognized(_)));
        assert_eq!(serde_json::to_value(&loaded.inverse_payload).expect("serialize"), raw);
    }
}
