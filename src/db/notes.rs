use super::parse_time;
use crate::errors::AppResult;
use crate::models::Note;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

const NOTE_COLUMNS: &str = "id, notebook_id, owner_id, title, content, tags_json, created_at, updated_at";

const INSERT_NOTE_SQL: &str = "INSERT INTO notes (id, notebook_id, owner_id, title, content, tags_json, created_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

pub fn insert_note(conn: &Connection, note: &Note) -> AppResult<()> {
    write_note(conn, INSERT_NOTE_SQL, note)
}

pub fn upsert_note(conn: &Connection, note: &Note) -> AppResult<()> {
    let sql = format!(
        "{} ON CONFLICT(id) DO UPDATE SET
           notebook_id = excluded.notebook_id,
           owner_id = excluded.owner_id,
           title = excluded.title,
           content = excluded.content,
           tags_json = excluded.tags_json,
           updated_at = excluded.updated_at",
        INSERT_NOTE_SQL
    );
    write_note(conn, &sql, note)
}

fn write_note(conn: &Connection, sql: &str, note: &Note) -> AppResult<()> {
    conn.execute(
        sql,
        params![
            note.id,
            note.notebook_id,
            note.owner_id,
            note.title,
            note.content,
            serde_json::to_string(&note.tags)?,
            note.created_at.to_rfc3339(),
            note.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_note(conn: &Connection, note_id: &str) -> AppResult<Option<Note>> {
    let sql = format!("SELECT {} FROM notes WHERE id = ?1", NOTE_COLUMNS);
    conn.query_row(&sql, [note_id], parse_note_row)
        .optional()
        .map_err(Into::into)
}

pub fn list_notes_for_notebook(conn: &Connection, notebook_id: &str) -> AppResult<Vec<Note>> {
    let sql = format!(
        "SELECT {} FROM notes WHERE notebook_id = ?1 ORDER BY created_at ASC, id ASC",
        NOTE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([notebook_id], parse_note_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_note_notebook(
    conn: &Connection,
    note_id: &str,
    notebook_id: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<usize> {
    Ok(conn.execute(
        "UPDATE notes SET notebook_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![notebook_id, now.to_rfc3339(), note_id],
    )?)
}

pub fn delete_notes_for_notebook(conn: &Connection, notebook_id: &str) -> AppResult<usize> {
    Ok(conn.execute("DELETE FROM notes WHERE notebook_id = ?1", [notebook_id])?)
}

pub fn detach_notes_from_notebook(conn: &Connection, notebook_id: &str, now: DateTime<Utc>) -> AppResult<usize> {
    Ok(conn.execute(
        "UPDATE notes SET notebook_id = NULL, updated_at = ?1 WHERE notebook_id = ?2",
        params![now.to_rfc3339(), notebook_id],
    )?)
}

fn parse_note_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        notebook_id: row.get(1)?,
        owner_id: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        tags: serde_json::from_str::<Vec<String>>(&row.get::<_, String>(5)?).unwrap_or_default(),
        created_at: parse_time(&row.get::<_, String>(6)?)?,
        updated_at: parse_time(&row.get::<_, String>(7)?)?,
    })
}
