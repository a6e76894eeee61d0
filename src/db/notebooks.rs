use super::{parse_json, parse_optional_time, parse_time};
use crate::errors::AppResult;
use crate::models::{Notebook, NotebookFieldSet, PublicationState};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

const NOTEBOOK_COLUMNS: &str = "id, owner_id, workspace_id, name, color, icon, description, is_public, public_slug,
     public_metadata_json, published_at, note_order_json, created_at, updated_at";

const INSERT_NOTEBOOK_SQL: &str = "INSERT INTO notebooks (
       id, owner_id, workspace_id, name, color, icon, description, is_public, public_slug,
       public_metadata_json, published_at, note_order_json, created_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)";

pub fn insert_notebook(conn: &Connection, notebook: &Notebook) -> AppResult<()> {
    write_notebook(conn, INSERT_NOTEBOOK_SQL, notebook)
}

/// Writes `notebook` at its own id, replacing any row already there.
pub fn upsert_notebook(conn: &Connection, notebook: &Notebook) -> AppResult<()> {
    let sql = format!(
        "{} ON CONFLICT(id) DO UPDATE SET
           owner_id = excluded.owner_id,
           workspace_id = excluded.workspace_id,
           name = excluded.name,
           color = excluded.color,
           icon = excluded.icon,
           description = excluded.description,
           is_public = excluded.is_public,
           public_slug = excluded.public_slug,
           public_metadata_json = excluded.public_metadata_json,
           published_at = excluded.published_at,
           note_order_json = excluded.note_order_json,
           created_at = excluded.created_at,
           updated_at = excluded.updated_at",
        INSERT_NOTEBOOK_SQL
    );
    write_notebook(conn, &sql, notebook)
}

fn write_notebook(conn: &Connection, sql: &str, notebook: &Notebook) -> AppResult<()> {
    let metadata = notebook
        .public_metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        sql,
        params![
            notebook.id,
            notebook.owner_id,
            notebook.workspace_id,
            notebook.name,
            notebook.color,
            notebook.icon,
            notebook.description,
            i32::from(notebook.is_public),
            notebook.public_slug,
            metadata,
            notebook.published_at.map(|value| value.to_rfc3339()),
            serde_json::to_string(&notebook.note_order)?,
            notebook.created_at.to_rfc3339(),
            notebook.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_notebook(conn: &Connection, notebook_id: &str) -> AppResult<Option<Notebook>> {
    let sql = format!("SELECT {} FROM notebooks WHERE id = ?1", NOTEBOOK_COLUMNS);
    conn.query_row(&sql, [notebook_id], parse_notebook_row)
        .optional()
        .map_err(Into::into)
}

pub fn set_notebook_fields(
    conn: &Connection,
    notebook_id: &str,
    fields: &NotebookFieldSet,
    now: DateTime<Utc>,
) -> AppResult<Option<Notebook>> {
    let Some(mut notebook) = get_notebook(conn, notebook_id)? else {
        return Ok(None);
    };
    if let Some(name) = fields.name.as_ref() {
        notebook.name = name.clone();
    }
    if let Some(color) = fields.color.as_ref() {
        notebook.color = color.clone();
    }
    if let Some(icon) = fields.icon.as_ref() {
        notebook.icon = icon.clone();
    }
    if let Some(description) = fields.description.as_ref() {
        notebook.description = description.clone();
    }
    notebook.updated_at = now;

    conn.execute(
        "UPDATE notebooks SET name = ?1, color = ?2, icon = ?3, description = ?4, updated_at = ?5 WHERE id = ?6",
        params![
            notebook.name,
            notebook.color,
            notebook.icon,
            notebook.description,
            now.to_rfc3339(),
            notebook_id
        ],
    )?;
    Ok(Some(notebook))
}

pub fn set_note_order(conn: &Connection, notebook_id: &str, order: &[String], now: DateTime<Utc>) -> AppResult<()> {
    conn.execute(
        "UPDATE notebooks SET note_order_json = ?1, updated_at = ?2 WHERE id = ?3",
        params![serde_json::to_string(order)?, now.to_rfc3339(), notebook_id],
    )?;
    Ok(())
}

pub fn set_publication_state(
    conn: &Connection,
    notebook_id: &str,
    state: &PublicationState,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let metadata = state.metadata.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        "UPDATE notebooks
         SET is_public = ?1, public_slug = ?2, public_metadata_json = ?3, published_at = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            i32::from(state.is_public),
            state.slug,
            metadata,
            state.published_at.map(|value| value.to_rfc3339()),
            now.to_rfc3339(),
            notebook_id
        ],
    )?;
    Ok(())
}

pub fn delete_notebook_row(conn: &Connection, notebook_id: &str) -> AppResult<usize> {
    Ok(conn.execute("DELETE FROM notebooks WHERE id = ?1", [notebook_id])?)
}

pub fn mark_index_dirty(conn: &Connection, notebook_id: &str, now: DateTime<Utc>) -> AppResult<()> {
    conn.execute(
        "INSERT INTO notebook_index_state (notebook_id, dirty, updated_at) VALUES (?1, 1, ?2)
         ON CONFLICT(notebook_id) DO UPDATE SET dirty = 1, updated_at = excluded.updated_at",
        params![notebook_id, now.to_rfc3339()],
    )?;
    Ok(())
}

pub fn delete_index_state(conn: &Connection, notebook_id: &str) -> AppResult<usize> {
    Ok(conn.execute(
        "DELETE FROM notebook_index_state WHERE notebook_id = ?1",
        [notebook_id],
    )?)
}

fn parse_notebook_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notebook> {
    Ok(Notebook {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        workspace_id: row.get(2)?,
        name: row.get(3)?,
        color: row.get(4)?,
        icon: row.get(5)?,
        description: row.get(6)?,
        is_public: row.get::<_, i32>(7)? != 0,
        public_slug: row.get(8)?,
        public_metadata: row
            .get::<_, Option<String>>(9)?
            .map(|raw| parse_json(&raw))
            .transpose()?,
        published_at: parse_optional_time(row.get(10)?)?,
        note_order: serde_json::from_str::<Vec<String>>(&row.get::<_, String>(11)?).unwrap_or_default(),
        created_at: parse_time(&row.get::<_, String>(12)?)?,
        updated_at: parse_time(&row.get::<_, String>(13)?)?,
    })
}
