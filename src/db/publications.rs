use super::{parse_json, parse_time};
use crate::errors::AppResult;
use crate::models::{CollabDocument, Publication};
use rusqlite::{params, Connection, OptionalExtension};

const PUBLICATION_COLUMNS: &str =
    "notebook_id, slug, owner_id, title, snapshot_hash, metadata_json, published_at, updated_at";

pub fn upsert_publication(conn: &Connection, publication: &Publication) -> AppResult<()> {
    conn.execute(
        "INSERT INTO publications (notebook_id, slug, owner_id, title, snapshot_hash, metadata_json, published_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(notebook_id) DO UPDATE SET
           slug = excluded.slug,
           owner_id = excluded.owner_id,
           title = excluded.title,
           snapshot_hash = excluded.snapshot_hash,
           metadata_json = excluded.metadata_json,
           published_at = excluded.published_at,
           updated_at = excluded.updated_at",
        params![
            publication.notebook_id,
            publication.slug,
            publication.owner_id,
            publication.title,
            publication.snapshot_hash,
            serde_json::to_string(&publication.metadata)?,
            publication.published_at.to_rfc3339(),
            publication.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_publication(conn: &Connection, notebook_id: &str) -> AppResult<Option<Publication>> {
    let sql = format!("SELECT {} FROM publications WHERE notebook_id = ?1", PUBLICATION_COLUMNS);
    conn.query_row(&sql, [notebook_id], parse_publication_row)
        .optional()
        .map_err(Into::into)
}

pub fn get_publication_by_slug(conn: &Connection, slug: &str) -> AppResult<Option<Publication>> {
    let sql = format!("SELECT {} FROM publications WHERE slug = ?1", PUBLICATION_COLUMNS);
    conn.query_row(&sql, [slug], parse_publication_row)
        .optional()
        .map_err(Into::into)
}

pub fn delete_publication(conn: &Connection, notebook_id: &str) -> AppResult<usize> {
    Ok(conn.execute("DELETE FROM publications WHERE notebook_id = ?1", [notebook_id])?)
}

pub fn get_document(conn: &Connection, notebook_id: &str) -> AppResult<Option<CollabDocument>> {
    conn.query_row(
        "SELECT notebook_id, state, updated_at FROM collab_documents WHERE notebook_id = ?1",
        [notebook_id],
        |row| {
            Ok(CollabDocument {
                notebook_id: row.get(0)?,
                state: row.get(1)?,
                updated_at: parse_time(&row.get::<_, String>(2)?)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

pub fn upsert_document(conn: &Connection, document: &CollabDocument) -> AppResult<()> {
    conn.execute(
        "INSERT INTO collab_documents (notebook_id, state, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(notebook_id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
        params![document.notebook_id, document.state, document.updated_at.to_rfc3339()],
    )?;
    Ok(())
}

pub fn delete_document(conn: &Connection, notebook_id: &str) -> AppResult<usize> {
    Ok(conn.execute("DELETE FROM collab_documents WHERE notebook_id = ?1", [notebook_id])?)
}

fn parse_publication_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Publication> {
    Ok(Publication {
        notebook_id: row.get(0)?,
        slug: row.get(1)?,
        owner_id: row.get(2)?,
        title: row.get(3)?,
        snapshot_hash: row.get(4)?,
        metadata: parse_json(&row.get::<_, String>(5)?)?,
        published_at: parse_time(&row.get::<_, String>(6)?)?,
        updated_at: parse_time(&row.get::<_, String>(7)?)?,
    })
}
