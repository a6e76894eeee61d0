use crate::db;
use crate::errors::{AppError, AppResult};
use crate::models::{Notebook, PublicationState};
use crate::snapshot::PublicationSnapshot;
use super::notebook::ensure_slug_available;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::BTreeSet;

pub(super) fn restore_notebook_publication(
    conn: &Connection,
    notebook: &Notebook,
    previous: &PublicationState,
    publication: Option<&PublicationSnapshot>,
    now: DateTime<Utc>,
) -> AppResult<BTreeSet<String>> {
    let restored = match (previous.is_public, publication) {
        (false, _) => None,
        (true, Some(publication)) if previous.slug.as_deref() == Some(publication.slug.as_str()) => {
            Some(publication.to_publication(&notebook.id))
        }
        (true, Some(publication)) => {
            return Err(AppError::UndoUnsupportedPayload(format!(
                "publication slug {} does not match the recorded slug {:?}",
                publication.slug, previous.slug
            )));
        }
        (true, None) => {
            return Err(AppError::UndoUnsupportedPayload(format!(
                "notebook {} was public but the payload has no publication snapshot",
                notebook.id
            )));
        }
    };

    if let Some(publication) = restored.as_ref() {
        ensure_slug_available(conn, publication)?;
    }

    db::set_publication_state(conn, &notebook.id, previous, now)?;
    match restored {
        Some(publication) => db::upsert_publication(conn, &publication)?,
        None => {
            db::delete_publication(conn, &notebook.id)?;
        }
    }
    db::mark_index_dirty(conn, &notebook.id, now)?;
    Ok(BTreeSet::from([notebook.id.clone()]))
}
