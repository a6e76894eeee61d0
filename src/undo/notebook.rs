use crate::db;
use crate::errors::{AppError, AppResult};
use crate::models::{CollabDocument, DeleteMode, Membership, MembershipRole, MembershipStatus, Publication};
use crate::snapshot::{parse_share_link, NotebookSnapshot};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RemovedSubtree {
    pub notebook: bool,
    pub notes: usize,
    pub memberships: usize,
    pub share_links: usize,
    pub publication: bool,
    pub document: bool,
}

/// Removes a notebook and everything hanging off it. Missing rows are not an error.
pub(crate) fn remove_notebook_subtree(
    conn: &Connection,
    notebook_id: &str,
    mode: DeleteMode,
    now: DateTime<Utc>,
) -> AppResult<RemovedSubtree> {
    let notes = match mode {
        DeleteMode::Delete => db::delete_notes_for_notebook(conn, notebook_id)?,
        DeleteMode::Detach => db::detach_notes_from_notebook(conn, notebook_id, now)?,
    };
    let removed = RemovedSubtree {
        notes,
        memberships: db::delete_memberships(conn, notebook_id)?,
        share_links: db::delete_share_links(conn, notebook_id)?,
        publication: db::delete_publication(conn, notebook_id)? > 0,
        document: db::delete_document(conn, notebook_id)? > 0,
        notebook: db::delete_notebook_row(conn, notebook_id)? > 0,
    };
    db::delete_index_state(conn, notebook_id)?;
    Ok(removed)
}

pub(super) fn delete_notebook(
    conn: &Connection,
    notebook_id: &str,
    now: DateTime<Utc>,
) -> AppResult<BTreeSet<String>> {
    let removed = remove_notebook_subtree(conn, notebook_id, DeleteMode::Delete, now)?;
    tracing::debug!(
        notebook_id = %notebook_id,
        notebook = removed.notebook,
        notes = removed.notes,
        memberships = removed.memberships,
        share_links = removed.share_links,
        publication = removed.publication,
        document = removed.document,
        "deleted notebook subtree"
    );
    Ok(BTreeSet::from([notebook_id.to_string()]))
}

pub(super) fn restore_notebook(
    conn: &Connection,
    snapshot: &NotebookSnapshot,
    now: DateTime<Utc>,
) -> AppResult<BTreeSet<String>> {
    snapshot.check_schema()?;
    let notebook = snapshot.restore_notebook(now);
    let notebook_id = notebook.id.clone();

    let publication = if notebook.is_public {
        let captured = snapshot.publication.as_ref().ok_or_else(|| {
            AppError::UndoUnsupportedPayload(format!(
                "notebook {} was public but its snapshot has no publication",
                notebook_id
            ))
        })?;
        let publication = captured.to_publication(&notebook_id);
        ensure_slug_available(conn, &publication)?;
        Some(publication)
    } else {
        None
    };
    let document_state = match snapshot.document.as_ref().filter(|document| document.removed) {
        Some(document) => Some(document.decode_state()?),
        None => None,
    };

    let mut affected = BTreeSet::from([notebook_id.clone()]);
    db::upsert_notebook(conn, &notebook)?;

    for membership in &snapshot.memberships {
        db::upsert_membership(conn, &membership.to_membership(&notebook_id))?;
    }
    let owner_active = snapshot.memberships.iter().any(|membership| {
        membership.user_id == notebook.owner_id
            && membership.role == MembershipRole::Owner
            && membership.status == MembershipStatus::Active
    });
    if !owner_active {
        db::upsert_membership(
            conn,
            &Membership {
                id: Uuid::new_v4().to_string(),
                notebook_id: notebook_id.clone(),
                user_id: notebook.owner_id.clone(),
                role: MembershipRole::Owner,
                status: MembershipStatus::Active,
                created_at: now,
            },
        )?;
    }

    for captured in &snapshot.notes {
        match db::get_note(conn, &captured.id)? {
            Some(live) => {
                if let Some(elsewhere) = live.notebook_id.as_deref().filter(|id| *id != notebook_id) {
                    if let Some(other) = db::get_notebook(conn, elsewhere)? {
                        let order: Vec<String> = other
                            .note_order
                            .into_iter()
                            .filter(|note_id| note_id != &captured.id)
                            .collect();
                        db::set_note_order(conn, elsewhere, &order, now)?;
                    }
                    affected.insert(elsewhere.to_string());
                }
                db::set_note_notebook(conn, &captured.id, Some(&notebook_id), now)?;
            }
            None => db::upsert_note(conn, &captured.to_note(&notebook_id))?,
        }
    }

    db::set_note_order(conn, &notebook_id, &notebook.note_order, now)?;

    for raw in &snapshot.share_links {
        match parse_share_link(raw, &notebook_id) {
            Ok(link) => {
                if !db::insert_share_link(conn, &link)? {
                    tracing::debug!(notebook_id = %notebook_id, link_id = %link.id, "share link already present");
                }
            }
            Err(reason) => {
                tracing::warn!(notebook_id = %notebook_id, reason = %reason, "skipping malformed share link in snapshot");
            }
        }
    }

    if let Some(state) = document_state {
        if db::get_document(conn, &notebook_id)?.is_none() {
            db::upsert_document(
                conn,
                &CollabDocument {
                    notebook_id: notebook_id.clone(),
                    state,
                    updated_at: now,
                },
            )?;
        }
    }

    if let Some(publication) = publication {
        db::upsert_publication(conn, &publication)?;
    }

    for id in &affected {
        db::mark_index_dirty(conn, id, now)?;
    }
    Ok(affected)
}

/// Fails with `EVENT_CONFLICT` when another notebook has published under the same slug.
pub(super) fn ensure_slug_available(conn: &Connection, publication: &Publication) -> AppResult<()> {
    match db::get_publication_by_slug(conn, &publication.slug)? {
        Some(holder) if holder.notebook_id != publication.notebook_id => Err(AppError::EventConflict(format!(
            "slug '{}' is now published by notebook {}",
            publication.slug, holder.notebook_id
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{delete_notebook, remove_notebook_subtree, restore_notebook};
    use crate::config::TransactionMode;
    use crate::db::{self, open_test_database};
    use crate::models::{
        CollabDocument, DeleteMode, Membership, MembershipRole, MembershipStatus, Note, Notebook, Publication,
        ShareLink, SharePermission,
    };
    use crate::snapshot::{capture_publication, NotebookSnapshot, SubtreeParts};
    use chrono::Utc;
    use serde_json::json;

    fn notebook(id: &str, order: &[&str]) -> Notebook {
        let now = Utc::now();
        Notebook {
            id: id.to_string(),
            owner_id: "user-1".to_string(),
            workspace_id: Some("ws-1".to_string()),
            name: format!("{} name", id),
            color: None,
            icon: None,
            description: None,
            is_public: false,
            public_slug: None,
            public_metadata: None,
            published_at: None,
            note_order: order.iter().map(|id| id.to_string()).collect(),
            created_at: now,
            updated_at: now,
        }
    }

    fn note(id: &str, notebook_id: &str) -> Note {
        let now = Utc::now();
        Note {
            id: id.to_string(),
            notebook_id: Some(notebook_id.to_string()),
            owner_id: "user-1".to_string(),
            title: format!("title {}", id),
            content: "body".to_string(),
            tags: vec!["t".to_string()],
            created_at: now,
            updated_at: now,
        }
    }

    fn seed_and_snapshot(db: &db::Database, mode: DeleteMode) -> NotebookSnapshot {
        let live = notebook("nb-1", &["n-1", "n-2"]);
        let editor = Membership {
            id: "m-2".to_string(),
            notebook_id: "nb-1".to_string(),
            user_id: "user-2".to_string(),
            role: MembershipRole::Editor,
            status: MembershipStatus::Active,
            created_at: Utc::now(),
        };
        let link = ShareLink {
            id: "l-1".to_string(),
            notebook_id: "nb-1".to_string(),
            token: "tok-1".to_string(),
            permission: SharePermission::View,
            created_by: "user-1".to_string(),
            created_at: Utc::now(),
            expires_at: None,
        };
        let document = CollabDocument {
            notebook_id: "nb-1".to_string(),
            state: vec![7, 7, 7],
            updated_at: Utc::now(),
        };
        db.read(|conn| {
            db::insert_notebook(conn, &live)?;
            db::insert_note(conn, &note("n-1", "nb-1"))?;
            db::insert_note(conn, &note("n-2", "nb-1"))?;
            db::upsert_membership(conn, &editor)?;
            db::insert_share_link(conn, &link)?;
            db::upsert_document(conn, &document)?;
            let parts = SubtreeParts {
                memberships: db::list_memberships(conn, "nb-1")?,
                notes: db::list_notes_for_notebook(conn, "nb-1")?,
                share_links: db::list_share_links(conn, "nb-1")?,
                publication: db::get_publication(conn, "nb-1")?,
                document: db::get_document(conn, "nb-1")?,
            };
            let removed = remove_notebook_subtree(conn, "nb-1", mode, Utc::now())?;
            NotebookSnapshot::capture(&live, &parts, mode, removed.document, Utc::now())
        })
        .expect("seed and delete")
    }

    #[test]
    fn restore_rebuilds_the_whole_subtree() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        let mut snapshot = seed_and_snapshot(&db, DeleteMode::Delete);
        snapshot.share_links.push(json!({ "id": "broken" }));

        let affected = db
            .read(|conn| restore_notebook(conn, &snapshot, Utc::now()))
            .expect("restore");
        assert_eq!(affected.into_iter().collect::<Vec<_>>(), vec!["nb-1".to_string()]);

        let restored = db.read(|conn| db::get_notebook(conn, "nb-1")).expect("get").expect("exists");
        assert_eq!(restored.note_order, vec!["n-1".to_string(), "n-2".to_string()]);
        let notes = db.read(|conn| db::list_notes_for_notebook(conn, "nb-1")).expect("notes");
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].tags, vec!["t".to_string()]);

        let memberships = db.read(|conn| db::list_memberships(conn, "nb-1")).expect("memberships");
        assert!(memberships
            .iter()
            .any(|m| m.user_id == "user-1" && m.role == MembershipRole::Owner && m.status == MembershipStatus::Active));
        assert!(memberships.iter().any(|m| m.user_id == "user-2"));

        assert_eq!(db.read(|conn| db::list_share_links(conn, "nb-1")).expect("links").len(), 1);
        let document = db.read(|conn| db::get_document(conn, "nb-1")).expect("doc").expect("exists");
        assert_eq!(document.state, vec![7, 7, 7]);
    }

    #[test]
    fn slug_taken_since_delete_conflicts_before_any_write() {
        let (_dir, db) = open_test_database(TransactionMode::Disabled);
        let mut snapshot = seed_and_snapshot(&db, DeleteMode::Delete);
        let publication = |notebook_id: &str| Publication {
            notebook_id: notebook_id.to_string(),
            slug: "x".to_string(),
            owner_id: "user-1".to_string(),
            title: "Published".to_string(),
            snapshot_hash: format!("hash-{}", notebook_id),
            metadata: json!({}),
            published_at: Utc::now(),
            updated_at: Utc::now(),
        };
        snapshot.notebook.is_public = true;
        snapshot.notebook.public_slug = Some("x".to_string());
        snapshot.publication = Some(capture_publication(&publication("nb-1")));
        db.read(|conn| {
            db::insert_notebook(conn, &notebook("nb-2", &[]))?;
            db::upsert_publication(conn, &publication("nb-2"))
        })
        .expect("second notebook takes the slug");

        let error = db
            .read(|conn| restore_notebook(conn, &snapshot, Utc::now()))
            .expect_err("slug conflict");
        assert_eq!(error.code(), "EVENT_CONFLICT");
        assert!(db.read(|conn| db::get_notebook(conn, "nb-1")).expect("get").is_none());
        assert!(db.read(|conn| db::list_notes_for_notebook(conn, "nb-1")).expect("notes").is_empty());
        assert!(db.read(|conn| db::list_memberships(conn, "nb-1")).expect("memberships").is_empty());
        assert!(db.read(|conn| db::get_document(conn, "nb-1")).expect("doc").is_none());
        let holder = db
            .read(|conn| db::get_publication_by_slug(conn, "x"))
            .expect("get")
            .expect("still published");
        assert_eq!(holder.notebook_id, "nb-2");
    }

    #[test]
    fn detached_notes_are_reattached_and_moved_notes_pulled_back() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        let snapshot = seed_and_snapshot(&db, DeleteMode::Detach);
        db.read(|conn| {
            db::insert_notebook(conn, &notebook("nb-2", &["n-2"]))?;
            db::set_note_notebook(conn, "n-2", Some("nb-2"), Utc::now())?;
            db::upsert_note(
                conn,
                &Note {
                    title: "edited while detached".to_string(),
                    ..note("n-1", "nb-1")
                },
            )?;
            db::set_note_notebook(conn, "n-1", None, Utc::now())?;
            Ok(())
        })
        .expect("drift");

        let affected = db
            .read(|conn| restore_notebook(conn, &snapshot, Utc::now()))
            .expect("restore");
        assert_eq!(
            affected.into_iter().collect::<Vec<_>>(),
            vec!["nb-1".to_string(), "nb-2".to_string()]
        );

        let n1 = db.read(|conn| db::get_note(conn, "n-1")).expect("get").expect("exists");
        assert_eq!(n1.notebook_id.as_deref(), Some("nb-1"));
        assert_eq!(n1.title, "edited while detached");
        let nb2 = db.read(|conn| db::get_notebook(conn, "nb-2")).expect("get").expect("exists");
        assert!(nb2.note_order.is_empty());
    }

    #[test]
    fn live_document_is_not_overwritten() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        let snapshot = seed_and_snapshot(&db, DeleteMode::Delete);
        db.read(|conn| {
            db::upsert_document(
                conn,
                &CollabDocument {
                    notebook_id: "nb-1".to_string(),
                    state: vec![1],
                    updated_at: Utc::now(),
                },
            )
        })
        .expect("new document");
        db.read(|conn| restore_notebook(conn, &snapshot, Utc::now()))
            .expect("restore");
        let document = db.read(|conn| db::get_document(conn, "nb-1")).expect("doc").expect("exists");
        assert_eq!(document.state, vec![1]);
    }

    #[test]
    fn removal_counts_every_part_of_the_subtree() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        let removed = db
            .read(|conn| {
                db::insert_notebook(conn, &notebook("nb-1", &["n-1"]))?;
                db::insert_note(conn, &note("n-1", "nb-1"))?;
                db::insert_share_link(
                    conn,
                    &ShareLink {
                        id: "l-1".to_string(),
                        notebook_id: "nb-1".to_string(),
                        token: "tok-1".to_string(),
                        permission: SharePermission::View,
                        created_by: "user-1".to_string(),
                        created_at: Utc::now(),
                        expires_at: None,
                    },
                )?;
                db::upsert_publication(
                    conn,
                    &Publication {
                        notebook_id: "nb-1".to_string(),
                        slug: "nb-1".to_string(),
                        owner_id: "user-1".to_string(),
                        title: "nb-1 name".to_string(),
                        snapshot_hash: "hash".to_string(),
                        metadata: json!({}),
                        published_at: Utc::now(),
                        updated_at: Utc::now(),
                    },
                )?;
                remove_notebook_subtree(conn, "nb-1", DeleteMode::Delete, Utc::now())
            })
            .expect("remove");
        assert!(removed.notebook);
        assert_eq!(removed.notes, 1);
        assert_eq!(removed.share_links, 1);
        assert!(removed.publication);
        assert!(!removed.document);
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, db) = open_test_database(TransactionMode::Auto);
        db.read(|conn| {
            db::insert_notebook(conn, &notebook("nb-1", &[]))?;
            db::insert_note(conn, &note("n-1", "nb-1"))
        })
        .expect("seed");
        db.read(|conn| delete_notebook(conn, "nb-1", Utc::now())).expect("first");
        db.read(|conn| delete_notebook(conn, "nb-1", Utc::now())).expect("second");
        assert!(db.read(|conn| db::get_notebook(conn, "nb-1")).expect("get").is_none());
        assert!(db.read(|conn| db::get_note(conn, "n-1")).expect("get").is_none());
    }
}
