use crate::config::HistoryConfig;
use crate::db::{self, Database};
use crate::errors::{AppError, AppResult};
use crate::guard::apply_undo_for_notebook_event;
use crate::indexer::SearchIndexer;
use crate::models::{
    AddMemberRequest, ChainReport, CollabDocument, CommandPayload, CreateNoteRequest, CreateNotebookRequest,
    CreateShareLinkRequest, DeleteNotebookRequest, Membership, MembershipRole, MembershipStatus,
    MoveNotesRequest, NewNotebookEvent, Note, NotePlacement, Notebook, NotebookEvent, NotebookEventType,
    Publication, PublicationState, PublishNotebookRequest, RecordSyncRequest, RecordedCommand, ShareLink,
    UndoAction, UndoOutcome, UndoRequest, UnpublishNotebookRequest, UpdateNotebookRequest,
};
use crate::recorder::{append_notebook_event, verify_chain, EventLimits};
use crate::snapshot::{capture_publication, content_hash, NotebookSnapshot, SubtreeParts};
use crate::undo::remove_notebook_subtree;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,62}[a-z0-9])?$").expect("valid slug regex"));

/// Notebook commands. Every mutating command runs under
/// [`Database::run_command`] and records exactly one event.
pub struct NotebookService {
    db: Arc<Database>,
    indexer: Arc<dyn SearchIndexer>,
    limits: EventLimits,
}

impl NotebookService {
    pub fn open(config: &HistoryConfig, indexer: Arc<dyn SearchIndexer>) -> AppResult<Self> {
        let db = Arc::new(Database::new(&config.database_path, config.transactions)?);
        Ok(Self::new(db, indexer, config.event_limits()))
    }

    pub fn new(db: Arc<Database>, indexer: Arc<dyn SearchIndexer>, limits: EventLimits) -> Self {
        Self { db, indexer, limits }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn create_notebook(&self, request: CreateNotebookRequest) -> AppResult<RecordedCommand<Notebook>> {
        require("ownerId", &request.owner_id)?;
        require("actorId", &request.actor_id)?;
        let name = request.name.trim().to_string();
        require("name", &name)?;

        self.db.run_command("create_notebook", |conn| {
            let now = Utc::now();
            let notebook = Notebook {
                id: Uuid::new_v4().to_string(),
                owner_id: request.owner_id.clone(),
                workspace_id: request.workspace_id.clone(),
                name: name.clone(),
                color: request.color.clone(),
                icon: request.icon.clone(),
                description: request.description.clone(),
                is_public: false,
                public_slug: None,
                public_metadata: None,
                published_at: None,
                note_order: Vec::new(),
                created_at: now,
                updated_at: now,
            };
            db::insert_notebook(conn, &notebook)?;
            db::upsert_membership(
                conn,
                &Membership {
                    id: Uuid::new_v4().to_string(),
                    notebook_id: notebook.id.clone(),
                    user_id: notebook.owner_id.clone(),
                    role: MembershipRole::Owner,
                    status: MembershipStatus::Active,
                    created_at: now,
                },
            )?;
            db::mark_index_dirty(conn, &notebook.id, now)?;

            let event = self.record(
                conn,
                NewNotebookEvent::for_notebook(
                    &notebook,
                    &request.actor_id,
                    NotebookEventType::Create,
                    CommandPayload::Create {
                        name: notebook.name.clone(),
                        workspace_id: notebook.workspace_id.clone(),
                    },
                    UndoAction::DeleteNotebook {
                        notebook_id: notebook.id.clone(),
                    },
                )
                .command("create_notebook")
                .summary(format!("Created notebook \"{}\"", notebook.name)),
            )?;
            Ok(RecordedCommand { result: notebook, event })
        })
    }

    pub fn update_notebook(&self, request: UpdateNotebookRequest) -> AppResult<RecordedCommand<Notebook>> {
        require("actorId", &request.actor_id)?;
        if request.changes.is_empty() {
            return Err(AppError::InvalidInput(
                "update needs at least one of name, color, icon, description".to_string(),
            ));
        }
        if matches!(request.changes.name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(AppError::InvalidInput("name cannot be empty".to_string()));
        }

        self.db.run_command("update_notebook", |conn| {
            let now = Utc::now();
            let notebook = load_notebook(conn, &request.notebook_id)?;
            let previous = request.changes.previous_values(&notebook);
            let updated = db::set_notebook_fields(conn, &notebook.id, &request.changes, now)?
                .ok_or_else(|| AppError::NotebookNotFound(notebook.id.clone()))?;
            db::mark_index_dirty(conn, &notebook.id, now)?;

            let summary = format!("Updated {}", request.changes.field_names().join(", "));
            let event = self.record(
                conn,
                NewNotebookEvent::for_notebook(
                    &updated,
                    &request.actor_id,
                    NotebookEventType::Update,
                    CommandPayload::Update {
                        changes: request.changes.clone(),
                    },
                    UndoAction::RestoreNotebookFields { previous },
                )
                .command("update_notebook")
                .summary(summary),
            )?;
            Ok(RecordedCommand { result: updated, event })
        })
    }

    pub fn delete_notebook(&self, request: DeleteNotebookRequest) -> AppResult<RecordedCommand<Notebook>> {
        require("actorId", &request.actor_id)?;

        self.db.run_command("delete_notebook", |conn| {
            let now = Utc::now();
            let notebook = load_notebook(conn, &request.notebook_id)?;
            let parts = SubtreeParts {
                memberships: db::list_memberships(conn, &notebook.id)?,
                notes: db::list_notes_for_notebook(conn, &notebook.id)?,
                share_links: db::list_share_links(conn, &notebook.id)?,
                publication: db::get_publication(conn, &notebook.id)?,
                document: db::get_document(conn, &notebook.id)?,
            };
            let removed = remove_notebook_subtree(conn, &notebook.id, request.mode, now)?;
            let snapshot = NotebookSnapshot::capture(&notebook, &parts, request.mode, removed.document, now)?;

            let event = self.record(
                conn,
                NewNotebookEvent::for_notebook(
                    &notebook,
                    &request.actor_id,
                    NotebookEventType::Delete,
                    CommandPayload::Delete {
                        name: notebook.name.clone(),
                        mode: request.mode,
                        note_count: parts.notes.len(),
                    },
                    UndoAction::RestoreNotebook {
                        snapshot: Box::new(snapshot),
                    },
                )
                .command("delete_notebook")
                .summary(format!("Deleted notebook \"{}\"", notebook.name)),
            )?;
            Ok(RecordedCommand { result: notebook, event })
        })
    }

    /// Moves notes into `target_notebook_id`. The event is recorded on the
    /// target; notes already there are left alone.
    pub fn move_notes(&self, request: MoveNotesRequest) -> AppResult<RecordedCommand<Vec<Note>>> {
        require("actorId", &request.actor_id)?;
        let mut seen = BTreeSet::new();
        let note_ids: Vec<String> = request
            .note_ids
            .iter()
            .filter(|note_id| !note_id.trim().is_empty() && seen.insert(note_id.as_str()))
            .cloned()
            .collect();
        if note_ids.is_empty() {
            return Err(AppError::InvalidInput("noteIds cannot be empty".to_string()));
        }

        self.db.run_command("move_notes", |conn| {
            let now = Utc::now();
            let target = load_notebook(conn, &request.target_notebook_id)?;

            let mut placements = Vec::new();
            let mut sources: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            for note_id in &note_ids {
                let note = db::get_note(conn, note_id)?
                    .ok_or_else(|| AppError::NotFound(format!("note {}", note_id)))?;
                if note.notebook_id.as_deref() == Some(target.id.as_str()) {
                    continue;
                }
                if let Some(source) = note.notebook_id.as_ref() {
                    sources.entry(source.clone()).or_default().insert(note.id.clone());
                }
                placements.push(NotePlacement {
                    note_id: note.id.clone(),
                    notebook_id: note.notebook_id.clone(),
                });
            }
            if placements.is_empty() {
                return Err(AppError::InvalidInput(format!(
                    "every note is already in notebook {}",
                    target.id
                )));
            }

            for (source_id, moved) in &sources {
                if let Some(source) = db::get_notebook(conn, source_id)? {
                    let order: Vec<String> = source
                        .note_order
                        .into_iter()
                        .filter(|note_id| !moved.contains(note_id))
                        .collect();
                    db::set_note_order(conn, source_id, &order, now)?;
                    db::mark_index_dirty(conn, source_id, now)?;
                }
            }
            let mut order = target.note_order.clone();
            let mut moved_notes = Vec::with_capacity(placements.len());
            for placement in &placements {
                db::set_note_notebook(conn, &placement.note_id, Some(&target.id), now)?;
                if !order.contains(&placement.note_id) {
                    order.push(placement.note_id.clone());
                }
                if let Some(note) = db::get_note(conn, &placement.note_id)? {
                    moved_notes.push(note);
                }
            }
            db::set_note_order(conn, &target.id, &order, now)?;
            db::mark_index_dirty(conn, &target.id, now)?;

            let moved_ids: Vec<String> = placements.iter().map(|placement| placement.note_id.clone()).collect();
            let mut new_event = NewNotebookEvent::for_notebook(
                &target,
                &request.actor_id,
                NotebookEventType::MoveNotes,
                CommandPayload::MoveNotes {
                    target_notebook_id: target.id.clone(),
                    note_ids: moved_ids.clone(),
                },
                UndoAction::RestoreNoteNotebook { notes: placements },
            )
            .command("move_notes")
            .summary(format!("Moved {} note(s) into \"{}\"", moved_ids.len(), target.name));
            if let [single] = moved_ids.as_slice() {
                new_event.note_id = Some(single.clone());
            }
            let event = self.record(conn, new_event)?;
            Ok(RecordedCommand {
                result: moved_notes,
                event,
            })
        })
    }

    pub fn publish_notebook(&self, request: PublishNotebookRequest) -> AppResult<RecordedCommand<Publication>> {
        require("actorId", &request.actor_id)?;
        let slug = request.slug.trim().to_string();
        if !SLUG_RE.is_match(&slug) {
            return Err(AppError::InvalidInput(format!("invalid publication slug '{}'", slug)));
        }
        let metadata = request.metadata.clone().unwrap_or_else(|| json!({}));
        if !metadata.is_object() {
            return Err(AppError::InvalidInput("publication metadata must be an object".to_string()));
        }

        self.db.run_command("publish_notebook", |conn| {
            let now = Utc::now();
            let notebook = load_notebook(conn, &request.notebook_id)?;
            if let Some(existing) = db::get_publication_by_slug(conn, &slug)? {
                if existing.notebook_id != notebook.id {
                    return Err(AppError::InvalidInput(format!("slug '{}' is already published", slug)));
                }
            }
            let notes = db::list_notes_for_notebook(conn, &notebook.id)?;
            let previous = notebook.publication_state();
            let prior_publication = db::get_publication(conn, &notebook.id)?.map(|live| capture_publication(&live));

            let publication = Publication {
                notebook_id: notebook.id.clone(),
                slug: slug.clone(),
                owner_id: notebook.owner_id.clone(),
                title: notebook.name.clone(),
                snapshot_hash: content_hash(&notebook, &notes),
                metadata: metadata.clone(),
                published_at: now,
                updated_at: now,
            };
            db::set_publication_state(
                conn,
                &notebook.id,
                &PublicationState {
                    is_public: true,
                    slug: Some(slug.clone()),
                    metadata: Some(metadata.clone()),
                    published_at: Some(now),
                },
                now,
            )?;
            db::upsert_publication(conn, &publication)?;
            db::mark_index_dirty(conn, &notebook.id, now)?;

            let event = self.record(
                conn,
                NewNotebookEvent::for_notebook(
                    &notebook,
                    &request.actor_id,
                    NotebookEventType::Publish,
                    CommandPayload::Publish {
                        slug: slug.clone(),
                        snapshot_hash: publication.snapshot_hash.clone(),
                    },
                    UndoAction::RestoreNotebookPublication {
                        previous,
                        publication: prior_publication,
                    },
                )
                .command("publish_notebook")
                .summary(format!("Published \"{}\" at /{}", notebook.name, slug)),
            )?;
            Ok(RecordedCommand {
                result: publication,
                event,
            })
        })
    }

    pub fn unpublish_notebook(&self, request: UnpublishNotebookRequest) -> AppResult<RecordedCommand<Notebook>> {
        require("actorId", &request.actor_id)?;

        self.db.run_command("unpublish_notebook", |conn| {
            let now = Utc::now();
            let notebook = load_notebook(conn, &request.notebook_id)?;
            if !notebook.is_public {
                return Err(AppError::InvalidInput(format!("notebook {} is not published", notebook.id)));
            }
            let previous = notebook.publication_state();
            let captured = db::get_publication(conn, &notebook.id)?.map(|live| capture_publication(&live));

            db::set_publication_state(
                conn,
                &notebook.id,
                &PublicationState {
                    is_public: false,
                    slug: None,
                    metadata: None,
                    published_at: None,
                },
                now,
            )?;
            db::delete_publication(conn, &notebook.id)?;
            db::mark_index_dirty(conn, &notebook.id, now)?;
            let updated = load_notebook(conn, &notebook.id)?;

            let event = self.record(
                conn,
                NewNotebookEvent::for_notebook(
                    &notebook,
                    &request.actor_id,
                    NotebookEventType::Unpublish,
                    CommandPayload::Unpublish {
                        slug: previous.slug.clone(),
                    },
                    UndoAction::RestoreNotebookPublication {
                        previous,
                        publication: captured,
                    },
                )
                .command("unpublish_notebook")
                .summary(format!("Unpublished \"{}\"", notebook.name)),
            )?;
            Ok(RecordedCommand { result: updated, event })
        })
    }

    /// Records an offline-sync checkpoint. Sync events cannot be undone.
    pub fn record_sync(&self, request: RecordSyncRequest) -> AppResult<NotebookEvent> {
        require("actorId", &request.actor_id)?;
        require("deviceId", &request.device_id)?;

        self.db.run_command("record_sync", |conn| {
            let notebook = load_notebook(conn, &request.notebook_id)?;
            let mut new_event = NewNotebookEvent::for_notebook(
                &notebook,
                &request.actor_id,
                NotebookEventType::Sync,
                CommandPayload::Sync {
                    device_id: request.device_id.clone(),
                    status: request.status.clone(),
                    error: request.error.clone(),
                },
                UndoAction::Noop,
            )
            .command("record_sync")
            .summary(format!("Sync from {}: {}", request.device_id, request.status));
            if let Some(error) = request.error.as_ref() {
                new_event
                    .metadata
                    .insert("error".to_string(), Value::String(error.clone()));
            }
            self.record(conn, new_event)
        })
    }

    pub fn undo_event(&self, request: UndoRequest) -> AppResult<UndoOutcome> {
        require("notebookId", &request.notebook_id)?;
        require("eventId", &request.event_id)?;
        require("ownerId", &request.owner_id)?;
        require("actorId", &request.actor_id)?;

        let outcome = self
            .db
            .run_command("undo_event", |conn| apply_undo_for_notebook_event(conn, &request, &self.limits))?;

        if let Err(error) = self.indexer.invalidate_notebooks(&outcome.affected_notebook_ids) {
            tracing::warn!(
                event_id = %request.event_id,
                notebooks = ?outcome.affected_notebook_ids,
                error = %error,
                "search index invalidation failed after undo"
            );
        }
        Ok(outcome)
    }

    pub fn create_note(&self, request: CreateNoteRequest) -> AppResult<Note> {
        require("ownerId", &request.owner_id)?;
        require("title", &request.title)?;

        self.db.run_command("create_note", |conn| {
            let now = Utc::now();
            let notebook = match request.notebook_id.as_deref() {
                Some(notebook_id) => Some(load_notebook(conn, notebook_id)?),
                None => None,
            };
            let note = Note {
                id: Uuid::new_v4().to_string(),
                notebook_id: notebook.as_ref().map(|notebook| notebook.id.clone()),
                owner_id: request.owner_id.clone(),
                title: request.title.clone(),
                content: request.content.clone(),
                tags: request.tags.clone(),
                created_at: now,
                updated_at: now,
            };
            db::insert_note(conn, &note)?;
            if let Some(notebook) = notebook {
                let mut order = notebook.note_order;
                order.push(note.id.clone());
                db::set_note_order(conn, &notebook.id, &order, now)?;
                db::mark_index_dirty(conn, &notebook.id, now)?;
            }
            Ok(note)
        })
    }

    pub fn add_member(&self, request: AddMemberRequest) -> AppResult<Membership> {
        require("userId", &request.user_id)?;

        self.db.run_command("add_member", |conn| {
            let notebook = load_notebook(conn, &request.notebook_id)?;
            let membership = Membership {
                id: Uuid::new_v4().to_string(),
                notebook_id: notebook.id.clone(),
                user_id: request.user_id.clone(),
                role: request.role,
                status: request.status.unwrap_or(MembershipStatus::Invited),
                created_at: Utc::now(),
            };
            db::upsert_membership(conn, &membership)?;
            db::list_memberships(conn, &notebook.id)?
                .into_iter()
                .find(|stored| stored.user_id == membership.user_id)
                .ok_or_else(|| AppError::Internal(format!("membership for {} was not stored", membership.user_id)))
        })
    }

    pub fn create_share_link(&self, request: CreateShareLinkRequest) -> AppResult<ShareLink> {
        require("createdBy", &request.created_by)?;

        self.db.run_command("create_share_link", |conn| {
            let notebook = load_notebook(conn, &request.notebook_id)?;
            let link = ShareLink {
                id: Uuid::new_v4().to_string(),
                notebook_id: notebook.id.clone(),
                token: Uuid::new_v4().simple().to_string(),
                permission: request.permission,
                created_by: request.created_by.clone(),
                created_at: Utc::now(),
                expires_at: request.expires_at,
            };
            if !db::insert_share_link(conn, &link)? {
                return Err(AppError::Internal("share link token collision".to_string()));
            }
            Ok(link)
        })
    }

    pub fn save_document(&self, notebook_id: &str, state: Vec<u8>) -> AppResult<CollabDocument> {
        self.db.run_command("save_document", |conn| {
            let notebook = load_notebook(conn, notebook_id)?;
            let document = CollabDocument {
                notebook_id: notebook.id,
                state: state.clone(),
                updated_at: Utc::now(),
            };
            db::upsert_document(conn, &document)?;
            Ok(document)
        })
    }

    pub fn get_notebook(&self, notebook_id: &str) -> AppResult<Notebook> {
        self.db.read(|conn| load_notebook(conn, notebook_id))
    }

    pub fn get_note(&self, note_id: &str) -> AppResult<Note> {
        self.db.read(|conn| {
            db::get_note(conn, note_id)?.ok_or_else(|| AppError::NotFound(format!("note {}", note_id)))
        })
    }

    pub fn list_notes(&self, notebook_id: &str) -> AppResult<Vec<Note>> {
        self.db.read(|conn| db::list_notes_for_notebook(conn, notebook_id))
    }

    pub fn list_memberships(&self, notebook_id: &str) -> AppResult<Vec<Membership>> {
        self.db.read(|conn| db::list_memberships(conn, notebook_id))
    }

    pub fn list_share_links(&self, notebook_id: &str) -> AppResult<Vec<ShareLink>> {
        self.db.read(|conn| db::list_share_links(conn, notebook_id))
    }

    pub fn get_publication(&self, notebook_id: &str) -> AppResult<Option<Publication>> {
        self.db.read(|conn| db::get_publication(conn, notebook_id))
    }

    pub fn get_document(&self, notebook_id: &str) -> AppResult<Option<CollabDocument>> {
        self.db.read(|conn| db::get_document(conn, notebook_id))
    }

    pub fn list_events(&self, notebook_id: &str) -> AppResult<Vec<NotebookEvent>> {
        self.db.read(|conn| db::list_events(conn, notebook_id))
    }

    pub fn get_event(&self, event_id: &str) -> AppResult<NotebookEvent> {
        self.db.read(|conn| {
            db::get_event(conn, event_id)?.ok_or_else(|| AppError::EventNotFound(event_id.to_string()))
        })
    }

    pub fn verify_chain(&self, notebook_id: &str) -> AppResult<ChainReport> {
        self.db.read(|conn| verify_chain(conn, notebook_id))
    }

    fn record(&self, conn: &Connection, event: NewNotebookEvent) -> AppResult<NotebookEvent> {
        append_notebook_event(conn, event, &self.limits)
    }
}

fn load_notebook(conn: &Connection, notebook_id: &str) -> AppResult<Notebook> {
    db::get_notebook(conn, notebook_id)?.ok_or_else(|| AppError::NotebookNotFound(notebook_id.to_string()))
}

fn require(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{} is required", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::NotebookService;
    use crate::config::{HistoryConfig, TransactionMode};
    use crate::indexer::NoopIndexer;
    use crate::models::{
        CreateNoteRequest, CreateNotebookRequest, MembershipRole, MoveNotesRequest, PublishNotebookRequest,
        RecordSyncRequest, UndoRequest,
    };
    use std::sync::Arc;

    fn service() -> (tempfile::TempDir, NotebookService) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = HistoryConfig {
            database_path: dir.path().join("history.db"),
            transactions: TransactionMode::Auto,
            ..HistoryConfig::default()
        };
        let service = NotebookService::open(&config, Arc::new(NoopIndexer)).expect("service");
        (dir, service)
    }

    fn create(service: &NotebookService, name: &str) -> String {
        service
            .create_notebook(CreateNotebookRequest {
                owner_id: "user-1".to_string(),
                workspace_id: None,
                actor_id: "user-1".to_string(),
                name: name.to_string(),
                color: None,
                icon: None,
                description: None,
            })
            .expect("create notebook")
            .result
            .id
    }

    #[test]
    fn create_adds_owner_membership_and_first_event() {
        let (_dir, service) = service();
        let notebook_id = create(&service, "Inbox");
        let memberships = service.list_memberships(&notebook_id).expect("memberships");
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].role, MembershipRole::Owner);

        let events = service.list_events(&notebook_id).expect("events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].command_name, "create_notebook");
        assert!(events[0].prev_event_id.is_none());
    }

    #[test]
    fn rejects_blank_names_and_bad_slugs() {
        let (_dir, service) = service();
        let error = service
            .create_notebook(CreateNotebookRequest {
                owner_id: "user-1".to_string(),
                workspace_id: None,
                actor_id: "user-1".to_string(),
                name: "   ".to_string(),
                color: None,
                icon: None,
                description: None,
            })
            .expect_err("blank name");
        assert_eq!(error.code(), "INVALID_INPUT");

        let notebook_id = create(&service, "Inbox");
        let error = service
            .publish_notebook(PublishNotebookRequest {
                notebook_id,
                actor_id: "user-1".to_string(),
                slug: "Not A Slug".to_string(),
                metadata: None,
            })
            .expect_err("bad slug");
        assert_eq!(error.code(), "INVALID_INPUT");
    }

    #[test]
    fn move_records_on_target_and_skips_resident_notes() {
        let (_dir, service) = service();
        let source = create(&service, "Source");
        let target = create(&service, "Target");
        let note = service
            .create_note(CreateNoteRequest {
                notebook_id: Some(source.clone()),
                owner_id: "user-1".to_string(),
                title: "Draft".to_string(),
                content: String::new(),
                tags: Vec::new(),
            })
            .expect("note");

        let moved = service
            .move_notes(MoveNotesRequest {
                target_notebook_id: target.clone(),
                actor_id: "user-1".to_string(),
                note_ids: vec![note.id.clone(), note.id.clone()],
            })
            .expect("move");
        assert_eq!(moved.result.len(), 1);
        assert_eq!(moved.event.note_id.as_deref(), Some(note.id.as_str()));
        assert_eq!(moved.event.notebook_id, target);
        assert!(service.get_notebook(&source).expect("source").note_order.is_empty());

        let error = service
            .move_notes(MoveNotesRequest {
                target_notebook_id: target,
                actor_id: "user-1".to_string(),
                note_ids: vec![note.id],
            })
            .expect_err("already there");
        assert_eq!(error.code(), "INVALID_INPUT");
    }

    #[test]
    fn sync_events_are_not_undoable() {
        let (_dir, service) = service();
        let notebook_id = create(&service, "Inbox");
        let event = service
            .record_sync(RecordSyncRequest {
                notebook_id: notebook_id.clone(),
                actor_id: "user-1".to_string(),
                device_id: "tablet".to_string(),
                status: "failed".to_string(),
                error: Some("timeout".to_string()),
            })
            .expect("sync");
        assert_eq!(event.metadata.get("error").and_then(|value| value.as_str()), Some("timeout"));

        let error = service
            .undo_event(UndoRequest {
                notebook_id,
                event_id: event.id,
                owner_id: "user-1".to_string(),
                actor_id: "user-1".to_string(),
            })
            .expect_err("sync undo");
        assert_eq!(error.code(), "UNDO_UNSUPPORTED");
    }
}
