//! Store-agnostic copies of a notebook subtree, embedded in undo payloads.
//!
//! Snapshots never reference live rows: everything a restore needs is inside
//! the snapshot. New fields must be `#[serde(default)]` so older events keep
//! deserializing; breaking changes bump [`SNAPSHOT_SCHEMA_VERSION`].

use crate::errors::{AppError, AppResult};
use crate::models::{
    CollabDocument, DeleteMode, Membership, MembershipRole, MembershipStatus, Note, Notebook, Publication,
    ShareLink, SharePermission,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

fn initial_schema_version() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookSnapshot {
    #[serde(default = "initial_schema_version")]
    pub schema_version: u32,
    pub notebook: NotebookState,
    #[serde(default)]
    pub delete_mode: DeleteMode,
    #[serde(default)]
    pub memberships: Vec<MembershipSnapshot>,
    #[serde(default)]
    pub notes: Vec<NoteSnapshot>,
    #[serde(default)]
    pub note_order: Vec<String>,
    // Kept loose so one bad entry does not make the whole snapshot unreadable.
    #[serde(default)]
    pub share_links: Vec<Value>,
    #[serde(default)]
    pub publication: Option<PublicationSnapshot>,
    #[serde(default)]
    pub document: Option<DocumentSnapshot>,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookState {
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    pub workspace_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub public_slug: Option<String>,
    #[serde(default)]
    pub public_metadata: Option<Value>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipSnapshot {
    pub id: String,
    pub user_id: String,
    pub role: MembershipRole,
    pub status: MembershipStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteSnapshot {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLinkSnapshot {
    pub id: String,
    pub token: String,
    pub permission: SharePermission,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationSnapshot {
    pub slug: String,
    pub owner_id: String,
    pub title: String,
    pub snapshot_hash: String,
    #[serde(default)]
    pub metadata: Value,
    pub published_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    /// Base64 (standard alphabet) of the collaborative document state.
    pub state: String,
    /// Whether the destructive command actually removed the live blob.
    pub removed: bool,
}

/// Live rows making up one notebook subtree, read inside the deleting command.
#[derive(Debug, Clone, Default)]
pub struct SubtreeParts {
    pub memberships: Vec<Membership>,
    pub notes: Vec<Note>,
    pub share_links: Vec<ShareLink>,
    pub publication: Option<Publication>,
    pub document: Option<CollabDocument>,
}

impl NotebookSnapshot {
    pub fn capture(
        notebook: &Notebook,
        parts: &SubtreeParts,
        delete_mode: DeleteMode,
        document_removed: bool,
        captured_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        Ok(Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            notebook: capture_notebook(notebook),
            delete_mode,
            memberships: parts.memberships.iter().map(capture_membership).collect(),
            notes: parts.notes.iter().map(capture_note).collect(),
            note_order: notebook.note_order.clone(),
            share_links: parts
                .share_links
                .iter()
                .map(capture_share_link)
                .collect::<AppResult<Vec<_>>>()?,
            publication: parts.publication.as_ref().map(capture_publication),
            document: parts
                .document
                .as_ref()
                .map(|document| capture_document(document, document_removed)),
            captured_at: Some(captured_at),
        })
    }

    pub fn check_schema(&self) -> AppResult<()> {
        if self.schema_version == 0 || self.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(AppError::UndoUnsupportedPayload(format!(
                "snapshot schema version {} is not supported (max {})",
                self.schema_version, SNAPSHOT_SCHEMA_VERSION
            )));
        }
        if self.notebook.id.trim().is_empty() || self.notebook.owner_id.trim().is_empty() {
            return Err(AppError::UndoUnsupportedPayload(
                "snapshot is missing the notebook id or owner".to_string(),
            ));
        }
        Ok(())
    }

    pub fn restore_notebook(&self, now: DateTime<Utc>) -> Notebook {
        let state = &self.notebook;
        Notebook {
            id: state.id.clone(),
            owner_id: state.owner_id.clone(),
            workspace_id: state.workspace_id.clone(),
            name: state.name.clone(),
            color: state.color.clone(),
            icon: state.icon.clone(),
            description: state.description.clone(),
            is_public: state.is_public,
            public_slug: state.public_slug.clone(),
            public_metadata: state.public_metadata.clone(),
            published_at: state.published_at,
            note_order: dedupe_order(&self.note_order),
            created_at: state.created_at,
            updated_at: now,
        }
    }
}

pub fn capture_notebook(notebook: &Notebook) -> NotebookState {
    NotebookState {
        id: notebook.id.clone(),
        owner_id: notebook.owner_id.clone(),
        workspace_id: notebook.workspace_id.clone(),
        name: notebook.name.clone(),
        color: notebook.color.clone(),
        icon: notebook.icon.clone(),
        description: notebook.description.clone(),
        is_public: notebook.is_public,
        public_slug: notebook.public_slug.clone(),
        public_metadata: notebook.public_metadata.clone(),
        published_at: notebook.published_at,
        created_at: notebook.created_at,
    }
}

pub fn capture_membership(membership: &Membership) -> MembershipSnapshot {
    MembershipSnapshot {
        id: membership.id.clone(),
        user_id: membership.user_id.clone(),
        role: membership.role,
        status: membership.status,
        created_at: membership.created_at,
    }
}

pub fn capture_note(note: &Note) -> NoteSnapshot {
    NoteSnapshot {
        id: note.id.clone(),
        owner_id: note.owner_id.clone(),
        title: note.title.clone(),
        content: note.content.clone(),
        tags: note.tags.clone(),
        created_at: note.created_at,
        updated_at: note.updated_at,
    }
}

pub fn capture_share_link(link: &ShareLink) -> AppResult<Value> {
    let snapshot = ShareLinkSnapshot {
        id: link.id.clone(),
        token: link.token.clone(),
        permission: link.permission,
        created_by: link.created_by.clone(),
        created_at: link.created_at,
        expires_at: link.expires_at,
    };
    Ok(serde_json::to_value(snapshot)?)
}

pub fn capture_publication(publication: &Publication) -> PublicationSnapshot {
    PublicationSnapshot {
        slug: publication.slug.clone(),
        owner_id: publication.owner_id.clone(),
        title: publication.title.clone(),
        snapshot_hash: publication.snapshot_hash.clone(),
        metadata: publication.metadata.clone(),
        published_at: publication.published_at,
        updated_at: publication.updated_at,
    }
}

pub fn capture_document(document: &CollabDocument, removed: bool) -> DocumentSnapshot {
    DocumentSnapshot {
        state: base64::engine::general_purpose::STANDARD.encode(&document.state),
        removed,
    }
}

impl MembershipSnapshot {
    pub fn to_membership(&self, notebook_id: &str) -> Membership {
        Membership {
            id: self.id.clone(),
            notebook_id: notebook_id.to_string(),
            user_id: self.user_id.clone(),
            role: self.role,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

impl NoteSnapshot {
    pub fn to_note(&self, notebook_id: &str) -> Note {
        Note {
            id: self.id.clone(),
            notebook_id: Some(notebook_id.to_string()),
            owner_id: self.owner_id.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            tags: self.tags.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl PublicationSnapshot {
    pub fn to_publication(&self, notebook_id: &str) -> Publication {
        Publication {
            notebook_id: notebook_id.to_string(),
            slug: self.slug.clone(),
            owner_id: self.owner_id.clone(),
            title: self.title.clone(),
            snapshot_hash: self.snapshot_hash.clone(),
            metadata: self.metadata.clone(),
            published_at: self.published_at,
            updated_at: self.updated_at,
        }
    }
}

impl DocumentSnapshot {
    pub fn decode_state(&self) -> AppResult<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(self.state.as_bytes())
            .map_err(|error| {
                AppError::UndoUnsupportedPayload(format!("document snapshot is not valid base64: {}", error))
            })
    }
}

/// Parses one captured share link, returning why it was rejected when malformed.
pub fn parse_share_link(raw: &Value, notebook_id: &str) -> Result<ShareLink, String> {
    let snapshot: ShareLinkSnapshot = serde_json::from_value(raw.clone()).map_err(|error| error.to_string())?;
    if snapshot.id.trim().is_empty() || snapshot.token.trim().is_empty() {
        return Err("share link is missing its id or token".to_string());
    }
    Ok(ShareLink {
        id: snapshot.id,
        notebook_id: notebook_id.to_string(),
        token: snapshot.token,
        permission: snapshot.permission,
        created_by: snapshot.created_by,
        created_at: snapshot.created_at,
        expires_at: snapshot.expires_at,
    })
}

/// SHA-256 over the publishable content of a notebook, in note order.
pub fn content_hash(notebook: &Notebook, notes: &[Note]) -> String {
    let mut ordered: Vec<&Note> = Vec::with_capacity(notes.len());
    for note_id in &notebook.note_order {
        if let Some(note) = notes.iter().find(|note| &note.id == note_id) {
            ordered.push(note);
        }
    }
    for note in notes {
        if !notebook.note_order.contains(&note.id) {
            ordered.push(note);
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(notebook.name.as_bytes());
    hasher.update([0u8]);
    hasher.update(notebook.description.as_deref().unwrap_or_default().as_bytes());
    for note in ordered {
        hasher.update([0u8]);
        hasher.update(note.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(note.title.as_bytes());
        hasher.update([0u8]);
        hasher.update(note.content.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn dedupe_order(order: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    order
        .iter()
        .filter(|note_id| seen.insert(note_id.as_str()))
        .cloned()
        .collect()
}
