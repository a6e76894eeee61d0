use crate::snapshot::{NotebookSnapshot, PublicationSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notebook {
    pub id: String,
    pub owner_id: String,
    pub workspace_id: Option<String>,
    pub name: String,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub is_public: bool,
    pub public_slug: Option<String>,
    pub public_metadata: Option<Value>,
    pub published_at: Option<DateTime<Utc>>,
    pub note_order: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notebook {
    pub fn publication_state(&self) -> PublicationState {
        PublicationState {
            is_public: self.is_public,
            slug: self.public_slug.clone(),
            metadata: self.public_metadata.clone(),
            published_at: self.published_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub notebook_id: Option<String>,
    pub owner_id: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MembershipRole {
    Owner,
    Editor,
    Viewer,
}

impl MembershipRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MembershipStatus {
    Active,
    Invited,
    Revoked,
}

impl MembershipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Invited => "invited",
            Self::Revoked => "revoked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: String,
    pub notebook_id: String,
    pub user_id: String,
    pub role: MembershipRole,
    pub status: MembershipStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SharePermission {
    View,
    Edit,
}

impl SharePermission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    pub id: String,
    pub notebook_id: String,
    pub token: String,
    pub permission: SharePermission,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub notebook_id: String,
    pub slug: String,
    pub owner_id: String,
    pub title: String,
    pub snapshot_hash: String,
    pub metadata: Value,
    pub published_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollabDocument {
    pub notebook_id: String,
    pub state: Vec<u8>,
    pub updated_at: DateTime<Utc>,
}

/// Allow-listed scalar notebook fields. `None` means "not part of this set";
/// `Some(None)` on a nullable field means "explicitly cleared".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookFieldSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable_field", skip_serializing_if = "Option::is_none")]
    pub color: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable_field", skip_serializing_if = "Option::is_none")]
    pub icon: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable_field", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
}

impl NotebookFieldSet {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.color.is_none() && self.icon.is_none() && self.description.is_none()
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.name.is_some() {
            names.push("name");
        }
        if self.color.is_some() {
            names.push("color");
        }
        if self.icon.is_some() {
            names.push("icon");
        }
        if self.description.is_some() {
            names.push("description");
        }
        names
    }

    /// Current values of `notebook` for exactly the fields present in `self`.
    pub fn previous_values(&self, notebook: &Notebook) -> Self {
        Self {
            name: self.name.as_ref().map(|_| notebook.name.clone()),
            color: self.color.as_ref().map(|_| notebook.color.clone()),
            icon: self.icon.as_ref().map(|_| notebook.icon.clone()),
            description: self.description.as_ref().map(|_| notebook.description.clone()),
        }
    }
}

fn nullable_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationState {
    pub is_public: bool,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotebookEventType {
    #[serde(rename = "notebook.create")]
    Create,
    #[serde(rename = "notebook.update")]
    Update,
    #[serde(rename = "notebook.delete")]
    Delete,
    #[serde(rename = "notebook.move-notes")]
    MoveNotes,
    #[serde(rename = "notebook.publish")]
    Publish,
    #[serde(rename = "notebook.unpublish")]
    Unpublish,
    #[serde(rename = "notebook.sync")]
    Sync,
    #[serde(rename = "notebook.undo")]
    Undo,
}

impl NotebookEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "notebook.create",
            Self::Update => "notebook.update",
            Self::Delete => "notebook.delete",
            Self::MoveNotes => "notebook.move-notes",
            Self::Publish => "notebook.publish",
            Self::Unpublish => "notebook.unpublish",
            Self::Sync => "notebook.sync",
            Self::Undo => "notebook.undo",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "notebook.create" => Some(Self::Create),
            "notebook.update" => Some(Self::Update),
            "notebook.delete" => Some(Self::Delete),
            "notebook.move-notes" => Some(Self::MoveNotes),
            "notebook.publish" => Some(Self::Publish),
            "notebook.unpublish" => Some(Self::Unpublish),
            "notebook.sync" => Some(Self::Sync),
            "notebook.undo" => Some(Self::Undo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeleteMode {
    /// Notes are hard-deleted with the notebook.
    #[default]
    Delete,
    /// Notes survive, unassigned.
    Detach,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum CommandPayload {
    Create {
        name: String,
        workspace_id: Option<String>,
    },
    Update {
        changes: NotebookFieldSet,
    },
    Delete {
        name: String,
        mode: DeleteMode,
        note_count: usize,
    },
    MoveNotes {
        target_notebook_id: String,
        note_ids: Vec<String>,
    },
    Publish {
        slug: String,
        snapshot_hash: String,
    },
    Unpublish {
        slug: Option<String>,
    },
    Sync {
        device_id: String,
        status: String,
        #[serde(default)]
        error: Option<String>,
    },
    Undo {
        undone_event_id: String,
        action: UndoActionKind,
        affected_notebook_ids: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Command(CommandPayload),
    /// Rows written before payloads were typed.
    Legacy(Value),
}

impl EventPayload {
    pub fn truncate_error_text(&mut self, max_chars: usize) {
        match self {
            Self::Command(CommandPayload::Sync { error: Some(error), .. }) => {
                *error = crate::recorder::truncate_text(error, max_chars);
            }
            Self::Legacy(Value::Object(map)) => {
                if let Some(Value::String(error)) = map.get_mut("error") {
                    *error = crate::recorder::truncate_text(error, max_chars);
                }
            }
            _ => {}
        }
    }
}

impl From<CommandPayload> for EventPayload {
    fn from(value: CommandPayload) -> Self {
        Self::Command(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UndoActionKind {
    RestoreNotebookFields,
    RestoreNoteNotebook,
    DeleteNotebook,
    RestoreNotebook,
    RestoreNotebookPublication,
    Noop,
}

impl UndoActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RestoreNotebookFields => "restoreNotebookFields",
            Self::RestoreNoteNotebook => "restoreNoteNotebook",
            Self::DeleteNotebook => "deleteNotebook",
            Self::RestoreNotebook => "restoreNotebook",
            Self::RestoreNotebookPublication => "restoreNotebookPublication",
            Self::Noop => "noop",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "restoreNotebookFields" => Some(Self::RestoreNotebookFields),
            "restoreNoteNotebook" => Some(Self::RestoreNoteNotebook),
            "deleteNotebook" => Some(Self::DeleteNotebook),
            "restoreNotebook" => Some(Self::RestoreNotebook),
            "restoreNotebookPublication" => Some(Self::RestoreNotebookPublication),
            "noop" => Some(Self::Noop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePlacement {
    pub note_id: String,
    pub notebook_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum UndoAction {
    RestoreNotebookFields {
        previous: NotebookFieldSet,
    },
    RestoreNoteNotebook {
        notes: Vec<NotePlacement>,
    },
    DeleteNotebook {
        notebook_id: String,
    },
    RestoreNotebook {
        snapshot: Box<NotebookSnapshot>,
    },
    RestoreNotebookPublication {
        previous: PublicationState,
        #[serde(default)]
        publication: Option<PublicationSnapshot>,
    },
    Noop,
}

impl UndoAction {
    pub fn kind(&self) -> UndoActionKind {
        match self {
            Self::RestoreNotebookFields { .. } => UndoActionKind::RestoreNotebookFields,
            Self::RestoreNoteNotebook { .. } => UndoActionKind::RestoreNoteNotebook,
            Self::DeleteNotebook { .. } => UndoActionKind::DeleteNotebook,
            Self::RestoreNotebook { .. } => UndoActionKind::RestoreNotebook,
            Self::RestoreNotebookPublication { .. } => UndoActionKind::RestoreNotebookPublication,
            Self::Noop => UndoActionKind::Noop,
        }
    }
}

/// Undo instruction as read from storage. Typed when the tag and body parse,
/// otherwise the raw value is kept so the dispatcher can classify the failure.
#[derive(Debug, Clone, PartialEq)]
pub enum InversePayload {
    Action(UndoAction),
    Malformed {
        action: UndoActionKind,
        reason: String,
        raw: Value,
    },
    Unrecognized(Value),
}

impl InversePayload {
    pub fn from_value(raw: Value) -> Self {
        match raw.get("action") {
            Some(Value::String(tag)) => match UndoActionKind::parse(tag) {
                Some(kind) => match serde_json::from_value::<UndoAction>(raw.clone()) {
                    Ok(action) => Self::Action(action),
                    Err(error) => Self::Malformed {
                        action: kind,
                        reason: error.to_string(),
                        raw,
                    },
                },
                None => Self::Unrecognized(raw),
            },
            Some(_) => Self::Unrecognized(raw),
            // Legacy rows: a bare `previous` field-set without a tag.
            None => match raw.get("previous") {
                Some(previous @ Value::Object(_)) => {
                    match serde_json::from_value::<NotebookFieldSet>(previous.clone()) {
                        Ok(previous) => Self::Action(UndoAction::RestoreNotebookFields { previous }),
                        Err(error) => Self::Malformed {
                            action: UndoActionKind::RestoreNotebookFields,
                            reason: error.to_string(),
                            raw,
                        },
                    }
                }
                _ => Self::Unrecognized(raw),
            },
        }
    }

    pub fn action_tag(&self) -> String {
        match self {
            Self::Action(action) => action.kind().as_str().to_string(),
            Self::Malformed { action, .. } => action.as_str().to_string(),
            Self::Unrecognized(raw) => raw
                .get("action")
                .and_then(Value::as_str)
                .unwrap_or("<missing>")
                .to_string(),
        }
    }
}

impl From<UndoAction> for InversePayload {
    fn from(value: UndoAction) -> Self {
        Self::Action(value)
    }
}

impl Serialize for InversePayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Action(action) => action.serialize(serializer),
            Self::Malformed { raw, .. } | Self::Unrecognized(raw) => raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for InversePayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotebookEvent {
    pub notebook_id: String,
    pub owner_id: String,
    pub workspace_id: Option<String>,
    pub actor_id: String,
    pub event_type: NotebookEventType,
    pub command_name: String,
    pub summary: String,
    pub version: i64,
    pub payload: EventPayload,
    pub inverse_payload: InversePayload,
    pub prev_event_id: Option<String>,
    pub parent_event_id: Option<String>,
    pub note_id: Option<String>,
    pub metadata: Map<String, Value>,
}

impl NewNotebookEvent {
    pub fn for_notebook(
        notebook: &Notebook,
        actor_id: &str,
        event_type: NotebookEventType,
        payload: CommandPayload,
        inverse: UndoAction,
    ) -> Self {
        Self {
            notebook_id: notebook.id.clone(),
            owner_id: notebook.owner_id.clone(),
            workspace_id: notebook.workspace_id.clone(),
            actor_id: actor_id.to_string(),
            event_type,
            command_name: String::new(),
            summary: String::new(),
            version: 1,
            payload: payload.into(),
            inverse_payload: inverse.into(),
            prev_event_id: None,
            parent_event_id: None,
            note_id: None,
            metadata: Map::new(),
        }
    }

    pub fn command(mut self, command_name: &str) -> Self {
        self.command_name = command_name.to_string();
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookEvent {
    pub id: String,
    pub notebook_id: String,
    pub owner_id: String,
    pub workspace_id: Option<String>,
    pub actor_id: String,
    pub seq: i64,
    pub event_type: NotebookEventType,
    pub command_name: String,
    pub summary: String,
    pub version: i64,
    pub payload: EventPayload,
    pub inverse_payload: InversePayload,
    pub prev_event_id: Option<String>,
    pub parent_event_id: Option<String>,
    pub note_id: Option<String>,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl NotebookEvent {
    pub fn undone_at(&self) -> Option<&str> {
        self.metadata.get("undoneAt").and_then(Value::as_str)
    }

    pub fn is_undone(&self) -> bool {
        self.metadata
            .get("undoneAt")
            .map(|value| !value.is_null())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoRequest {
    pub notebook_id: String,
    pub event_id: String,
    pub owner_id: String,
    pub actor_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoOutcome {
    pub action: UndoActionKind,
    pub affected_notebook_ids: Vec<String>,
    pub undo_event: NotebookEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBreak {
    pub event_id: String,
    pub seq: i64,
    pub expected_prev_event_id: Option<String>,
    pub actual_prev_event_id: Option<String>,
    pub expected_seq: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    pub notebook_id: String,
    pub event_count: usize,
    pub head_event_id: Option<String>,
    pub breaks: Vec<ChainBreak>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.breaks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedCommand<T> {
    pub result: T,
    pub event: NotebookEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotebookRequest {
    pub owner_id: String,
    pub workspace_id: Option<String>,
    pub actor_id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotebookRequest {
    pub notebook_id: String,
    pub actor_id: String,
    pub changes: NotebookFieldSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteNotebookRequest {
    pub notebook_id: String,
    pub actor_id: String,
    #[serde(default)]
    pub mode: DeleteMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveNotesRequest {
    pub target_notebook_id: String,
    pub actor_id: String,
    pub note_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishNotebookRequest {
    pub notebook_id: String,
    pub actor_id: String,
    pub slug: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpublishNotebookRequest {
    pub notebook_id: String,
    pub actor_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSyncRequest {
    pub notebook_id: String,
    pub actor_id: String,
    pub device_id: String,
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteRequest {
    pub notebook_id: Option<String>,
    pub owner_id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub notebook_id: String,
    pub user_id: String,
    pub role: MembershipRole,
    #[serde(default)]
    pub status: Option<MembershipStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareLinkRequest {
    pub notebook_id: String,
    pub created_by: String,
    pub permission: SharePermission,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}
