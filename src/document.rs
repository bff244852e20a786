use chrono::{DateTime, FixedOffset};
use uuid::Uuid;

use crate::{
    error::StoreError,
    soft_delete::identity::{DeletedId, ACTIVE_DELETED_ID},
};

/// Who deletes when nobody is named.
pub const SYSTEM_ACTOR: &str = "system";

/// The soft-delete triple `(deleted_at, deleted_by, deleted_id)`.
///
/// The three fields only exist together: an active document has none of them
/// and `deleted_id == 0`, a deleted one has all of them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeletionMarker {
    Active,
    Deleted {
        at: DateTime<FixedOffset>,
        by: String,
        id: DeletedId,
    },
}

impl DeletionMarker {
    pub fn deleted(at: DateTime<FixedOffset>, by: impl Into<String>, id: DeletedId) -> Self {
        DeletionMarker::Deleted {
            at,
            by: by.into(),
            id,
        }
    }

    /// Rebuilds the marker from persisted columns, refusing mixed states.
    pub fn from_columns(
        document_id: Uuid,
        deleted_at: Option<DateTime<FixedOffset>>,
        deleted_by: Option<String>,
        deleted_id: i64,
    ) -> Result<Self, StoreError> {
        match (deleted_at, deleted_by, DeletedId::from_persisted(deleted_id)) {
            (None, None, None) if deleted_id == ACTIVE_DELETED_ID => Ok(DeletionMarker::Active),
            (Some(at), Some(by), Some(id)) => Ok(DeletionMarker::Deleted { at, by, id }),
            _ => Err(StoreError::InconsistentDeletionState(document_id)),
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, DeletionMarker::Deleted { .. })
    }

    pub fn deleted_at(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            DeletionMarker::Active => None,
            DeletionMarker::Deleted { at, .. } => Some(at),
        }
    }

    pub fn deleted_by(&self) -> Option<&str> {
        match self {
            DeletionMarker::Active => None,
            DeletionMarker::Deleted { by, .. } => Some(by.as_str()),
        }
    }

    pub fn deleted_id(&self) -> i64 {
        match self {
            DeletionMarker::Active => ACTIVE_DELETED_ID,
            DeletionMarker::Deleted { id, .. } => id.get(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleState {
    Active,
    Deleted,
}

/// A stored document together with its soft-delete state.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    id: Uuid,
    business_key: Option<String>,
    fields: serde_json::Value,
    deletion: DeletionMarker,
}

impl Document {
    /// A new, active document.
    pub fn new(id: Uuid, business_key: Option<String>, fields: serde_json::Value) -> Self {
        Self {
            id,
            business_key,
            fields,
            deletion: DeletionMarker::Active,
        }
    }

    pub fn from_parts(
        id: Uuid,
        business_key: Option<String>,
        fields: serde_json::Value,
        deletion: DeletionMarker,
    ) -> Self {
        Self {
            id,
            business_key,
            fields,
            deletion,
        }
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }

    pub fn business_key(&self) -> Option<&str> {
        self.business_key.as_deref()
    }

    pub fn fields(&self) -> &serde_json::Value {
        &self.fields
    }

    pub fn deletion(&self) -> &DeletionMarker {
        &self.deletion
    }

    pub fn is_deleted(&self) -> bool {
        self.deletion.is_deleted()
    }

    pub fn state(&self) -> LifecycleState {
        if self.is_deleted() {
            LifecycleState::Deleted
        } else {
            LifecycleState::Active
        }
    }

    pub fn deleted_at(&self) -> Option<&DateTime<FixedOffset>> {
        self.deletion.deleted_at()
    }

    pub fn deleted_by(&self) -> Option<&str> {
        self.deletion.deleted_by()
    }

    pub fn deleted_id(&self) -> i64 {
        self.deletion.deleted_id()
    }

    pub(crate) fn set_deletion(&mut self, deletion: DeletionMarker) {
        self.deletion = deletion;
    }
}

impl TryFrom<entity::collection_document::Model> for Document {
    type Error = StoreError;

    fn try_from(model: entity::collection_document::Model) -> Result<Self, Self::Error> {
        let deletion =
            DeletionMarker::from_columns(model.id, model.deleted_at, model.deleted_by, model.deleted_id)?;
        Ok(Self {
            id: model.id,
            business_key: model.business_key,
            fields: model.f,
            deletion,
        })
    }
}
