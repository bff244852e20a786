//! Deletes addressed by event, user or group identifiers.
//!
//! Events are documents addressed by their id. Users and groups are matched
//! by the `user_id` and `group_id` fields of the document body.

use serde::Serialize;
use tracing::{error, info, warn, Span};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::{
    clock::Clock,
    document::SYSTEM_ACTOR,
    error::SoftDeleteError,
    soft_delete::{
        filter::{DocumentFilter, FieldFilter},
        SoftDeleteStore,
    },
    store::DocumentStore,
};

pub const USER_ID_FIELD: &str = "user_id";
pub const GROUP_ID_FIELD: &str = "group_id";

/// Criterion value that places no constraint.
pub const MAGIC_ALL: &str = "__all__";

const NO_CRITERIA: &str = "No deletion criteria provided";

#[derive(Clone, Debug, Default, PartialEq, TypedBuilder)]
pub struct DeleteCriteria {
    #[builder(default, setter(strip_option, into))]
    event_id: Option<String>,
    #[builder(default, setter(strip_option, into))]
    user_id: Option<String>,
    #[builder(default, setter(strip_option, into))]
    group_id: Option<String>,
    #[builder(default, setter(strip_option, into))]
    deleted_by: Option<String>,
}

impl DeleteCriteria {
    pub fn event_id(&self) -> Option<&str> {
        criterion(self.event_id.as_deref())
    }

    pub fn user_id(&self) -> Option<&str> {
        criterion(self.user_id.as_deref())
    }

    pub fn group_id(&self) -> Option<&str> {
        criterion(self.group_id.as_deref())
    }

    pub fn deleted_by(&self) -> Option<&str> {
        self.deleted_by.as_deref()
    }
}

fn criterion(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty() && *v != MAGIC_ALL)
}

/// Result of a combined criteria delete.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DeletionOutcome {
    /// Names of the criteria that made up the filter.
    pub filters: Vec<String>,
    pub count: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeletionOutcome {
    fn failure(message: String) -> Self {
        Self {
            error: Some(message),
            ..Default::default()
        }
    }
}

pub struct DeleteService<S, C> {
    documents: SoftDeleteStore<S, C>,
    span: Span,
}

impl<S, C> DeleteService<S, C>
where
    S: DocumentStore,
    C: Clock,
{
    pub fn new(documents: SoftDeleteStore<S, C>, span: Span) -> Self {
        Self { documents, span }
    }

    pub fn documents(&self) -> &SoftDeleteStore<S, C> {
        &self.documents
    }

    /// Soft-deletes one event.
    ///
    /// Returns `false` when no active event with that id exists.
    pub async fn delete_by_event_id(
        &self,
        event_id: &str,
        deleted_by: Option<&str>,
    ) -> Result<bool, SoftDeleteError> {
        let actor = deleted_by.unwrap_or(SYSTEM_ACTOR);
        info!(parent: &self.span, event_id, deleted_by = actor, "Deleting event");
        let id = parse_event_id(event_id).inspect_err(|e| {
            error!(parent: &self.span, "{}", e);
        })?;

        let Some(mut document) = self
            .documents
            .find_one(Some(DocumentFilter::by_id(id)), false, None)
            .await?
        else {
            warn!(parent: &self.span, event_id, "Event not found or already deleted");
            return Ok(false);
        };

        let transition = self.documents.delete(&mut document, actor, None).await?;
        Ok(transition.is_applied())
    }

    /// Soft-deletes all active documents of a user. Returns how many.
    pub async fn delete_by_user_id(
        &self,
        user_id: &str,
        deleted_by: Option<&str>,
    ) -> Result<u64, SoftDeleteError> {
        self.delete_by_field(USER_ID_FIELD, user_id, deleted_by)
            .await
    }

    /// Soft-deletes all active documents of a group. Returns how many.
    pub async fn delete_by_group_id(
        &self,
        group_id: &str,
        deleted_by: Option<&str>,
    ) -> Result<u64, SoftDeleteError> {
        self.delete_by_field(GROUP_ID_FIELD, group_id, deleted_by)
            .await
    }

    async fn delete_by_field(
        &self,
        field_name: &str,
        value: &str,
        deleted_by: Option<&str>,
    ) -> Result<u64, SoftDeleteError> {
        let actor = deleted_by.unwrap_or(SYSTEM_ACTOR);
        let outcome = self
            .documents
            .delete_many(DocumentFilter::new().field_eq(field_name, value), actor, None)
            .await?;
        info!(
            parent: &self.span,
            field_name,
            value,
            deleted_by = actor,
            count = outcome.modified_count,
            "Deleted documents"
        );
        Ok(outcome.modified_count)
    }

    /// Soft-deletes the active documents matching all given criteria.
    ///
    /// Malformed or missing criteria are reported in the outcome and issue
    /// no statement. Store failures are returned as errors.
    pub async fn delete_by_combined_criteria(
        &self,
        criteria: &DeleteCriteria,
    ) -> Result<DeletionOutcome, SoftDeleteError> {
        let mut filter = DocumentFilter::new();
        let mut filters = Vec::new();

        if let Some(event_id) = criteria.event_id() {
            match parse_event_id(event_id) {
                Ok(id) => {
                    filter = filter.with(FieldFilter::Id(id));
                    filters.push("event_id".to_string());
                }
                Err(e) => {
                    error!(parent: &self.span, "{}", e);
                    return Ok(DeletionOutcome::failure(e.to_string()));
                }
            }
        }
        if let Some(user_id) = criteria.user_id() {
            filter = filter.field_eq(USER_ID_FIELD, user_id);
            filters.push(USER_ID_FIELD.to_string());
        }
        if let Some(group_id) = criteria.group_id() {
            filter = filter.field_eq(GROUP_ID_FIELD, group_id);
            filters.push(GROUP_ID_FIELD.to_string());
        }

        if filter.is_empty() {
            warn!(parent: &self.span, "{}", NO_CRITERIA);
            return Ok(DeletionOutcome::failure(NO_CRITERIA.to_string()));
        }

        let actor = criteria.deleted_by().unwrap_or(SYSTEM_ACTOR);
        info!(parent: &self.span, ?filters, deleted_by = actor, "Deleting by combined criteria");
        let outcome = self.documents.delete_many(filter, actor, None).await?;
        let count = outcome.modified_count;
        info!(parent: &self.span, ?filters, count, "Deleted by combined criteria");

        Ok(DeletionOutcome {
            filters,
            count,
            success: count > 0,
            error: None,
        })
    }
}

fn parse_event_id(event_id: &str) -> Result<Uuid, SoftDeleteError> {
    Uuid::parse_str(event_id).map_err(|_| SoftDeleteError::InvalidIdentifier(event_id.to_string()))
}
