//! Predicates over documents and the soft-delete filter policy.
//!
//! A [`DocumentFilter`] keeps the caller's conditions apart from the
//! constraint on `deleted_at`, so the policy can tell whether a caller has
//! already said something about deletion state.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use uuid::Uuid;

use crate::document::Document;

#[derive(Clone, Debug, PartialEq)]
pub enum FieldFilter {
    Id(Uuid),
    BusinessKey(String),
    /// Text value of a document field equals `value`.
    ExactFieldMatch { field_name: String, value: String },
    /// Text value of a document field is one of `values`.
    FieldValueInMatch {
        field_name: String,
        values: Vec<String>,
    },
}

impl FieldFilter {
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            FieldFilter::Id(id) => document.id() == id,
            FieldFilter::BusinessKey(key) => document.business_key() == Some(key.as_str()),
            FieldFilter::ExactFieldMatch { field_name, value } => {
                field_text(document.fields(), field_name).as_deref() == Some(value.as_str())
            }
            FieldFilter::FieldValueInMatch { field_name, values } => {
                field_text(document.fields(), field_name)
                    .map(|text| values.contains(&text))
                    .unwrap_or(false)
            }
        }
    }
}

/// The text form of a top level field, as Postgres' `->>` operator returns it.
pub(crate) fn field_text(fields: &Value, field_name: &str) -> Option<String> {
    match fields.get(field_name)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeletedAtFilter {
    /// Only documents that are not deleted.
    IsNull,
    /// Only deleted documents.
    IsNotNull,
    /// Documents deleted strictly before the instant.
    Before(DateTime<FixedOffset>),
    /// Documents deleted at or after the instant.
    Since(DateTime<FixedOffset>),
}

impl DeletedAtFilter {
    pub fn matches(&self, deleted_at: Option<&DateTime<FixedOffset>>) -> bool {
        match (self, deleted_at) {
            (DeletedAtFilter::IsNull, d) => d.is_none(),
            (DeletedAtFilter::IsNotNull, d) => d.is_some(),
            (DeletedAtFilter::Before(t), Some(d)) => d < t,
            (DeletedAtFilter::Since(t), Some(d)) => d >= t,
            (_, None) => false,
        }
    }
}

/// Conditions joined with AND plus an optional `deleted_at` constraint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentFilter {
    conditions: Vec<FieldFilter>,
    deleted_at: Option<DeletedAtFilter>,
}

impl DocumentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: Uuid) -> Self {
        Self::new().with(FieldFilter::Id(id))
    }

    pub fn with(mut self, condition: FieldFilter) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn field_eq(self, field_name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(FieldFilter::ExactFieldMatch {
            field_name: field_name.into(),
            value: value.into(),
        })
    }

    pub fn with_deleted_at(mut self, deleted_at: DeletedAtFilter) -> Self {
        self.deleted_at = Some(deleted_at);
        self
    }

    pub fn conditions(&self) -> &[FieldFilter] {
        &self.conditions
    }

    pub fn deleted_at(&self) -> Option<&DeletedAtFilter> {
        self.deleted_at.as_ref()
    }

    pub fn constrains_deleted_at(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.deleted_at.is_none()
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(document))
            && self
                .deleted_at
                .map(|d| d.matches(document.deleted_at()))
                .unwrap_or(true)
    }

    /// Adds `deleted_at` unless the filter already constrains it.
    fn merge_deleted_at(mut self, deleted_at: DeletedAtFilter) -> Self {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(deleted_at);
        }
        self
    }
}

/// The effective filter of a read or write.
///
/// With `include_deleted` the caller's filter is returned as is. Otherwise
/// deleted documents are excluded, unless the caller already constrains
/// `deleted_at`; that constraint is never overridden.
pub fn apply_soft_delete_filter(
    filter: Option<DocumentFilter>,
    include_deleted: bool,
) -> DocumentFilter {
    let filter = filter.unwrap_or_default();
    if include_deleted {
        return filter;
    }
    filter.merge_deleted_at(DeletedAtFilter::IsNull)
}

/// The bare deletion predicate: empty with `include_deleted`, else
/// "`deleted_at` is unset".
pub fn get_soft_delete_filter(include_deleted: bool) -> DocumentFilter {
    if include_deleted {
        DocumentFilter::new()
    } else {
        DocumentFilter::new().with_deleted_at(DeletedAtFilter::IsNull)
    }
}

/// Narrows a restore to documents that are deleted right now.
pub(crate) fn restorable_filter(filter: DocumentFilter) -> DocumentFilter {
    apply_soft_delete_filter(Some(filter), true).merge_deleted_at(DeletedAtFilter::IsNotNull)
}
