//! Access to persisted documents.
//!
//! Every method issues exactly one statement. Sessions are opaque: a store
//! runs the statement inside the given session and never begins, commits or
//! rolls one back.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    document::{DeletionMarker, Document},
    error::StoreError,
    soft_delete::{filter::DocumentFilter, identity::BulkDeletionIdentity},
    types::Pagination,
};

pub use memory::{MemoryDocumentStore, MemorySession};
pub use postgres::PostgresDocumentStore;

/// Counts of a statement that sets fields on all matching documents.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Count of a physical delete.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct DeleteOutcome {
    pub deleted_count: u64,
}

/// Field values written to every document matched by a bulk update.
#[derive(Clone, Debug, PartialEq)]
pub enum DeletionChange {
    Delete {
        at: DateTime<FixedOffset>,
        by: String,
        identity: BulkDeletionIdentity,
    },
    Restore,
}

impl DeletionChange {
    /// The marker a document with the given id receives.
    pub fn marker_for(&self, id: &Uuid) -> DeletionMarker {
        match self {
            DeletionChange::Delete { at, by, identity } => {
                DeletionMarker::deleted(*at, by.clone(), identity.resolve(id))
            }
            DeletionChange::Restore => DeletionMarker::Active,
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Externally managed transaction handle.
    type Session: Send + Sync;

    async fn insert(
        &self,
        document: &Document,
        session: Option<&Self::Session>,
    ) -> Result<(), StoreError>;

    async fn find_one(
        &self,
        filter: &DocumentFilter,
        session: Option<&Self::Session>,
    ) -> Result<Option<Document>, StoreError>;

    /// Matching documents ordered by id.
    async fn find_many(
        &self,
        filter: &DocumentFilter,
        pagination: &Pagination,
        session: Option<&Self::Session>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Writes the deletion triple of one document.
    async fn update_one(
        &self,
        id: &Uuid,
        marker: &DeletionMarker,
        session: Option<&Self::Session>,
    ) -> Result<UpdateOutcome, StoreError>;

    async fn update_many(
        &self,
        filter: &DocumentFilter,
        change: &DeletionChange,
        session: Option<&Self::Session>,
    ) -> Result<UpdateOutcome, StoreError>;

    async fn delete_one(
        &self,
        id: &Uuid,
        session: Option<&Self::Session>,
    ) -> Result<DeleteOutcome, StoreError>;

    async fn delete_many(
        &self,
        filter: &DocumentFilter,
        session: Option<&Self::Session>,
    ) -> Result<DeleteOutcome, StoreError>;
}
