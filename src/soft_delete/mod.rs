//! Soft-delete capability layered over a [`DocumentStore`].
//!
//! [`SoftDeleteStore`] wraps a plain store. Reads hide deleted documents
//! unless asked otherwise, deletes only mark documents, and purges are the
//! one way to remove them physically.

pub mod bulk;
pub mod filter;
pub mod identity;
pub mod lifecycle;

use tracing::{debug, error, Span};
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::Clock,
    document::Document,
    error::{SoftDeleteError, StoreError},
    store::DocumentStore,
    types::Pagination,
};

use self::filter::{apply_soft_delete_filter, DocumentFilter};

pub struct SoftDeleteStore<S, C> {
    store: S,
    clock: C,
    span: Span,
}

impl<S, C> SoftDeleteStore<S, C>
where
    S: DocumentStore,
    C: Clock,
{
    /// Events of this store are recorded under `span`.
    pub fn new(store: S, clock: C, span: Span) -> Self {
        Self { store, clock, span }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Stores a new, active document.
    pub async fn insert(
        &self,
        business_key: Option<String>,
        fields: serde_json::Value,
        session: Option<&S::Session>,
    ) -> Result<Document, SoftDeleteError> {
        let document = Document::new(Uuid::new_v4(), business_key, fields);
        self.store
            .insert(&document, session)
            .await
            .map_err(|e| self.store_failure("insert", e))?;
        debug!(parent: &self.span, "Inserted document {}", document.id());
        Ok(document)
    }

    pub async fn find_one(
        &self,
        filter: Option<DocumentFilter>,
        include_deleted: bool,
        session: Option<&S::Session>,
    ) -> Result<Option<Document>, SoftDeleteError> {
        let filter = apply_soft_delete_filter(filter, include_deleted);
        debug!(parent: &self.span, "find_one {:?}", filter);
        self.store
            .find_one(&filter, session)
            .await
            .map_err(|e| self.store_failure("find_one", e))
    }

    pub async fn find_many(
        &self,
        filter: Option<DocumentFilter>,
        include_deleted: bool,
        pagination: &Pagination,
        session: Option<&S::Session>,
    ) -> Result<Vec<Document>, SoftDeleteError> {
        pagination.validate()?;
        let filter = apply_soft_delete_filter(filter, include_deleted);
        debug!(parent: &self.span, "find_many {:?} {:?}", filter, pagination);
        self.store
            .find_many(&filter, pagination, session)
            .await
            .map_err(|e| self.store_failure("find_many", e))
    }

    /// Like [`Self::find_one`], deleted documents included.
    pub async fn hard_find_one(
        &self,
        filter: Option<DocumentFilter>,
        session: Option<&S::Session>,
    ) -> Result<Option<Document>, SoftDeleteError> {
        self.find_one(filter, true, session).await
    }

    /// Like [`Self::find_many`], deleted documents included.
    pub async fn hard_find_many(
        &self,
        filter: Option<DocumentFilter>,
        pagination: &Pagination,
        session: Option<&S::Session>,
    ) -> Result<Vec<Document>, SoftDeleteError> {
        self.find_many(filter, true, pagination, session).await
    }

    fn store_failure(&self, operation: &str, e: StoreError) -> SoftDeleteError {
        error!(
            parent: &self.span,
            code = ?e.code(),
            "{} failed: {}",
            operation,
            e
        );
        e.into()
    }
}
