//! A [`DocumentStore`] kept in process memory.
//!
//! Statements are applied under one lock, so each is atomic like a single SQL
//! statement. The unique index over `(business_key, deleted_id)` of the
//! Postgres schema is enforced as well.

use std::{
    collections::{BTreeMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use sea_orm::{DbErr, RuntimeErr};
use uuid::Uuid;

use super::{DeleteOutcome, DeletionChange, DocumentStore, UpdateOutcome};
use crate::{
    document::{DeletionMarker, Document},
    error::StoreError,
    soft_delete::filter::DocumentFilter,
    types::Pagination,
};

/// Session token of the memory store. Statements record the token they ran
/// under, see [`MemoryDocumentStore::sessions`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MemorySession(pub u32);

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<BTreeMap<Uuid, Document>>,
    statements: AtomicUsize,
    sessions: Mutex<Vec<Option<MemorySession>>>,
    fail_next: Mutex<Option<String>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of statements issued so far, failed ones included.
    pub fn statement_count(&self) -> usize {
        self.statements.load(Ordering::SeqCst)
    }

    /// The session of every statement issued so far, in order.
    pub fn sessions(&self) -> Vec<Option<MemorySession>> {
        self.sessions.lock().clone()
    }

    /// Makes the next statement fail with a connection error.
    pub fn fail_next_statement(&self, message: &str) {
        *self.fail_next.lock() = Some(message.to_string());
    }

    /// The stored version of a document, whatever its deletion state.
    pub fn get(&self, id: &Uuid) -> Option<Document> {
        self.documents.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }

    fn begin_statement(&self, session: Option<&MemorySession>) -> Result<(), StoreError> {
        self.statements.fetch_add(1, Ordering::SeqCst);
        self.sessions.lock().push(session.copied());
        match self.fail_next.lock().take() {
            Some(message) => Err(DbErr::Conn(RuntimeErr::Internal(message)).into()),
            None => Ok(()),
        }
    }
}

fn check_unique_business_keys(documents: &BTreeMap<Uuid, Document>) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    for document in documents.values() {
        if let Some(key) = document.business_key() {
            if !seen.insert((key, document.deleted_id())) {
                return Err(DbErr::Exec(RuntimeErr::Internal(format!(
                    "duplicate key value violates unique constraint (business_key, deleted_id)=({key}, {})",
                    document.deleted_id()
                )))
                .into());
            }
        }
    }
    Ok(())
}

/// Applies `change` to a copy of the documents and swaps it in only if the
/// unique index still holds.
fn apply_all<F>(
    documents: &mut BTreeMap<Uuid, Document>,
    filter: &DocumentFilter,
    marker_for: F,
) -> Result<UpdateOutcome, StoreError>
where
    F: Fn(&Uuid) -> DeletionMarker,
{
    let mut next = documents.clone();
    let mut outcome = UpdateOutcome::default();
    for document in next.values_mut().filter(|d| filter.matches(d)) {
        outcome.matched_count += 1;
        let marker = marker_for(document.id());
        if document.deletion() != &marker {
            document.set_deletion(marker);
            outcome.modified_count += 1;
        }
    }
    check_unique_business_keys(&next)?;
    *documents = next;
    Ok(outcome)
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    type Session = MemorySession;

    async fn insert(
        &self,
        document: &Document,
        session: Option<&MemorySession>,
    ) -> Result<(), StoreError> {
        self.begin_statement(session)?;
        let mut documents = self.documents.lock();
        if documents.contains_key(document.id()) {
            return Err(DbErr::Exec(RuntimeErr::Internal(format!(
                "duplicate key value violates unique constraint (id)=({})",
                document.id()
            )))
            .into());
        }
        let mut next = documents.clone();
        next.insert(*document.id(), document.clone());
        check_unique_business_keys(&next)?;
        *documents = next;
        Ok(())
    }

    async fn find_one(
        &self,
        filter: &DocumentFilter,
        session: Option<&MemorySession>,
    ) -> Result<Option<Document>, StoreError> {
        self.begin_statement(session)?;
        Ok(self
            .documents
            .lock()
            .values()
            .find(|d| filter.matches(d))
            .cloned())
    }

    async fn find_many(
        &self,
        filter: &DocumentFilter,
        pagination: &Pagination,
        session: Option<&MemorySession>,
    ) -> Result<Vec<Document>, StoreError> {
        self.begin_statement(session)?;
        Ok(self
            .documents
            .lock()
            .values()
            .filter(|d| filter.matches(d))
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .cloned()
            .collect())
    }

    async fn update_one(
        &self,
        id: &Uuid,
        marker: &DeletionMarker,
        session: Option<&MemorySession>,
    ) -> Result<UpdateOutcome, StoreError> {
        self.begin_statement(session)?;
        apply_all(
            &mut self.documents.lock(),
            &DocumentFilter::by_id(*id),
            |_| marker.clone(),
        )
    }

    async fn update_many(
        &self,
        filter: &DocumentFilter,
        change: &DeletionChange,
        session: Option<&MemorySession>,
    ) -> Result<UpdateOutcome, StoreError> {
        self.begin_statement(session)?;
        apply_all(&mut self.documents.lock(), filter, |id| change.marker_for(id))
    }

    async fn delete_one(
        &self,
        id: &Uuid,
        session: Option<&MemorySession>,
    ) -> Result<DeleteOutcome, StoreError> {
        self.begin_statement(session)?;
        let removed = self.documents.lock().remove(id);
        Ok(DeleteOutcome {
            deleted_count: u64::from(removed.is_some()),
        })
    }

    async fn delete_many(
        &self,
        filter: &DocumentFilter,
        session: Option<&MemorySession>,
    ) -> Result<DeleteOutcome, StoreError> {
        self.begin_statement(session)?;
        let mut documents = self.documents.lock();
        let before = documents.len();
        documents.retain(|_, d| !filter.matches(d));
        Ok(DeleteOutcome {
            deleted_count: (before - documents.len()) as u64,
        })
    }
}
