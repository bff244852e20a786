//! Transitions over every document matching a filter.
//!
//! Each call is one statement. Deletes only reach documents that are active
//! when the statement runs and restores only reach deleted ones, so audit
//! fields of earlier deletions survive.

use tracing::{debug, info, warn};

use super::{
    filter::{apply_soft_delete_filter, restorable_filter, DeletedAtFilter, DocumentFilter},
    identity::BulkDeletionIdentity,
    SoftDeleteStore,
};
use crate::{
    clock::Clock,
    error::SoftDeleteError,
    store::{DeleteOutcome, DeletionChange, DocumentStore, UpdateOutcome},
};

impl<S, C> SoftDeleteStore<S, C>
where
    S: DocumentStore,
    C: Clock,
{
    /// Marks all active documents matching `filter` as deleted by `actor`.
    ///
    /// Every matched document gets its own `deleted_id`, seeded by the time
    /// of the call. A filter that only selects deleted documents matches
    /// nothing and issues no statement.
    pub async fn delete_many(
        &self,
        filter: DocumentFilter,
        actor: &str,
        session: Option<&S::Session>,
    ) -> Result<UpdateOutcome, SoftDeleteError> {
        let filter = apply_soft_delete_filter(Some(filter), false);
        if filter.deleted_at() != Some(&DeletedAtFilter::IsNull) {
            warn!(
                parent: &self.span,
                "Bulk delete skipped, filter selects deleted documents only: {:?}", filter
            );
            return Ok(UpdateOutcome::default());
        }

        let now = self.clock.now();
        let change = DeletionChange::Delete {
            at: now,
            by: actor.to_string(),
            identity: BulkDeletionIdentity::new(&now),
        };
        debug!(parent: &self.span, "delete_many {:?}", filter);
        let outcome = self
            .store
            .update_many(&filter, &change, session)
            .await
            .map_err(|e| self.store_failure("delete_many", e))?;

        info!(
            parent: &self.span,
            matched = outcome.matched_count,
            modified = outcome.modified_count,
            "Bulk delete by {}",
            actor
        );
        Ok(outcome)
    }

    /// Clears the deletion triple of all deleted documents matching `filter`.
    pub async fn restore_many(
        &self,
        filter: DocumentFilter,
        session: Option<&S::Session>,
    ) -> Result<UpdateOutcome, SoftDeleteError> {
        let filter = restorable_filter(filter);
        if filter.deleted_at() == Some(&DeletedAtFilter::IsNull) {
            warn!(
                parent: &self.span,
                "Bulk restore skipped, filter selects active documents only: {:?}", filter
            );
            return Ok(UpdateOutcome::default());
        }

        debug!(parent: &self.span, "restore_many {:?}", filter);
        let outcome = self
            .store
            .update_many(&filter, &DeletionChange::Restore, session)
            .await
            .map_err(|e| self.store_failure("restore_many", e))?;

        info!(
            parent: &self.span,
            matched = outcome.matched_count,
            modified = outcome.modified_count,
            "Bulk restore"
        );
        Ok(outcome)
    }

    /// Physically removes every document matching `filter`, deleted or not.
    /// The filter is used as given.
    pub async fn hard_delete_many(
        &self,
        filter: DocumentFilter,
        session: Option<&S::Session>,
    ) -> Result<DeleteOutcome, SoftDeleteError> {
        debug!(parent: &self.span, "hard_delete_many {:?}", filter);
        let outcome = self
            .store
            .delete_many(&filter, session)
            .await
            .map_err(|e| self.store_failure("hard_delete_many", e))?;

        info!(
            parent: &self.span,
            deleted = outcome.deleted_count,
            "Bulk purge"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::{
        clock::FixedClock,
        document::Document,
        error::StoreError,
        soft_delete::{
            filter::FieldFilter,
            identity::DeletedId,
            tests::{now, soft_store},
        },
        store::MemoryDocumentStore,
        types::Pagination,
    };

    type TestStore = SoftDeleteStore<MemoryDocumentStore, FixedClock>;

    async fn seed(s: &TestStore, status: &str, count: usize) -> Vec<Document> {
        let mut docs = Vec::new();
        for n in 0..count {
            docs.push(
                s.insert(None, json!({"status": status, "n": n}), None)
                    .await
                    .unwrap(),
            );
        }
        docs
    }

    #[tokio::test]
    async fn bulk_delete_leaves_earlier_deletions_alone() {
        // Arrange
        let s = soft_store();
        seed(&s, "inactive", 5).await;
        let mut earlier = seed(&s, "inactive", 2).await;
        for doc in earlier.iter_mut() {
            s.delete(doc, "first", None).await.unwrap();
        }
        seed(&s, "active", 3).await;
        let before = s.store().statement_count();

        // Act
        let outcome = s
            .delete_many(DocumentFilter::new().field_eq("status", "inactive"), "admin", None)
            .await
            .unwrap();

        // Assert
        assert_eq!(outcome.matched_count, 5);
        assert_eq!(outcome.modified_count, 5);
        assert_eq!(s.store().statement_count(), before + 1);
        for doc in &earlier {
            assert_eq!(s.store().get(doc.id()).as_ref(), Some(doc));
        }
        let active = s
            .find_many(None, false, &Pagination::default(), None)
            .await
            .unwrap();
        assert_eq!(active.len(), 3);
    }

    #[tokio::test]
    async fn bulk_deleted_documents_get_distinct_markers() {
        // Arrange
        let s = soft_store();
        let docs = seed(&s, "inactive", 4).await;

        // Act
        s.delete_many(DocumentFilter::new(), "admin", None)
            .await
            .unwrap();

        // Assert
        let bulk_seed = now().timestamp_micros();
        let markers: HashSet<i64> = docs
            .iter()
            .map(|d| {
                let stored = s.store().get(d.id()).unwrap();
                assert_eq!(stored.deleted_by(), Some("admin"));
                assert_eq!(stored.deleted_at(), Some(&now()));
                assert_eq!(
                    stored.deleted_id(),
                    DeletedId::for_bulk_member(bulk_seed, d.id()).get()
                );
                stored.deleted_id()
            })
            .collect();
        assert_eq!(markers.len(), 4);
        assert!(markers.iter().all(|m| *m > 0));
    }

    #[tokio::test]
    async fn repeated_bulk_deletes_of_one_business_key_succeed() {
        // Arrange
        let s = soft_store();
        let filter = DocumentFilter::new().with(FieldFilter::BusinessKey("k".to_string()));

        // Act
        for _ in 0..3 {
            s.insert(Some("k".to_string()), json!({}), None)
                .await
                .unwrap();
            let outcome = s.delete_many(filter.clone(), "admin", None).await.unwrap();
            assert_eq!(outcome.modified_count, 1);
        }

        // Assert
        let all = s
            .hard_find_many(Some(filter), &Pagination::default(), None)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|d| d.is_deleted()));
    }

    #[tokio::test]
    async fn bulk_delete_with_no_match_is_a_success() {
        let s = soft_store();
        seed(&s, "active", 2).await;

        let outcome = s
            .delete_many(DocumentFilter::new().field_eq("status", "gone"), "admin", None)
            .await
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::default());
    }

    #[tokio::test]
    async fn bulk_delete_of_deleted_documents_issues_no_statement() {
        // Arrange
        let s = soft_store();
        let mut doc = s.insert(None, json!({}), None).await.unwrap();
        s.delete(&mut doc, "first", None).await.unwrap();
        let before = s.store().statement_count();

        // Act
        let outcome = s
            .delete_many(
                DocumentFilter::new().with_deleted_at(DeletedAtFilter::IsNotNull),
                "other",
                None,
            )
            .await
            .unwrap();

        // Assert
        assert_eq!(outcome, UpdateOutcome::default());
        assert_eq!(s.store().statement_count(), before);
        assert_eq!(s.store().get(doc.id()), Some(doc));
    }

    #[tokio::test]
    async fn bulk_restore_only_touches_deleted_documents() {
        // Arrange
        let s = soft_store();
        let active = seed(&s, "inactive", 2).await;
        let mut deleted = seed(&s, "inactive", 3).await;
        for doc in deleted.iter_mut() {
            s.delete(doc, "admin", None).await.unwrap();
        }

        // Act
        let outcome = s
            .restore_many(DocumentFilter::new().field_eq("status", "inactive"), None)
            .await
            .unwrap();

        // Assert
        assert_eq!(outcome.matched_count, 3);
        assert_eq!(outcome.modified_count, 3);
        for doc in active.iter().chain(deleted.iter()) {
            let stored = s.store().get(doc.id()).unwrap();
            assert!(!stored.is_deleted());
            assert_eq!(stored.deleted_id(), 0);
        }
    }

    #[tokio::test]
    async fn bulk_restore_keeps_a_narrower_deleted_at_constraint() {
        // Arrange
        let s = soft_store();
        let mut old = s.insert(None, json!({}), None).await.unwrap();
        s.delete(&mut old, "admin", None).await.unwrap();
        let cutoff = now() + Duration::seconds(1);

        // Act
        let since_cutoff = s
            .restore_many(
                DocumentFilter::new().with_deleted_at(DeletedAtFilter::Since(cutoff)),
                None,
            )
            .await
            .unwrap();
        let active_only = s
            .restore_many(
                DocumentFilter::new().with_deleted_at(DeletedAtFilter::IsNull),
                None,
            )
            .await
            .unwrap();

        // Assert
        assert_eq!(since_cutoff.modified_count, 0);
        assert_eq!(active_only, UpdateOutcome::default());
        assert!(s.store().get(old.id()).unwrap().is_deleted());
    }

    #[tokio::test]
    async fn hard_delete_many_ignores_deletion_state() {
        // Arrange
        let s = soft_store();
        seed(&s, "inactive", 2).await;
        let mut deleted = seed(&s, "inactive", 2).await;
        for doc in deleted.iter_mut() {
            s.delete(doc, "admin", None).await.unwrap();
        }
        seed(&s, "active", 1).await;

        // Act
        let outcome = s
            .hard_delete_many(DocumentFilter::new().field_eq("status", "inactive"), None)
            .await
            .unwrap();

        // Assert
        assert_eq!(outcome.deleted_count, 4);
        assert_eq!(s.store().len(), 1);
    }

    #[tokio::test]
    async fn store_failure_aborts_the_bulk_call() {
        // Arrange
        let s = soft_store();
        let docs = seed(&s, "inactive", 3).await;
        s.store().fail_next_statement("connection reset");

        // Act
        let r = s.delete_many(DocumentFilter::new(), "admin", None).await;

        // Assert
        assert!(matches!(
            r,
            Err(SoftDeleteError::Store(StoreError::Database(_)))
        ));
        assert!(docs
            .iter()
            .all(|d| !s.store().get(d.id()).unwrap().is_deleted()));
    }
}
