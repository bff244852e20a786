//! Single document transitions: delete, restore and purge.
//!
//! Each applied transition is one statement scoped by the document id and is
//! mirrored into the caller's instance. Nothing guards against another
//! writer touching the same document in between; the store's last write wins.

use tracing::{debug, info, warn};

use super::{identity::DeletedId, SoftDeleteStore};
use crate::{
    clock::Clock,
    document::{DeletionMarker, Document},
    error::SoftDeleteError,
    store::{DeleteOutcome, DocumentStore},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transition {
    Applied,
    /// The document already was in the target state.
    Unchanged,
    /// The store no longer holds the document.
    Missing,
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

impl<S, C> SoftDeleteStore<S, C>
where
    S: DocumentStore,
    C: Clock,
{
    /// Marks the document deleted by `actor`.
    ///
    /// A deleted document keeps its first `deleted_at`, `deleted_by` and
    /// `deleted_id`.
    pub async fn delete(
        &self,
        document: &mut Document,
        actor: &str,
        session: Option<&S::Session>,
    ) -> Result<Transition, SoftDeleteError> {
        if document.is_deleted() {
            debug!(
                parent: &self.span,
                "Document {} already deleted by {:?}",
                document.id(),
                document.deleted_by()
            );
            return Ok(Transition::Unchanged);
        }

        let marker = DeletionMarker::deleted(
            self.clock.now(),
            actor,
            DeletedId::for_document(document.id()),
        );
        let outcome = self
            .store
            .update_one(document.id(), &marker, session)
            .await
            .map_err(|e| self.store_failure("delete", e))?;
        if outcome.modified_count == 0 {
            warn!(parent: &self.span, "Document {} not found, not deleted", document.id());
            return Ok(Transition::Missing);
        }
        document.set_deletion(marker);

        info!(
            parent: &self.span,
            "Document {} deleted by {} (deleted_id {})",
            document.id(),
            actor,
            document.deleted_id()
        );
        Ok(Transition::Applied)
    }

    /// Clears the deletion triple of a deleted document.
    pub async fn restore(
        &self,
        document: &mut Document,
        session: Option<&S::Session>,
    ) -> Result<Transition, SoftDeleteError> {
        if !document.is_deleted() {
            debug!(parent: &self.span, "Document {} is not deleted", document.id());
            return Ok(Transition::Unchanged);
        }

        let marker = DeletionMarker::Active;
        let outcome = self
            .store
            .update_one(document.id(), &marker, session)
            .await
            .map_err(|e| self.store_failure("restore", e))?;
        if outcome.modified_count == 0 {
            warn!(parent: &self.span, "Document {} not found, not restored", document.id());
            return Ok(Transition::Missing);
        }
        document.set_deletion(marker);

        info!(parent: &self.span, "Document {} restored", document.id());
        Ok(Transition::Applied)
    }

    /// Removes the document physically, whatever its deletion state.
    pub async fn purge(
        &self,
        document: Document,
        session: Option<&S::Session>,
    ) -> Result<DeleteOutcome, SoftDeleteError> {
        let outcome = self
            .store
            .delete_one(document.id(), session)
            .await
            .map_err(|e| self.store_failure("purge", e))?;
        info!(
            parent: &self.span,
            "Document {} purged ({} removed)",
            document.id(),
            outcome.deleted_count
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use sea_orm::DbErr;
    use serde_json::json;

    use super::*;
    use crate::{
        document::LifecycleState,
        error::StoreError,
        soft_delete::{
            filter::{DocumentFilter, FieldFilter},
            identity::identity_hash,
            tests::{now, soft_store},
        },
        types::Pagination,
    };

    #[tokio::test]
    async fn delete_marks_and_mirrors() {
        // Arrange
        let s = soft_store();
        let mut doc = s
            .insert(Some("k".to_string()), json!({"title": "a"}), None)
            .await
            .unwrap();
        let before = s.store().statement_count();

        // Act
        let t = s.delete(&mut doc, "admin", None).await.unwrap();

        // Assert
        assert_eq!(t, Transition::Applied);
        assert_eq!(s.store().statement_count(), before + 1);
        assert_eq!(doc.state(), LifecycleState::Deleted);
        assert_eq!(doc.deleted_at(), Some(&now()));
        assert_eq!(doc.deleted_by(), Some("admin"));
        assert_eq!(doc.deleted_id(), identity_hash(doc.id()).max(1));
        assert_eq!(s.store().get(doc.id()), Some(doc));
    }

    #[tokio::test]
    async fn second_delete_keeps_the_first_audit_fields() {
        // Arrange
        let s = soft_store();
        let mut doc = s.insert(None, json!({}), None).await.unwrap();
        s.delete(&mut doc, "admin", None).await.unwrap();
        let first = doc.clone();
        let before = s.store().statement_count();

        // Act
        let t = s.delete(&mut doc, "other", None).await.unwrap();

        // Assert
        assert_eq!(t, Transition::Unchanged);
        assert_eq!(s.store().statement_count(), before);
        assert_eq!(doc, first);
        assert_eq!(doc.deleted_by(), Some("admin"));
        assert_eq!(s.store().get(doc.id()), Some(first));
    }

    #[tokio::test]
    async fn delete_then_restore_round_trips() {
        // Arrange
        let s = soft_store();
        let untouched = s.insert(None, json!({"x": 1}), None).await.unwrap();
        let mut doc = untouched.clone();
        s.delete(&mut doc, "admin", None).await.unwrap();

        // Act
        let t = s.restore(&mut doc, None).await.unwrap();

        // Assert
        assert_eq!(t, Transition::Applied);
        assert_eq!(doc.deleted_at(), None);
        assert_eq!(doc.deleted_by(), None);
        assert_eq!(doc.deleted_id(), 0);
        assert_eq!(doc, untouched);
        assert_eq!(s.store().get(doc.id()), Some(untouched));
    }

    #[tokio::test]
    async fn restore_of_an_active_document_is_a_no_op() {
        let s = soft_store();
        let mut doc = s.insert(None, json!({}), None).await.unwrap();
        let before = s.store().statement_count();

        let t = s.restore(&mut doc, None).await.unwrap();

        assert_eq!(t, Transition::Unchanged);
        assert!(!t.is_applied());
        assert_eq!(s.store().statement_count(), before);
    }

    #[tokio::test]
    async fn delete_restore_cycles_keep_the_unique_index_happy() {
        // Arrange
        let s = soft_store();
        let mut doc = s
            .insert(Some("same".to_string()), json!({}), None)
            .await
            .unwrap();

        // Act
        for _ in 0..3 {
            s.delete(&mut doc, "admin", None).await.unwrap();
            doc = s
                .insert(Some("same".to_string()), json!({}), None)
                .await
                .unwrap();
        }

        // Assert
        let all = s
            .hard_find_many(
                Some(DocumentFilter::new().with(FieldFilter::BusinessKey("same".to_string()))),
                &Pagination::default(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all.iter().filter(|d| !d.is_deleted()).count(), 1);
    }

    #[tokio::test]
    async fn a_second_active_copy_is_refused() {
        let s = soft_store();
        s.insert(Some("dup".to_string()), json!({}), None)
            .await
            .unwrap();

        let r = s.insert(Some("dup".to_string()), json!({}), None).await;

        assert!(matches!(
            r,
            Err(SoftDeleteError::Store(StoreError::Database(_)))
        ));
    }

    #[tokio::test]
    async fn purge_removes_whatever_the_state() {
        // Arrange
        let s = soft_store();
        let active = s.insert(None, json!({}), None).await.unwrap();
        let mut deleted = s.insert(None, json!({}), None).await.unwrap();
        s.delete(&mut deleted, "admin", None).await.unwrap();
        let active_id = *active.id();
        let deleted_id = *deleted.id();

        // Act
        let a = s.purge(active, None).await.unwrap();
        let d = s.purge(deleted, None).await.unwrap();

        // Assert
        assert_eq!(a.deleted_count, 1);
        assert_eq!(d.deleted_count, 1);
        assert_eq!(s.store().get(&active_id), None);
        assert_eq!(s.store().get(&deleted_id), None);
        assert!(s.store().is_empty());
    }

    #[tokio::test]
    async fn failed_delete_leaves_the_instance_untouched() {
        let s = soft_store();
        let mut doc = s.insert(None, json!({}), None).await.unwrap();
        s.store().fail_next_statement("connection reset");

        let r = s.delete(&mut doc, "admin", None).await;

        assert!(r.is_err());
        assert!(!doc.is_deleted());
        assert_eq!(s.store().get(doc.id()).map(|d| d.is_deleted()), Some(false));
    }

    #[tokio::test]
    async fn restore_next_to_an_active_copy_is_refused() {
        // Arrange
        let s = soft_store();
        let mut doc = s
            .insert(Some("same".to_string()), json!({}), None)
            .await
            .unwrap();
        s.delete(&mut doc, "admin", None).await.unwrap();
        let deleted = doc.clone();
        s.insert(Some("same".to_string()), json!({}), None)
            .await
            .unwrap();

        // Act
        let r = s.restore(&mut doc, None).await;

        // Assert
        assert!(matches!(
            r,
            Err(SoftDeleteError::Store(StoreError::Database(DbErr::Exec(_))))
        ));
        assert_eq!(doc.state(), LifecycleState::Deleted);
        assert_eq!(doc, deleted);
        assert_eq!(s.store().get(doc.id()), Some(deleted));
    }

    #[tokio::test]
    async fn delete_of_a_vanished_document_reports_missing() {
        // Arrange
        let s = soft_store();
        let mut doc = s.insert(None, json!({}), None).await.unwrap();
        s.store().delete_one(doc.id(), None).await.unwrap();

        // Act
        let t = s.delete(&mut doc, "admin", None).await.unwrap();

        // Assert
        assert_eq!(t, Transition::Missing);
        assert!(!t.is_applied());
        assert!(!doc.is_deleted());
        assert!(s.store().is_empty());
    }

    #[tokio::test]
    async fn restore_of_a_vanished_document_reports_missing() {
        // Arrange
        let s = soft_store();
        let mut doc = s.insert(None, json!({}), None).await.unwrap();
        s.delete(&mut doc, "admin", None).await.unwrap();
        s.store().delete_one(doc.id(), None).await.unwrap();

        // Act
        let t = s.restore(&mut doc, None).await.unwrap();

        // Assert
        assert_eq!(t, Transition::Missing);
        assert!(doc.is_deleted());
    }
}
