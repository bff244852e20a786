pub mod collection;
pub mod collection_document;

use collection_document::Model as Documents;

/// Value of `deleted_id` shared by every document that is not deleted.
pub const ACTIVE_DELETED_ID: i64 = 0;

impl Documents {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
