//! Deletion identity markers.
//!
//! A document that is not deleted carries `deleted_id == 0`. Every deleted
//! document carries a positive marker, so a unique index over
//! `(business_key, deleted_id)` admits one active document per key and any
//! number of deleted copies.

use std::fmt::Display;

use chrono::{DateTime, FixedOffset};
use sha2::{Digest, Sha256};

pub use entity::ACTIVE_DELETED_ID;

/// A `deleted_id` value of a deleted document. Always positive.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct DeletedId(i64);

impl DeletedId {
    fn from_raw(value: i64) -> Self {
        Self(value.max(1))
    }

    /// Marker of a single-document delete, derived from the identity alone.
    pub fn for_document(identity: &impl Display) -> Self {
        Self::from_raw(identity_hash(identity))
    }

    /// Marker of a document touched by a bulk delete seeded with `seed`.
    /// Only the low 63 bits of the seed count, so the result stays positive.
    pub fn for_bulk_member(seed: i64, identity: &impl Display) -> Self {
        Self::from_raw((seed & i64::MAX) ^ identity_hash(identity))
    }

    /// Accepts a persisted value. `None` for the reserved active value and
    /// for negative numbers, which are never generated.
    pub fn from_persisted(value: i64) -> Option<Self> {
        (value > ACTIVE_DELETED_ID).then_some(Self(value))
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<DeletedId> for i64 {
    fn from(value: DeletedId) -> Self {
        value.0
    }
}

/// First 60 bits of the SHA-256 digest of the identity's string form.
///
/// The Postgres store computes the same value in SQL, see
/// [`crate::store::postgres`].
pub fn identity_hash(identity: &impl Display) -> i64 {
    let digest = Sha256::digest(identity.to_string().as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) >> 4) as i64
}

/// Seed shared by all documents of one bulk delete: the low 63 bits of the
/// operation time in microseconds since the epoch.
pub fn bulk_seed(now: &DateTime<FixedOffset>) -> i64 {
    now.timestamp_micros() & i64::MAX
}

/// How a store assigns `deleted_id` while applying a bulk deletion: every
/// matched document gets [`DeletedId::for_bulk_member`] of its own id.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BulkDeletionIdentity {
    seed: i64,
}

impl BulkDeletionIdentity {
    pub fn new(now: &DateTime<FixedOffset>) -> Self {
        Self {
            seed: bulk_seed(now),
        }
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    pub fn resolve(&self, identity: &impl Display) -> DeletedId {
        DeletedId::for_bulk_member(self.seed, identity)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn document_marker_is_stable_and_never_reserved() {
        // Arrange
        let id = Uuid::parse_str("9f1c8f0e-6a43-4d8e-9a5b-2b1e7c3d4f50").unwrap();

        // Act
        let first = DeletedId::for_document(&id);
        let second = DeletedId::for_document(&id);

        // Assert
        assert_eq!(first, second);
        assert!(first.get() > ACTIVE_DELETED_ID);
        assert_eq!(first.get(), identity_hash(&id).max(1));
    }

    #[test]
    fn identity_hash_fits_in_sixty_bits() {
        for _ in 0..64 {
            let h = identity_hash(&Uuid::new_v4());
            assert!(h >= 0);
            assert!(h < 1 << 60);
        }
    }

    #[test]
    fn identity_hash_uses_the_string_form() {
        let id = Uuid::new_v4();
        assert_eq!(identity_hash(&id), identity_hash(&id.to_string()));
    }

    #[test]
    fn bulk_members_get_distinct_markers() {
        // Arrange
        let now = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
            .unwrap();
        let identity = BulkDeletionIdentity::new(&now);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        // Act
        let marker_a = identity.resolve(&a);
        let marker_b = identity.resolve(&b);

        // Assert
        assert_ne!(marker_a, marker_b);
        assert!(marker_a.get() > 0);
        assert!(marker_b.get() > 0);
        assert_eq!(
            marker_a.get(),
            (now.timestamp_micros() ^ identity_hash(&a)).max(1)
        );
    }

    #[test]
    fn bulk_seed_has_microsecond_resolution() {
        let now = FixedOffset::east_opt(0)
            .unwrap()
            .timestamp_opt(1_700_000_000, 123_456_000)
            .unwrap();
        assert_eq!(bulk_seed(&now), 1_700_000_000_123_456);
    }

    #[test]
    fn bulk_markers_stay_distinct_before_the_epoch() {
        // Arrange
        let before_epoch = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(1969, 7, 20, 20, 17, 0)
            .unwrap();
        let identity = BulkDeletionIdentity::new(&before_epoch);
        let ids: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();

        // Act
        let markers: std::collections::HashSet<i64> =
            ids.iter().map(|id| identity.resolve(id).get()).collect();

        // Assert
        assert!(identity.seed() >= 0);
        assert_eq!(markers.len(), ids.len());
        assert!(markers.iter().all(|m| *m > 1));
        assert_eq!(
            DeletedId::for_bulk_member(before_epoch.timestamp_micros(), &ids[0]),
            identity.resolve(&ids[0])
        );
    }

    #[test]
    fn persisted_values_are_checked() {
        assert_eq!(DeletedId::from_persisted(0), None);
        assert_eq!(DeletedId::from_persisted(-5), None);
        assert_eq!(DeletedId::from_persisted(42).map(|d| d.get()), Some(42));
    }
}
