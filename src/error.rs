use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// Failures reported by a [`crate::store::DocumentStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("Document {0} has an inconsistent deletion state")]
    InconsistentDeletionState(Uuid),
}

impl StoreError {
    /// The SQLSTATE of the failing statement, if the driver reported one.
    pub fn code(&self) -> Option<String> {
        match self {
            StoreError::Database(DbErr::Exec(sea_orm::RuntimeErr::SqlxError(error)))
            | StoreError::Database(DbErr::Query(sea_orm::RuntimeErr::SqlxError(error))) => {
                match error {
                    sqlx::error::Error::Database(e) => e.code().map(|c| c.to_string()),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum SoftDeleteError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("Invalid pagination: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<DbErr> for SoftDeleteError {
    fn from(value: DbErr) -> Self {
        SoftDeleteError::Store(StoreError::Database(value))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn connection_errors_have_no_code() {
        let e = StoreError::Database(DbErr::Conn(sea_orm::RuntimeErr::Internal(
            "gone".to_string(),
        )));

        assert_eq!(e.code(), None);
    }

    #[test]
    fn store_errors_are_passed_through() {
        let e: SoftDeleteError = DbErr::Custom("boom".to_string()).into();

        assert!(matches!(
            e,
            SoftDeleteError::Store(StoreError::Database(DbErr::Custom(_)))
        ));
        assert!(e.to_string().starts_with("Database error: "));
        assert!(e.to_string().contains("boom"));
    }
}
