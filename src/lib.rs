use anyhow::{Context, Result};
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, error};

pub mod clock;
pub mod config;
pub mod delete_service;
pub mod document;
pub mod error;
pub mod retention;
pub mod soft_delete;
pub mod store;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use delete_service::{DeleteCriteria, DeleteService, DeletionOutcome};
pub use document::{DeletionMarker, Document, LifecycleState};
pub use error::{SoftDeleteError, StoreError};
pub use soft_delete::{
    filter::{apply_soft_delete_filter, get_soft_delete_filter, DocumentFilter},
    SoftDeleteStore,
};

pub struct BackgroundTask {
    name: String,
    join_handle: JoinHandle<()>,
    shutdown_signal: oneshot::Sender<()>,
}

impl BackgroundTask {
    pub(crate) fn new(
        name: &str,
        join_handle: JoinHandle<()>,
        shutdown_signal: oneshot::Sender<()>,
    ) -> Self {
        Self {
            name: name.to_string(),
            join_handle,
            shutdown_signal,
        }
    }

    pub async fn shutdown(self) {
        debug!("Shutting down background task: {}", self.name);
        if self.shutdown_signal.send(()).is_err() {
            error!("Failed to send shutdown signal to {} task", self.name);
        }
        if (self.join_handle.await).is_err() {
            error!("Failed to complete {} task", self.name);
        }
    }
}

pub async fn migrate(db: &DatabaseConnection) -> Result<()> {
    Migrator::up(db, None)
        .await
        .context("Database migration failed")
}
