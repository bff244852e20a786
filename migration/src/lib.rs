pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_collection;
mod m20250301_000002_create_collection_document;

pub struct Migrator;
pub use m20250301_000001_create_collection::Collection;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_collection::Migration),
            Box::new(m20250301_000002_create_collection_document::Migration),
        ]
    }
}
