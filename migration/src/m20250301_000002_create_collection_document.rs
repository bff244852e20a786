use sea_orm_migration::prelude::*;

use crate::Collection;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CollectionDocument::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CollectionDocument::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CollectionDocument::CollectionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CollectionDocument::BusinessKey).string_len(250))
                    .col(ColumnDef::new(CollectionDocument::F).json_binary().not_null())
                    .col(ColumnDef::new(CollectionDocument::DeletedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(CollectionDocument::DeletedBy).string_len(150))
                    .col(
                        ColumnDef::new(CollectionDocument::DeletedId)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-document-collection_id")
                            .from(CollectionDocument::Table, CollectionDocument::CollectionId)
                            .to(Collection::Table, Collection::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one active document per business key; deleted copies differ in deleted_id.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .unique()
                    .name("idx-doc_business_key-deleted_id")
                    .table(CollectionDocument::Table)
                    .col(CollectionDocument::CollectionId)
                    .col(CollectionDocument::BusinessKey)
                    .col(CollectionDocument::DeletedId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-doc_deleted_at")
                    .table(CollectionDocument::Table)
                    .col(CollectionDocument::DeletedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx-doc_deleted_at").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx-doc_business_key-deleted_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(CollectionDocument::Table).to_owned())
            .await
    }
}

/// Learn more at https://docs.rs/sea-query#iden
#[derive(Iden)]
enum CollectionDocument {
    Table,
    Id,
    CollectionId,
    BusinessKey,
    F,
    DeletedAt,
    DeletedBy,
    DeletedId,
}
