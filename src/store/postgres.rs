//! [`DocumentStore`] over the `collection_document` table.
//!
//! A store is scoped to one collection; every statement filters on its id.

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use sea_query::{Expr, SimpleExpr};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{DeleteOutcome, DeletionChange, DocumentStore, UpdateOutcome};
use crate::{
    document::{DeletionMarker, Document},
    error::StoreError,
    soft_delete::filter::{DeletedAtFilter, DocumentFilter, FieldFilter},
    types::Pagination,
};
use entity::collection_document::{Column as DocumentsColumns, Entity as Documents};

/// `max(1, $1 XOR h60("id"))`, the SQL form of
/// [`crate::soft_delete::identity::DeletedId::for_bulk_member`].
const BULK_MEMBER_DELETED_ID_SQL: &str = r#"GREATEST($1 # ('x' || substr(encode(sha256(convert_to("id"::text, 'UTF8')), 'hex'), 1, 15))::bit(60)::bigint, 1)"#;

pub struct PostgresDocumentStore {
    db: DatabaseConnection,
    collection_id: Uuid,
}

impl PostgresDocumentStore {
    pub fn new(db: DatabaseConnection, collection_id: Uuid) -> Self {
        Self { db, collection_id }
    }

    /// Opens the store of the collection with the given name.
    pub async fn open(
        db: &DatabaseConnection,
        collection_name: &str,
    ) -> Result<Option<Self>, StoreError> {
        let collection = get_collection_by_name(db, collection_name).await?;
        Ok(collection.map(|c| Self::new(db.clone(), c.id)))
    }

    pub fn collection_id(&self) -> &Uuid {
        &self.collection_id
    }

    fn condition(&self, filter: &DocumentFilter) -> Condition {
        let mut condition =
            Condition::all().add(DocumentsColumns::CollectionId.eq(self.collection_id));
        for field_filter in filter.conditions() {
            condition = condition.add(field_filter_condition(field_filter));
        }
        if let Some(deleted_at) = filter.deleted_at() {
            condition = condition.add(deleted_at_expr(deleted_at));
        }
        condition
    }

    async fn insert_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        document: &Document,
    ) -> Result<(), StoreError> {
        let deletion = document.deletion();
        entity::collection_document::ActiveModel {
            id: Set(*document.id()),
            collection_id: Set(self.collection_id),
            business_key: Set(document.business_key().map(str::to_string)),
            f: Set(document.fields().clone()),
            deleted_at: Set(deletion.deleted_at().copied()),
            deleted_by: Set(deletion.deleted_by().map(str::to_string)),
            deleted_id: Set(deletion.deleted_id()),
        }
        .insert(conn)
        .await?;
        Ok(())
    }

    async fn find_one_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        filter: &DocumentFilter,
    ) -> Result<Option<Document>, StoreError> {
        Documents::find()
            .filter(self.condition(filter))
            .order_by_asc(DocumentsColumns::Id)
            .one(conn)
            .await?
            .map(Document::try_from)
            .transpose()
    }

    async fn find_many_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        filter: &DocumentFilter,
        pagination: &Pagination,
    ) -> Result<Vec<Document>, StoreError> {
        Documents::find()
            .filter(self.condition(filter))
            .order_by_asc(DocumentsColumns::Id)
            .limit(u64::from(pagination.limit()))
            .offset(u64::from(pagination.offset()))
            .all(conn)
            .await?
            .into_iter()
            .map(Document::try_from)
            .collect()
    }

    async fn update_one_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &Uuid,
        marker: &DeletionMarker,
    ) -> Result<UpdateOutcome, StoreError> {
        let result = Documents::update_many()
            .col_expr(DocumentsColumns::DeletedAt, Expr::value(marker.deleted_at().copied()))
            .col_expr(
                DocumentsColumns::DeletedBy,
                Expr::value(marker.deleted_by().map(str::to_string)),
            )
            .col_expr(DocumentsColumns::DeletedId, Expr::value(marker.deleted_id()))
            .filter(self.condition(&DocumentFilter::by_id(*id)))
            .exec(conn)
            .await?;
        Ok(rows_updated(result.rows_affected))
    }

    async fn update_many_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        filter: &DocumentFilter,
        change: &DeletionChange,
    ) -> Result<UpdateOutcome, StoreError> {
        let update = Documents::update_many();
        let update = match change {
            DeletionChange::Delete { at, by, identity } => update
                .col_expr(DocumentsColumns::DeletedAt, Expr::value(Some(*at)))
                .col_expr(DocumentsColumns::DeletedBy, Expr::value(Some(by.clone())))
                .col_expr(
                    DocumentsColumns::DeletedId,
                    Expr::cust_with_values(BULK_MEMBER_DELETED_ID_SQL, [identity.seed()]),
                ),
            DeletionChange::Restore => {
                let active = DeletionMarker::Active;
                update
                    .col_expr(
                        DocumentsColumns::DeletedAt,
                        Expr::value(active.deleted_at().copied()),
                    )
                    .col_expr(
                        DocumentsColumns::DeletedBy,
                        Expr::value(active.deleted_by().map(str::to_string)),
                    )
                    .col_expr(DocumentsColumns::DeletedId, Expr::value(active.deleted_id()))
            }
        };
        let result = update.filter(self.condition(filter)).exec(conn).await?;
        Ok(rows_updated(result.rows_affected))
    }

    async fn delete_one_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &Uuid,
    ) -> Result<DeleteOutcome, StoreError> {
        self.delete_many_on(conn, &DocumentFilter::by_id(*id)).await
    }

    async fn delete_many_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        filter: &DocumentFilter,
    ) -> Result<DeleteOutcome, StoreError> {
        let result = Documents::delete_many()
            .filter(self.condition(filter))
            .exec(conn)
            .await?;
        Ok(DeleteOutcome {
            deleted_count: result.rows_affected,
        })
    }
}

/// Postgres only reports affected rows; the soft-delete filters already
/// exclude rows that would stay unchanged.
fn rows_updated(rows_affected: u64) -> UpdateOutcome {
    UpdateOutcome {
        matched_count: rows_affected,
        modified_count: rows_affected,
    }
}

fn field_filter_condition(field_filter: &FieldFilter) -> Condition {
    match field_filter {
        FieldFilter::Id(id) => Condition::all().add(DocumentsColumns::Id.eq(*id)),
        FieldFilter::BusinessKey(key) => {
            Condition::all().add(DocumentsColumns::BusinessKey.eq(key.clone()))
        }
        FieldFilter::ExactFieldMatch { field_name, value } => {
            Condition::all().add(field_text_eq(field_name, value))
        }
        FieldFilter::FieldValueInMatch { field_name, values } => values
            .iter()
            .fold(Condition::any(), |c, value| {
                c.add(field_text_eq(field_name, value))
            }),
    }
}

fn field_text_eq(field_name: &str, value: &str) -> SimpleExpr {
    Expr::cust_with_values(r#""f"->>$1 = $2"#, [field_name, value])
}

fn deleted_at_expr(deleted_at: &DeletedAtFilter) -> SimpleExpr {
    match deleted_at {
        DeletedAtFilter::IsNull => DocumentsColumns::DeletedAt.is_null(),
        DeletedAtFilter::IsNotNull => DocumentsColumns::DeletedAt.is_not_null(),
        DeletedAtFilter::Before(t) => DocumentsColumns::DeletedAt.lt(*t),
        DeletedAtFilter::Since(t) => DocumentsColumns::DeletedAt.gte(*t),
    }
}

pub(crate) async fn get_collection_by_name(
    db: &DatabaseConnection,
    collection_name: &str,
) -> Result<Option<entity::collection::Model>, StoreError> {
    let query_result = entity::collection::Entity::find()
        .filter(entity::collection::Column::Name.eq(collection_name))
        .one(db)
        .await;

    match query_result {
        Ok(Some(col)) => {
            debug!("Collection with name {} has id {}", collection_name, col.id);
            Ok(Some(col))
        }
        Ok(None) => {
            info!("Collection not found: {}", collection_name);
            Ok(None)
        }
        Err(dberr) => {
            error!("Failed to look up collection {}: {}", collection_name, dberr);
            Err(dberr.into())
        }
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    type Session = DatabaseTransaction;

    async fn insert(
        &self,
        document: &Document,
        session: Option<&DatabaseTransaction>,
    ) -> Result<(), StoreError> {
        match session {
            Some(txn) => self.insert_on(txn, document).await,
            None => self.insert_on(&self.db, document).await,
        }
    }

    async fn find_one(
        &self,
        filter: &DocumentFilter,
        session: Option<&DatabaseTransaction>,
    ) -> Result<Option<Document>, StoreError> {
        match session {
            Some(txn) => self.find_one_on(txn, filter).await,
            None => self.find_one_on(&self.db, filter).await,
        }
    }

    async fn find_many(
        &self,
        filter: &DocumentFilter,
        pagination: &Pagination,
        session: Option<&DatabaseTransaction>,
    ) -> Result<Vec<Document>, StoreError> {
        match session {
            Some(txn) => self.find_many_on(txn, filter, pagination).await,
            None => self.find_many_on(&self.db, filter, pagination).await,
        }
    }

    async fn update_one(
        &self,
        id: &Uuid,
        marker: &DeletionMarker,
        session: Option<&DatabaseTransaction>,
    ) -> Result<UpdateOutcome, StoreError> {
        match session {
            Some(txn) => self.update_one_on(txn, id, marker).await,
            None => self.update_one_on(&self.db, id, marker).await,
        }
    }

    async fn update_many(
        &self,
        filter: &DocumentFilter,
        change: &DeletionChange,
        session: Option<&DatabaseTransaction>,
    ) -> Result<UpdateOutcome, StoreError> {
        match session {
            Some(txn) => self.update_many_on(txn, filter, change).await,
            None => self.update_many_on(&self.db, filter, change).await,
        }
    }

    async fn delete_one(
        &self,
        id: &Uuid,
        session: Option<&DatabaseTransaction>,
    ) -> Result<DeleteOutcome, StoreError> {
        match session {
            Some(txn) => self.delete_one_on(txn, id).await,
            None => self.delete_one_on(&self.db, id).await,
        }
    }

    async fn delete_many(
        &self,
        filter: &DocumentFilter,
        session: Option<&DatabaseTransaction>,
    ) -> Result<DeleteOutcome, StoreError> {
        match session {
            Some(txn) => self.delete_many_on(txn, filter).await,
            None => self.delete_many_on(&self.db, filter).await,
        }
    }
}
