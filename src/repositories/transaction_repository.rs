use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;

use crate::entities::commerce::transaction::{
    self, Column, Entity as Transaction, Model as TransactionModel,
};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub id: Option<i32>,
    pub user_id: Option<i32>,
}

impl TransactionFilter {
    pub fn by_id(id: i32) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    fn condition(&self) -> Condition {
        let mut cond = Condition::all();
        if let Some(id) = self.id {
            cond = cond.add(Column::Id.eq(id));
        }
        if let Some(user_id) = self.user_id {
            cond = cond.add(Column::UserId.eq(user_id));
        }
        cond
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub user_id: i32,
    pub address_ship: String,
    pub total_price: i64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn create(&self, tx: NewTransaction) -> Result<TransactionModel, ServiceError>;
    async fn get(&self, filter: TransactionFilter) -> Result<TransactionModel, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct DbTransactionRepository {
    db: Arc<DatabaseConnection>,
}

impl DbTransactionRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TransactionRepository for DbTransactionRepository {
    async fn create(&self, tx: NewTransaction) -> Result<TransactionModel, ServiceError> {
        let model = transaction::ActiveModel {
            user_id: Set(tx.user_id),
            address_ship: Set(tx.address_ship),
            total_price: Set(tx.total_price),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;
        Ok(model)
    }

    async fn get(&self, filter: TransactionFilter) -> Result<TransactionModel, ServiceError> {
        Transaction::find()
            .filter(filter.condition())
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("transaction matching {:?}", filter)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use sea_orm::Database;

    async fn setup() -> DbTransactionRepository {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        crate::db::run_migrations(&db).await.unwrap();
        DbTransactionRepository::new(Arc::new(db))
    }

    #[tokio::test]
    async fn filter_matches_owner_and_id() {
        let repo = setup().await;
        let created = repo
            .create(NewTransaction {
                user_id: 3,
                address_ship: "Jl. Asia Afrika 8".into(),
                total_price: 45_000,
            })
            .await
            .unwrap();

        let found = repo
            .get(TransactionFilter {
                id: Some(created.id),
                user_id: Some(3),
            })
            .await
            .unwrap();
        assert_eq!(found.total_price, 45_000);

        let foreign = repo
            .get(TransactionFilter {
                id: Some(created.id),
                user_id: Some(4),
            })
            .await;
        assert_matches!(foreign, Err(ServiceError::NotFound(_)));
    }
}
