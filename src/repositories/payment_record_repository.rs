use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, Set,
};
use std::sync::Arc;

use crate::entities::commerce::payment_record::{
    self, Column, Entity as PaymentRecord, Model as PaymentRecordModel, PaymentStatus,
};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentRecordFilter {
    pub transaction_id: Option<i32>,
    pub order_id: Option<String>,
}

impl PaymentRecordFilter {
    pub fn by_transaction(transaction_id: i32) -> Self {
        Self {
            transaction_id: Some(transaction_id),
            ..Default::default()
        }
    }

    pub fn by_order(order_id: impl Into<String>) -> Self {
        Self {
            order_id: Some(order_id.into()),
            ..Default::default()
        }
    }

    fn condition(&self) -> Condition {
        let mut cond = Condition::all();
        if let Some(transaction_id) = self.transaction_id {
            cond = cond.add(Column::TransactionId.eq(transaction_id));
        }
        if let Some(order_id) = &self.order_id {
            cond = cond.add(Column::OrderId.eq(order_id.as_str()));
        }
        cond
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentRecord {
    pub transaction_id: i32,
    pub gateway_transaction_id: String,
    pub order_id: String,
    pub payment_type: i32,
    pub status: PaymentStatus,
    pub payment_data: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentRecordRepository: Send + Sync {
    async fn create(&self, record: NewPaymentRecord) -> Result<PaymentRecordModel, ServiceError>;
    async fn get(&self, filter: PaymentRecordFilter) -> Result<PaymentRecordModel, ServiceError>;
    /// Writes the raw status string; the empty string marks an unmapped gateway status.
    async fn update_status(
        &self,
        filter: PaymentRecordFilter,
        status: String,
    ) -> Result<u64, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct DbPaymentRecordRepository {
    db: Arc<DatabaseConnection>,
}

impl DbPaymentRecordRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PaymentRecordRepository for DbPaymentRecordRepository {
    async fn create(&self, record: NewPaymentRecord) -> Result<PaymentRecordModel, ServiceError> {
        let now = Utc::now();
        let model = payment_record::ActiveModel {
            transaction_id: Set(record.transaction_id),
            gateway_transaction_id: Set(record.gateway_transaction_id),
            order_id: Set(record.order_id),
            payment_type: Set(record.payment_type),
            status: Set(record.status.to_string()),
            payment_data: Set(record.payment_data),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;
        Ok(model)
    }

    async fn get(&self, filter: PaymentRecordFilter) -> Result<PaymentRecordModel, ServiceError> {
        PaymentRecord::find()
            .filter(filter.condition())
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("payment record matching {:?}", filter)))
    }

    async fn update_status(
        &self,
        filter: PaymentRecordFilter,
        status: String,
    ) -> Result<u64, ServiceError> {
        let result = PaymentRecord::update_many()
            .col_expr(Column::Status, Expr::value(status))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(filter.condition())
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{DbTransactionRepository, NewTransaction, TransactionRepository};
    use sea_orm::Database;

    async fn setup() -> DbPaymentRecordRepository {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        crate::db::run_migrations(&db).await.unwrap();
        let db = Arc::new(db);
        DbTransactionRepository::new(db.clone())
            .create(NewTransaction {
                user_id: 1,
                address_ship: "Jl. Merdeka 1".into(),
                total_price: 20_000,
            })
            .await
            .unwrap();
        DbPaymentRecordRepository::new(db)
    }

    fn record(order_id: &str) -> NewPaymentRecord {
        NewPaymentRecord {
            transaction_id: 1,
            gateway_transaction_id: "gw-1".into(),
            order_id: order_id.into(),
            payment_type: 1,
            status: PaymentStatus::Pending,
            payment_data: "{}".into(),
        }
    }

    #[tokio::test]
    async fn status_update_is_visible_by_order_id() {
        let repo = setup().await;
        repo.create(record("ORD-1-1700000000")).await.unwrap();

        let touched = repo
            .update_status(
                PaymentRecordFilter::by_order("ORD-1-1700000000"),
                PaymentStatus::Success.to_string(),
            )
            .await
            .unwrap();
        assert_eq!(touched, 1);

        let stored = repo
            .get(PaymentRecordFilter::by_transaction(1))
            .await
            .unwrap();
        assert_eq!(stored.payment_status(), Some(PaymentStatus::Success));
    }

    #[tokio::test]
    async fn order_id_is_unique() {
        let repo = setup().await;
        repo.create(record("ORD-1-1")).await.unwrap();
        assert!(repo.create(record("ORD-1-1")).await.is_err());
    }
}
