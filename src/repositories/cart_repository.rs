use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set, SqlErr,
};
use std::sync::Arc;
use tracing::debug;

use crate::entities::commerce::cart::{
    self, CartStatus, Column, Entity as Cart, Model as CartModel, MAX_LINE_QUANTITY,
};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartFilter {
    pub id: Option<i32>,
    pub user_id: Option<i32>,
    pub product_id: Option<i32>,
    pub transaction_id: Option<i32>,
    pub status: Option<CartStatus>,
}

impl CartFilter {
    /// Lines the user has not checked out yet.
    pub fn open_for_user(user_id: i32) -> Self {
        Self {
            user_id: Some(user_id),
            status: Some(CartStatus::InCart),
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
        if let Some(product_id) = self.product_id {
            cond = cond.add(Column::ProductId.eq(product_id));
        }
        if let Some(transaction_id) = self.transaction_id {
            cond = cond.add(Column::TransactionId.eq(transaction_id));
        }
        if let Some(status) = self.status {
            cond = cond.add(Column::Status.eq(status));
        }
        cond
    }
}

/// Fields to overwrite; `None` leaves the column alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartPatch {
    pub quantity: Option<i32>,
    pub status: Option<CartStatus>,
    pub transaction_id: Option<i32>,
    pub final_price_per_item: Option<i64>,
}

impl CartPatch {
    fn is_empty(&self) -> bool {
        self.quantity.is_none()
            && self.status.is_none()
            && self.transaction_id.is_none()
            && self.final_price_per_item.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCartItem {
    pub user_id: i32,
    pub product_id: i32,
    pub quantity: i32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Adds `quantity` of a product to the user's open cart. An existing
    /// `in_cart` line for the same product is incremented instead of duplicated.
    async fn create(&self, item: NewCartItem) -> Result<CartModel, ServiceError>;

    async fn get(&self, filter: CartFilter) -> Result<CartModel, ServiceError>;

    async fn get_list(&self, filter: CartFilter) -> Result<Vec<CartModel>, ServiceError>;

    /// Returns the number of rows touched.
    async fn update(&self, filter: CartFilter, patch: CartPatch) -> Result<u64, ServiceError>;

    async fn delete(&self, filter: CartFilter) -> Result<u64, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct DbCartRepository {
    db: Arc<DatabaseConnection>,
}

impl DbCartRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn increment_open_line(&self, item: &NewCartItem) -> Result<Option<CartModel>, ServiceError> {
        let filter = CartFilter {
            product_id: Some(item.product_id),
            ..CartFilter::open_for_user(item.user_id)
        };

        let touched = Cart::update_many()
            .col_expr(Column::Quantity, Expr::col(Column::Quantity).add(item.quantity))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(filter.condition())
            .filter(Column::Quantity.lte(MAX_LINE_QUANTITY - item.quantity))
            .exec(&*self.db)
            .await?
            .rows_affected;

        if touched == 0 {
            let existing = Cart::find().filter(filter.condition()).one(&*self.db).await?;
            return match existing {
                Some(line) => Err(ServiceError::ValidationError(format!(
                    "cart line {} would exceed {} items",
                    line.id, MAX_LINE_QUANTITY
                ))),
                None => Ok(None),
            };
        }

        Cart::find()
            .filter(filter.condition())
            .one(&*self.db)
            .await
            .map_err(ServiceError::from)
    }
}

#[async_trait]
impl CartRepository for DbCartRepository {
    async fn create(&self, item: NewCartItem) -> Result<CartModel, ServiceError> {
        if !(1..=MAX_LINE_QUANTITY).contains(&item.quantity) {
            return Err(ServiceError::ValidationError(format!(
                "quantity must be between 1 and {MAX_LINE_QUANTITY}"
            )));
        }

        if let Some(line) = self.increment_open_line(&item).await? {
            debug!(cart_id = line.id, quantity = line.quantity, "Incremented open cart line");
            return Ok(line);
        }

        let now = Utc::now();
        let inserted = cart::ActiveModel {
            user_id: Set(item.user_id),
            product_id: Set(item.product_id),
            transaction_id: Set(0),
            quantity: Set(item.quantity),
            status: Set(CartStatus::InCart),
            final_price_per_item: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await;

        match inserted {
            Ok(line) => Ok(line),
            // A concurrent add created the line between our update and insert.
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => self
                .increment_open_line(&item)
                .await?
                .ok_or_else(|| ServiceError::Conflict("cart line changed concurrently".into())),
            Err(err) => Err(err.into()),
        }
    }

    async fn get(&self, filter: CartFilter) -> Result<CartModel, ServiceError> {
        Cart::find()
            .filter(filter.condition())
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("cart item matching {:?}", filter)))
    }

    async fn get_list(&self, filter: CartFilter) -> Result<Vec<CartModel>, ServiceError> {
        Ok(Cart::find()
            .filter(filter.condition())
            .order_by_asc(Column::Id)
            .all(&*self.db)
            .await?)
    }

    async fn update(&self, filter: CartFilter, patch: CartPatch) -> Result<u64, ServiceError> {
        if patch.is_empty() {
            return Ok(0);
        }

        let mut query = Cart::update_many().col_expr(Column::UpdatedAt, Expr::value(Utc::now()));
        if let Some(quantity) = patch.quantity {
            query = query.col_expr(Column::Quantity, Expr::value(quantity));
        }
        if let Some(status) = patch.status {
            query = query.col_expr(Column::Status, Expr::value(status));
        }
        if let Some(transaction_id) = patch.transaction_id {
            query = query.col_expr(Column::TransactionId, Expr::value(transaction_id));
        }
        if let Some(price) = patch.final_price_per_item {
            query = query.col_expr(Column::FinalPricePerItem, Expr::value(price));
        }

        let result = query.filter(filter.condition()).exec(&*self.db).await?;
        Ok(result.rows_affected)
    }

    async fn delete(&self, filter: CartFilter) -> Result<u64, ServiceError> {
        let result = Cart::delete_many()
            .filter(filter.condition())
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
