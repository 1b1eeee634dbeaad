use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A checkout attempt. Written once, never updated.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    #[sea_orm(column_type = "Text")]
    pub address_ship: String,
    pub total_price: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::payment_record::Entity")]
    PaymentRecord,
}

impl Related<super::payment_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
