use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Gateway-side view of a transaction. `status` holds a [`PaymentStatus`]
/// string, or the empty string when an unmapped gateway status was recorded.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub transaction_id: i32,
    pub gateway_transaction_id: String,
    #[sea_orm(unique)]
    pub order_id: String,
    pub payment_type: i32,
    pub status: String,
    /// JSON encoded [`PaymentData`]
    #[sea_orm(column_type = "Text")]
    pub payment_data: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        self.status.parse().ok()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transaction::Entity",
        from = "Column::TransactionId",
        to = "super::transaction::Column::Id"
    )]
    Transaction,
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Domain payment status. `Challange` keeps the spelling clients already consume.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Challange,
    Success,
    Deny,
    Failure,
}

impl PaymentStatus {
    /// Statuses after which the gateway will not move the payment again.
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failure)
    }
}

/// Method specific data the client needs to complete a payment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentData {
    /// Deeplink into the payment app
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// QR code image url
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip_through_storage_form() {
        assert_eq!(PaymentStatus::Challange.to_string(), "challange");
        assert_eq!("success".parse::<PaymentStatus>().ok(), Some(PaymentStatus::Success));
        assert!("".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn payment_data_uses_short_keys() {
        let data = PaymentData {
            key: Some("gojek://pay".into()),
            qr: Some("https://qr.example/1.png".into()),
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["key"], "gojek://pay");
        assert_eq!(json["qr"], "https://qr.example/1.png");
    }
}
