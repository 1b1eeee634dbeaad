//! Payment gateway contract and the payment methods the storefront accepts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::commerce::PaymentData;
use crate::errors::ServiceError;

pub mod core_api;

pub use core_api::{verify_notification_signature, CoreApiGateway};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(String),
    #[error("gateway request timed out")]
    Timeout,
    #[error("gateway rejected request ({status_code}): {message}")]
    Rejected { status_code: String, message: String },
    #[error("unexpected gateway response: {0}")]
    Decode(String),
    #[error("charge response lacks {0}")]
    MissingPaymentData(&'static str),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Payment methods offered at checkout, identified by their numeric code on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum PaymentMethod {
    Gopay,
}

impl PaymentMethod {
    pub fn from_code(code: i32) -> Result<Self, ServiceError> {
        match code {
            1 => Ok(PaymentMethod::Gopay),
            other => Err(ServiceError::UnsupportedPaymentMethod(other)),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            PaymentMethod::Gopay => 1,
        }
    }

    /// `payment_type` value understood by the gateway.
    pub fn gateway_type(self) -> &'static str {
        match self {
            PaymentMethod::Gopay => "gopay",
        }
    }

    /// Pulls what the client needs to pay out of a charge response.
    pub fn extract_payment_data(self, charge: &ChargeResponse) -> Result<PaymentData, GatewayError> {
        match self {
            PaymentMethod::Gopay => {
                let qr = charge.action_url("generate-qr-code");
                let key = charge.action_url("deeplink-redirect");
                if qr.is_none() && key.is_none() {
                    return Err(GatewayError::MissingPaymentData("gopay actions"));
                }
                Ok(PaymentData { key, qr })
            }
        }
    }
}

impl TryFrom<i32> for PaymentMethod {
    type Error = ServiceError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        PaymentMethod::from_code(code)
    }
}

impl From<PaymentMethod> for i32 {
    fn from(method: PaymentMethod) -> Self {
        method.code()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargeItem {
    pub id: String,
    pub price: i64,
    pub quantity: i32,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CustomerDetails {
    pub first_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub order_id: String,
    pub payment_method: PaymentMethod,
    pub gross_amount: i64,
    pub items: Vec<ChargeItem>,
    pub customer: CustomerDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayAction {
    pub name: String,
    #[serde(default)]
    pub method: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChargeResponse {
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub status_code: String,
    #[serde(default)]
    pub status_message: String,
    #[serde(default)]
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: String,
    #[serde(default)]
    pub actions: Vec<GatewayAction>,
}

impl ChargeResponse {
    pub fn action_url(&self, name: &str) -> Option<String> {
        self.actions
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.url.clone())
    }
}

/// Authoritative status of an order as reported by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransactionStatus {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub status_code: String,
    #[serde(default)]
    pub status_message: String,
    #[serde(default)]
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeResponse, GatewayError>;
    async fn check_status(&self, order_id: String) -> Result<TransactionStatus, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn gopay_charge(actions: Vec<(&str, &str)>) -> ChargeResponse {
        ChargeResponse {
            actions: actions
                .into_iter()
                .map(|(name, url)| GatewayAction {
                    name: name.into(),
                    method: "GET".into(),
                    url: url.into(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert_eq!(PaymentMethod::from_code(1).unwrap(), PaymentMethod::Gopay);
        assert_matches!(
            PaymentMethod::from_code(2),
            Err(ServiceError::UnsupportedPaymentMethod(2))
        );
        assert!(serde_json::from_str::<PaymentMethod>("0").is_err());
    }

    #[test]
    fn gopay_reads_actions_by_name() {
        let charge = gopay_charge(vec![
            ("generate-qr-code", "https://qr.example/q.png"),
            ("deeplink-redirect", "gojek://gopay/merchanttransfer?tref=1"),
            ("get-status", "https://api.example/v2/1/status"),
        ]);
        let data = PaymentMethod::Gopay.extract_payment_data(&charge).unwrap();
        assert_eq!(data.qr.as_deref(), Some("https://qr.example/q.png"));
        assert_eq!(
            data.key.as_deref(),
            Some("gojek://gopay/merchanttransfer?tref=1")
        );
    }

    #[test]
    fn gopay_without_actions_fails() {
        let charge = gopay_charge(vec![("cancel", "https://api.example/cancel")]);
        assert_matches!(
            PaymentMethod::Gopay.extract_payment_data(&charge),
            Err(GatewayError::MissingPaymentData(_))
        );
    }
}
