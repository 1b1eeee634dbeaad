//! Core API client: server-to-server charges and status checks over HTTPS with
//! the server key as basic auth username.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha512};
use tracing::{debug, instrument, warn};

use super::{ChargeRequest, ChargeResponse, GatewayError, PaymentGateway, TransactionStatus};
use crate::config::GatewayConfig;
use crate::tracing::log_slow_call;

const SLOW_CALL_THRESHOLD: Duration = Duration::from_secs(3);
/// Body status code of a status check on an expired transaction.
const EXPIRED_STATUS_CODE: u16 = 407;

#[derive(Clone)]
pub struct CoreApiGateway {
    client: Client,
    base_url: String,
    server_key: String,
}

impl CoreApiGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            server_key: config.server_key.clone(),
        })
    }

    fn charge_body(request: &ChargeRequest) -> Value {
        json!({
            "payment_type": request.payment_method.gateway_type(),
            "transaction_details": {
                "order_id": request.order_id,
                "gross_amount": request.gross_amount,
            },
            "item_details": request.items,
            "customer_details": request.customer,
        })
    }

    async fn read_body<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
        let http_status = response.status();
        let text = response.text().await?;

        if !http_status.is_success() {
            return Err(GatewayError::Rejected {
                status_code: http_status.as_u16().to_string(),
                message: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

/// The gateway answers HTTP 200 for most business failures and reports the
/// real outcome in the body's `status_code`.
fn ensure_accepted(status_code: &str, message: &str) -> Result<(), GatewayError> {
    if status_code.starts_with('2') {
        Ok(())
    } else {
        Err(GatewayError::Rejected {
            status_code: status_code.to_string(),
            message: message.to_string(),
        })
    }
}

/// A status check's body `status_code` describes the transaction itself:
/// 2xx for live ones and 407 once expired. Other codes from 400 up mean the
/// lookup failed (unknown order, bad credentials).
fn ensure_status_found(status_code: &str, message: &str) -> Result<(), GatewayError> {
    match status_code.parse::<u16>() {
        Ok(code) if code < 400 || code == EXPIRED_STATUS_CODE => Ok(()),
        _ => Err(GatewayError::Rejected {
            status_code: status_code.to_string(),
            message: message.to_string(),
        }),
    }
}

#[async_trait]
impl PaymentGateway for CoreApiGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id, gross_amount = request.gross_amount))]
    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeResponse, GatewayError> {
        let url = format!("{}/v2/charge", self.base_url);
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.server_key, Some(""))
            .json(&Self::charge_body(&request))
            .send()
            .await;
        log_slow_call("gateway.charge", started.elapsed(), SLOW_CALL_THRESHOLD);

        let charge: ChargeResponse = Self::read_body(response?).await?;
        if let Err(err) = ensure_accepted(&charge.status_code, &charge.status_message) {
            warn!(status_code = %charge.status_code, message = %charge.status_message, "Charge rejected");
            return Err(err);
        }

        debug!(transaction_id = %charge.transaction_id, "Charge created");
        Ok(charge)
    }

    #[instrument(skip(self))]
    async fn check_status(&self, order_id: String) -> Result<TransactionStatus, GatewayError> {
        let url = format!("{}/v2/{}/status", self.base_url, order_id);
        let started = Instant::now();

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.server_key, Some(""))
            .send()
            .await;
        log_slow_call("gateway.status", started.elapsed(), SLOW_CALL_THRESHOLD);

        let status: TransactionStatus = Self::read_body(response?).await?;
        if let Err(err) = ensure_status_found(&status.status_code, &status.status_message) {
            warn!(status_code = %status.status_code, message = %status.status_message, "Status check rejected");
            return Err(err);
        }
        Ok(status)
    }
}

/// Checks `signature_key` against sha512(order_id + status_code + gross_amount + server_key).
pub fn verify_notification_signature(payload: &Map<String, Value>, server_key: &str) -> bool {
    let field = |name: &str| payload.get(name).and_then(Value::as_str);

    let (Some(order_id), Some(status_code), Some(gross_amount), Some(signature)) = (
        field("order_id"),
        field("status_code"),
        field("gross_amount"),
        field("signature_key"),
    ) else {
        return false;
    };

    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    let expected = hex::encode(hasher.finalize());

    constant_time_eq(expected.as_bytes(), signature.to_ascii_lowercase().as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ChargeItem, CustomerDetails, PaymentMethod};
    use assert_matches::assert_matches;
    use rstest::rstest;
    use wiremock::matchers::{basic_auth, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(server: &MockServer) -> CoreApiGateway {
        CoreApiGateway::new(&GatewayConfig {
            base_url: server.uri(),
            server_key: "SB-Mid-server-test".into(),
            ..Default::default()
        })
        .unwrap()
    }

    fn charge_request() -> ChargeRequest {
        ChargeRequest {
            order_id: "ORD-7-1700000000".into(),
            payment_method: PaymentMethod::Gopay,
            gross_amount: 20000,
            items: vec![ChargeItem {
                id: "3".into(),
                price: 10000,
                quantity: 2,
                name: "Kopi Susu".into(),
            }],
            customer: CustomerDetails {
                first_name: "Ayu".into(),
                email: None,
            },
        }
    }

    #[tokio::test]
    async fn charge_posts_gopay_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/charge"))
            .and(basic_auth("SB-Mid-server-test", ""))
            .and(body_partial_json(json!({
                "payment_type": "gopay",
                "transaction_details": {"order_id": "ORD-7-1700000000", "gross_amount": 20000},
                "item_details": [{"id": "3", "price": 10000, "quantity": 2, "name": "Kopi Susu"}],
                "customer_details": {"first_name": "Ayu"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": "201",
                "status_message": "GoPay transaction is created",
                "transaction_id": "e48447d1-cfa9-4b02-b163-2e915d4417ac",
                "order_id": "ORD-7-1700000000",
                "transaction_status": "pending",
                "actions": [
                    {"name": "generate-qr-code", "method": "GET", "url": "https://qr.example/q"},
                    {"name": "deeplink-redirect", "method": "GET", "url": "gojek://gopay/x"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let charge = gateway_for(&server)
            .create_charge(charge_request())
            .await
            .unwrap();
        assert_eq!(charge.transaction_status, "pending");
        assert_eq!(charge.action_url("generate-qr-code").as_deref(), Some("https://qr.example/q"));
    }

    #[tokio::test]
    async fn body_status_code_rejects_charge() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/charge"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": "406",
                "status_message": "The request could not be completed due to a conflict",
            })))
            .mount(&server)
            .await;

        let err = gateway_for(&server)
            .create_charge(charge_request())
            .await
            .unwrap_err();
        assert_matches!(err, GatewayError::Rejected { status_code, .. } if status_code == "406");
    }

    #[tokio::test]
    async fn status_check_reads_transaction_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/ORD-7-1700000000/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": "200",
                "status_message": "Success, transaction found",
                "order_id": "ORD-7-1700000000",
                "transaction_status": "settlement",
                "gross_amount": "20000.00"
            })))
            .mount(&server)
            .await;

        let status = gateway_for(&server)
            .check_status("ORD-7-1700000000".into())
            .await
            .unwrap();
        assert_eq!(status.transaction_status, "settlement");
        assert_eq!(status.fraud_status, "");
    }

    #[rstest]
    #[case("201", "pending")]
    #[case("202", "deny")]
    #[case("407", "expire")]
    #[tokio::test]
    async fn status_check_accepts_codes_describing_the_transaction(
        #[case] status_code: &str,
        #[case] transaction_status: &str,
    ) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/ORD-7-1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": status_code,
                "status_message": "Success, transaction is found",
                "order_id": "ORD-7-1",
                "transaction_status": transaction_status,
            })))
            .mount(&server)
            .await;

        let status = gateway_for(&server)
            .check_status("ORD-7-1".into())
            .await
            .unwrap();
        assert_eq!(status.status_code, status_code);
        assert_eq!(status.transaction_status, transaction_status);
    }

    #[tokio::test]
    async fn unknown_order_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": "404",
                "status_message": "Transaction doesn't exist.",
            })))
            .mount(&server)
            .await;

        let err = gateway_for(&server)
            .check_status("ORD-9-9".into())
            .await
            .unwrap_err();
        assert_matches!(err, GatewayError::Rejected { status_code, .. } if status_code == "404");
    }

    #[tokio::test]
    async fn http_errors_surface_as_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = gateway_for(&server)
            .check_status("ORD-1-1".into())
            .await
            .unwrap_err();
        assert_matches!(err, GatewayError::Rejected { status_code, .. } if status_code == "500");
    }

    fn signed_payload(server_key: &str) -> Map<String, Value> {
        let mut hasher = Sha512::new();
        hasher.update(format!("ORD-1-1200{}{}", "20000.00", server_key));
        let signature = hex::encode(hasher.finalize());

        let Value::Object(map) = json!({
            "order_id": "ORD-1-1",
            "status_code": "200",
            "gross_amount": "20000.00",
            "signature_key": signature,
        }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn signature_matches_only_with_the_right_key() {
        let payload = signed_payload("server-key");
        assert!(verify_notification_signature(&payload, "server-key"));
        assert!(!verify_notification_signature(&payload, "other-key"));
    }

    #[test]
    fn signature_requires_all_fields() {
        let mut payload = signed_payload("server-key");
        payload.remove("gross_amount");
        assert!(!verify_notification_signature(&payload, "server-key"));
    }
}
