use crate::handlers::common::success_response;
use crate::{
    errors::ServiceError,
    gateway::verify_notification_signature,
    services::commerce::NotificationOutcome,
    AppState,
};
use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde_json::{json, Value};
use tracing::warn;

/// Gateway notification endpoint. Unauthenticated: the payload is only used
/// to learn which order to re-check with the gateway.
pub fn payment_webhook_routes() -> Router<AppState> {
    Router::new().route("/payments/notification", post(payment_notification))
}

// POST /api/v1/payments/notification
pub async fn payment_notification(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ServiceError> {
    let Value::Object(payload) = payload else {
        return Err(ServiceError::MalformedPayload(
            "expected a JSON object".to_string(),
        ));
    };

    let gateway = &state.config.gateway;
    if gateway.verify_notification_signature
        && !verify_notification_signature(&payload, &gateway.server_key)
    {
        warn!("Payment notification signature verification failed");
        return Err(ServiceError::Unauthorized(
            "invalid notification signature".to_string(),
        ));
    }

    let outcome = state
        .services
        .reconciliation
        .handle_notification(&payload)
        .await?;

    let body = match outcome {
        NotificationOutcome::Applied(status) => json!({
            "result": "applied",
            "status": status.map(|s| s.to_string()).unwrap_or_default(),
        }),
        NotificationOutcome::Skipped => json!({ "result": "skipped" }),
    };
    Ok(success_response(body))
}
