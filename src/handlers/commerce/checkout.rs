use crate::handlers::common::{created_response, success_response, validate_input};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    gateway::PaymentMethod,
    repositories::PaymentRecordFilter,
    services::commerce::CheckoutInput,
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

/// Creates the router for checkout endpoints; callers must be authenticated
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/transaction", post(create_transaction))
        .route(
            "/transaction/:transaction_id/payment-detail",
            get(get_payment_detail),
        )
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateTransactionRequest {
    #[validate(length(min = 1, max = 500))]
    pub address_ship: String,
    /// Payment method code
    pub payment_id: i32,
}

/// Check out the caller's cart
async fn create_transaction(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(payload): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let payment_method = PaymentMethod::from_code(payload.payment_id)?;

    let transaction = state
        .services
        .checkout
        .checkout(
            &caller,
            CheckoutInput {
                shipping_address: payload.address_ship,
                payment_method,
            },
        )
        .await?;

    info!(transaction_id = transaction.id, "Transaction created");
    Ok(created_response(transaction))
}

/// Payment instructions for one of the caller's transactions
async fn get_payment_detail(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(transaction_id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .checkout
        .validate_transaction(transaction_id, &caller)
        .await?;

    let detail = state
        .services
        .reconciliation
        .get_payment_detail(PaymentRecordFilter::by_transaction(transaction_id))
        .await?;

    Ok(success_response(detail))
}
