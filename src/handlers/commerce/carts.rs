use crate::handlers::common::{no_content_response, success_response, validate_input};
use crate::{auth::AuthUser, errors::ServiceError, AppState};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{delete, get},
    Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Creates the router for cart endpoints; callers must be authenticated
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(list_cart).post(add_to_cart))
        .route("/cart/:cart_id", delete(remove_cart_item))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct AddToCartRequest {
    #[validate(range(min = 1))]
    pub product_id: i32,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: i32,
}

/// Add a product to the caller's cart
async fn add_to_cart(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(payload): Json<AddToCartRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let line = state
        .services
        .cart
        .add_item(&caller, payload.product_id, payload.quantity)
        .await?;

    Ok(success_response(line))
}

/// List the caller's open cart lines with current prices
async fn list_cart(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let lines = state.services.cart.list_items(&caller).await?;
    Ok(success_response(lines))
}

/// Remove one of the caller's open cart lines
async fn remove_cart_item(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(cart_id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.cart.remove_item(&caller, cart_id).await?;
    Ok(no_content_response())
}
