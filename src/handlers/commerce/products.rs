use crate::handlers::common::success_response;
use crate::{
    errors::ServiceError,
    repositories::ProductFilter,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;

/// Creates the router for catalog endpoints
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:product_id", get(get_product))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub category_id: Option<i32>,
}

/// List products, optionally restricted to one category
async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state
        .services
        .products
        .get_list(ProductFilter {
            category_id: query.category_id,
            ..Default::default()
        })
        .await?;

    Ok(success_response(products))
}

/// Get a single product
async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state
        .services
        .products
        .get(ProductFilter::by_id(product_id))
        .await?;

    Ok(success_response(product))
}
