//! Storefront API Library
//!
//! Catalog browsing, shopping cart, checkout through an external payment
//! gateway, and reconciliation of the gateway's payment notifications.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod gateway;
pub mod handlers;
pub mod locks;
pub mod middleware_helpers;
pub mod migrator;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::auth::{AuthRouterExt, AuthService};
use crate::tracing::{error, info, warn};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
}

// Common response wrappers
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Versioned API: catalog and gateway notifications are public, cart and
/// checkout require a bearer token.
pub fn api_v1_routes() -> Router<AppState> {
    let public = Router::new()
        .merge(handlers::commerce::products_routes())
        .merge(handlers::commerce::payment_webhook_routes());

    let protected = Router::new()
        .merge(handlers::commerce::carts_routes())
        .merge(handlers::commerce::checkout_routes())
        .with_auth();

    public.merge(protected)
}

/// Full application router with the cross-cutting layers applied.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let request_timeout = state.config.request_timeout();

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        // Inject AuthService into request extensions for auth middleware
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            inject_auth_service,
        ))
        // Ensure every request carries a request id for traceability
        .layer(middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

async fn inject_auth_service(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(auth);
    next.run(request).await
}

fn cors_layer(config: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect()
        })
        .unwrap_or_default();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if config.is_development() {
        info!("Using permissive CORS in development environment");
        CorsLayer::permissive()
    } else {
        warn!("No CORS origins configured; cross-origin requests will be rejected");
        CorsLayer::new()
    }
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match db::check_connection(&state.db).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}
