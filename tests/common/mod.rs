#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::{json, Value};
use storefront_api::{
    auth::{AuthConfig, AuthService},
    cache::{BestEffortCache, InMemoryCache},
    config::AppConfig,
    db,
    entities::commerce::{product, CartModel, PaymentRecordModel, ProductModel},
    gateway::CoreApiGateway,
    handlers::AppServices,
    locks::InMemoryLockManager,
    repositories::{
        CachedProductRepository, CartFilter, CartRepository, DbCartRepository,
        DbPaymentRecordRepository, DbProductRepository, DbTransactionRepository,
        PaymentRecordFilter, PaymentRecordRepository,
    },
    services::commerce::CommerceStores,
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const USER_ID: i32 = 7;
pub const OTHER_USER_ID: i32 = 8;
pub const SERVER_KEY: &str = "SB-Mid-server-test";

/// Helper harness for spinning up the application against a throwaway SQLite
/// database and a mocked payment gateway.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: MockServer,
    token: String,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Construct a test application, letting the caller adjust configuration first.
    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let db_dir = TempDir::new().expect("temp dir for test database");
        let db_path = db_dir.path().join("storefront_test.db");
        let gateway = MockServer::start().await;

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "redis://127.0.0.1:6379".to_string(),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.gateway.base_url = gateway.uri();
        cfg.gateway.server_key = SERVER_KEY.to_string();
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let products = Arc::new(CachedProductRepository::new(
            Arc::new(DbProductRepository::new(db_arc.clone())),
            BestEffortCache::new(Arc::new(InMemoryCache::new()), cfg.cache.ttl()),
            &cfg.cache.key_prefix,
        ));
        let stores = CommerceStores {
            carts: Arc::new(DbCartRepository::new(db_arc.clone())),
            products,
            transactions: Arc::new(DbTransactionRepository::new(db_arc.clone())),
            payments: Arc::new(DbPaymentRecordRepository::new(db_arc.clone())),
        };

        let gateway_client =
            Arc::new(CoreApiGateway::new(&cfg.gateway).expect("gateway client for tests"));
        let services = AppServices::new(
            stores,
            gateway_client,
            Arc::new(InMemoryLockManager::new()),
            &cfg,
        );

        let auth_service = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
        let token = auth_service
            .generate_token(USER_ID, "Ayu")
            .expect("encode access token");

        let state = AppState {
            db: db_arc,
            config: cfg,
            services,
            auth: auth_service,
        };

        Self {
            router: storefront_api::build_router(state.clone()),
            state,
            gateway,
            token,
            _db_dir: db_dir,
        }
    }

    /// Bearer token for the default user.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn token_for(&self, user_id: i32, name: &str) -> String {
        self.state
            .auth
            .generate_token(user_id, name)
            .expect("encode access token")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Convenience helper for authenticated JSON requests.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(method, uri, body, Some(self.token())).await
    }

    pub async fn seed_product(&self, name: &str, price: i64) -> ProductModel {
        product::ActiveModel {
            category_id: Set(1),
            name: Set(name.to_string()),
            description: Set(format!("{name} seeded for integration tests")),
            price: Set(price),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product for tests")
    }

    pub async fn cart_lines(&self, user_id: i32) -> Vec<CartModel> {
        DbCartRepository::new(self.state.db.clone())
            .get_list(CartFilter {
                user_id: Some(user_id),
                ..Default::default()
            })
            .await
            .expect("load cart lines")
    }

    pub async fn payment_record(&self, transaction_id: i32) -> PaymentRecordModel {
        DbPaymentRecordRepository::new(self.state.db.clone())
            .get(PaymentRecordFilter::by_transaction(transaction_id))
            .await
            .expect("load payment record")
    }

    /// Gateway answers every charge with a pending Gopay charge.
    pub async fn mock_gopay_charge(&self) {
        Mock::given(method("POST"))
            .and(path("/v2/charge"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": "201",
                "status_message": "GoPay transaction is created",
                "transaction_id": "e48447d1-cfa9-4b02-b163-2e915d4417ac",
                "transaction_status": "pending",
                "actions": [
                    {"name": "generate-qr-code", "method": "GET", "url": "https://qr.example/qr-code"},
                    {"name": "deeplink-redirect", "method": "GET", "url": "gojek://gopay/merchanttransfer?tref=1"}
                ]
            })))
            .mount(&self.gateway)
            .await;
    }

    /// Gateway reports `transaction_status` for `order_id` exactly once, with
    /// the body status code the real gateway pairs with it.
    pub async fn mock_status_once(&self, order_id: &str, transaction_status: &str) {
        let status_code = match transaction_status {
            "pending" => "201",
            "deny" => "202",
            "expire" => "407",
            _ => "200",
        };
        Mock::given(method("GET"))
            .and(path(format!("/v2/{order_id}/status")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": status_code,
                "status_message": "Success, transaction found",
                "order_id": order_id,
                "transaction_status": transaction_status,
                "fraud_status": "accept",
                "gross_amount": "20000.00"
            })))
            .up_to_n_times(1)
            .mount(&self.gateway)
            .await;
    }

    /// Adds `quantity` of `product_id` to the default user's cart and checks
    /// out, returning the transaction id and the gateway order id.
    pub async fn checkout(&self, product_id: i32, quantity: i32) -> (i32, String) {
        let added = self
            .request_authenticated(
                Method::POST,
                "/api/v1/cart",
                Some(json!({"product_id": product_id, "quantity": quantity})),
            )
            .await;
        assert_eq!(added.status(), 200);

        let created = self
            .request_authenticated(
                Method::POST,
                "/api/v1/transaction",
                Some(json!({"address_ship": "X", "payment_id": 1})),
            )
            .await;
        assert_eq!(created.status(), 201);

        let body = response_json(created).await;
        let transaction_id = body["data"]["id"].as_i64().expect("transaction id") as i32;
        let order_id = self.payment_record(transaction_id).await.order_id;
        (transaction_id, order_id)
    }

    pub async fn gateway_calls(&self, http_method: &str, path_suffix: &str) -> usize {
        self.gateway
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == http_method && r.url.path().ends_with(path_suffix))
            .count()
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
