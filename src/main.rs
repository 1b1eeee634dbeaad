use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

use storefront_api as api;
use api::{
    auth::{AuthConfig, AuthService},
    cache::{BestEffortCache, CacheFactory},
    gateway::CoreApiGateway,
    locks::LockFactory,
    repositories::{
        CachedProductRepository, DbCartRepository, DbPaymentRecordRepository,
        DbProductRepository, DbTransactionRepository,
    },
    services::commerce::CommerceStores,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init Redis client (construction only; cache and locks fall back when unreachable)
    let redis_client = Arc::new(
        redis::Client::open(cfg.redis_url.clone()).context("invalid redis url")?,
    );

    // Product reads go through the best-effort cache
    let cache_backend = CacheFactory::create(&cfg.cache, redis_client.clone()).await;
    let products = Arc::new(CachedProductRepository::new(
        Arc::new(DbProductRepository::new(db_arc.clone())),
        BestEffortCache::new(cache_backend, cfg.cache.ttl()),
        &cfg.cache.key_prefix,
    ));

    let stores = CommerceStores {
        carts: Arc::new(DbCartRepository::new(db_arc.clone())),
        products,
        transactions: Arc::new(DbTransactionRepository::new(db_arc.clone())),
        payments: Arc::new(DbPaymentRecordRepository::new(db_arc.clone())),
    };

    if cfg.gateway.server_key.is_empty() {
        warn!("Payment gateway server key is empty; charges will be rejected");
    }
    let gateway = Arc::new(
        CoreApiGateway::new(&cfg.gateway).context("failed to build payment gateway client")?,
    );
    let locks = LockFactory::create(&cfg.locks, redis_client.clone(), &cfg.cache.key_prefix);

    let auth_service = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
    let services = api::handlers::AppServices::new(stores, gateway, locks, &cfg);

    // Compose shared app state
    let app_state = api::AppState {
        db: db_arc.clone(),
        config: cfg.clone(),
        services,
        auth: auth_service,
    };
    let app = api::build_router(app_state);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    info!("storefront-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("storefront-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
