pub mod commerce;
pub mod common;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    gateway::PaymentGateway,
    locks::LockManager,
    repositories::ProductRepository,
    services::commerce::{
        payment_reconciliation_service::ReconciliationSettings, CartLock, CartService,
        CheckoutService,
        CommerceStores, PaymentReconciliationService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub products: Arc<dyn ProductRepository>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub reconciliation: Arc<PaymentReconciliationService>,
}

impl AppServices {
    pub fn new(
        stores: CommerceStores,
        gateway: Arc<dyn PaymentGateway>,
        locks: Arc<dyn LockManager>,
        config: &AppConfig,
    ) -> Self {
        let cart = Arc::new(CartService::new(
            stores.carts.clone(),
            stores.products.clone(),
            CartLock::new(locks.clone(), config.locks.ttl()),
        ));
        let checkout = Arc::new(CheckoutService::new(
            stores.clone(),
            gateway.clone(),
            locks.clone(),
            config.gateway.order_id_prefix.clone(),
            config.locks.ttl(),
        ));
        let reconciliation = Arc::new(PaymentReconciliationService::new(
            stores.clone(),
            gateway,
            locks,
            ReconciliationSettings {
                unmapped_status: config.webhook.unmapped_status,
                guard_terminal_status: config.webhook.guard_terminal_status,
                lock_ttl: config.locks.ttl(),
            },
        ));

        Self {
            products: stores.products,
            cart,
            checkout,
            reconciliation,
        }
    }
}
