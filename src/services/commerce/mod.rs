/// Commerce services module - cart, checkout and payment reconciliation
pub mod cart_service;
pub mod checkout_service;
pub mod payment_reconciliation_service;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::errors::ServiceError;
use crate::locks::LockManager;
use crate::repositories::{
    CartRepository, PaymentRecordRepository, ProductRepository, TransactionRepository,
};

// Re-export services for convenience
pub use cart_service::{CartLine, CartService};
pub use checkout_service::{CheckoutInput, CheckoutService};
pub use payment_reconciliation_service::{
    map_gateway_status, NotificationOutcome, PaymentDetail, PaymentReconciliationService,
};

/// Store handles shared by the commerce services.
#[derive(Clone)]
pub struct CommerceStores {
    pub carts: Arc<dyn CartRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub payments: Arc<dyn PaymentRecordRepository>,
}

/// Per-user advisory lock shared by checkout and cart edits, so the lines a
/// checkout priced are the lines it moves to `unpaid`.
#[derive(Clone)]
pub struct CartLock {
    locks: Arc<dyn LockManager>,
    ttl: Duration,
}

impl CartLock {
    pub fn new(locks: Arc<dyn LockManager>, ttl: Duration) -> Self {
        Self { locks, ttl }
    }

    pub fn key(user_id: i32) -> String {
        format!("checkout:user:{user_id}")
    }

    /// Runs `op` while holding the caller's lock. A held lock fails fast with
    /// `Conflict`; the lock is released whatever `op` returns.
    pub async fn run<T, F, Fut>(&self, user_id: i32, op: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let key = Self::key(user_id);
        let token = self.locks.try_acquire(&key, self.ttl).await?.ok_or_else(|| {
            ServiceError::Conflict("a checkout for this cart is in progress".to_string())
        })?;

        let result = op().await;

        if let Err(e) = self.locks.release(&token).await {
            warn!(error = %e, key = %key, "Failed to release cart lock");
        }
        result
    }
}
