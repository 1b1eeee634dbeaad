use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use super::{CartLock, CommerceStores};
use crate::{
    auth::AuthUser,
    entities::commerce::{CartStatus, PaymentStatus, ProductModel, TransactionModel},
    errors::ServiceError,
    gateway::{ChargeItem, ChargeRequest, CustomerDetails, PaymentGateway, PaymentMethod},
    locks::LockManager,
    repositories::{CartFilter, CartPatch, NewPaymentRecord, NewTransaction, TransactionFilter},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutInput {
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
}

/// Cart line id and the unit price it was charged at.
type PricedLine = (i32, i64);

/// `quantity × price`, or `None` when it does not fit an `i64`.
pub(crate) fn line_total(quantity: i32, price: i64) -> Option<i64> {
    i64::from(quantity).checked_mul(price)
}

/// Turns a user's open cart into a transaction with a pending gateway charge.
///
/// Steps run fail-fast without compensation: a gateway failure after the
/// transaction row exists leaves that row orphaned, and a charge response
/// missing payment data fails after the charge was created. Concurrent
/// checkouts of the same user are refused with `Conflict`.
#[derive(Clone)]
pub struct CheckoutService {
    stores: CommerceStores,
    gateway: Arc<dyn PaymentGateway>,
    cart_lock: CartLock,
    order_id_prefix: String,
}

impl CheckoutService {
    pub fn new(
        stores: CommerceStores,
        gateway: Arc<dyn PaymentGateway>,
        locks: Arc<dyn LockManager>,
        order_id_prefix: impl Into<String>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            stores,
            gateway,
            cart_lock: CartLock::new(locks, lock_ttl),
            order_id_prefix: order_id_prefix.into(),
        }
    }

    #[instrument(skip(self, caller, input), fields(user_id = caller.user_id))]
    pub async fn checkout(
        &self,
        caller: &AuthUser,
        input: CheckoutInput,
    ) -> Result<TransactionModel, ServiceError> {
        let (transaction, priced) = self
            .cart_lock
            .run(caller.user_id, || self.checkout_locked(caller, input))
            .await?;
        self.freeze_prices(&priced).await;

        info!(
            transaction_id = transaction.id,
            total_price = transaction.total_price,
            "Checkout completed"
        );
        Ok(transaction)
    }

    async fn checkout_locked(
        &self,
        caller: &AuthUser,
        input: CheckoutInput,
    ) -> Result<(TransactionModel, Vec<PricedLine>), ServiceError> {
        let open = CartFilter::open_for_user(caller.user_id);
        let carts = self.stores.carts.get_list(open.clone()).await?;
        if carts.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let product_ids = carts.iter().map(|c| c.product_id).collect();
        let products: HashMap<i32, ProductModel> = self
            .stores
            .products
            .get_list_by_ids(product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut items = Vec::with_capacity(carts.len());
        let mut priced = Vec::with_capacity(carts.len());
        let mut total: i64 = 0;
        for cart in &carts {
            let product = products
                .get(&cart.product_id)
                .ok_or_else(|| ServiceError::NotFound(format!("product {}", cart.product_id)))?;
            total = line_total(cart.quantity, product.price)
                .and_then(|line| total.checked_add(line))
                .ok_or_else(|| {
                    ServiceError::ValidationError("cart total is out of range".to_string())
                })?;
            priced.push((cart.id, product.price));
            items.push(ChargeItem {
                id: cart.id.to_string(),
                price: product.price,
                quantity: cart.quantity,
                name: product.name.clone(),
            });
        }

        let transaction = self
            .stores
            .transactions
            .create(NewTransaction {
                user_id: caller.user_id,
                address_ship: input.shipping_address,
                total_price: total,
            })
            .await?;

        let order_id = format!(
            "{}-{}-{}",
            self.order_id_prefix,
            transaction.id,
            Utc::now().timestamp()
        );
        let charge = self
            .gateway
            .create_charge(ChargeRequest {
                order_id: order_id.clone(),
                payment_method: input.payment_method,
                gross_amount: total,
                items,
                customer: CustomerDetails {
                    first_name: caller.name.clone(),
                    email: None,
                },
            })
            .await
            .map_err(|e| {
                error!(transaction_id = transaction.id, error = %e, "Charge creation failed");
                e
            })?;

        let payment_data = input.payment_method.extract_payment_data(&charge)?;
        let payment_data = serde_json::to_string(&payment_data)?;

        self.stores
            .carts
            .update(
                open,
                CartPatch {
                    status: Some(CartStatus::Unpaid),
                    transaction_id: Some(transaction.id),
                    ..Default::default()
                },
            )
            .await?;

        self.stores
            .payments
            .create(NewPaymentRecord {
                transaction_id: transaction.id,
                gateway_transaction_id: charge.transaction_id,
                order_id,
                payment_type: input.payment_method.code(),
                status: PaymentStatus::Pending,
                payment_data,
            })
            .await?;

        Ok((transaction, priced))
    }

    /// Price snapshots are informational; a failed write is only logged.
    async fn freeze_prices(&self, priced: &[PricedLine]) {
        for &(cart_id, price) in priced {
            let result = self
                .stores
                .carts
                .update(
                    CartFilter {
                        id: Some(cart_id),
                        ..Default::default()
                    },
                    CartPatch {
                        final_price_per_item: Some(price),
                        ..Default::default()
                    },
                )
                .await;
            if let Err(e) = result {
                warn!(cart_id, error = %e, "Failed to freeze cart line price");
            }
        }
    }

    /// Checks that `transaction_id` exists and belongs to `caller`.
    #[instrument(skip(self, caller), fields(user_id = caller.user_id))]
    pub async fn validate_transaction(
        &self,
        transaction_id: i32,
        caller: &AuthUser,
    ) -> Result<(), ServiceError> {
        if transaction_id == 0 {
            return Err(ServiceError::MissingTransactionId);
        }

        let transaction = self
            .stores
            .transactions
            .get(TransactionFilter::by_id(transaction_id))
            .await?;

        if transaction.user_id != caller.user_id {
            return Err(ServiceError::Unauthorized(format!(
                "transaction {transaction_id} belongs to another user"
            )));
        }
        Ok(())
    }
}
