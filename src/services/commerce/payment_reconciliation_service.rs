//! Applies asynchronous gateway notifications to payment records and carts.
//!
//! A notification is never trusted on its own: only its `order_id` is read,
//! and the authoritative status is fetched back from the gateway before
//! anything is written.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use super::CommerceStores;
use crate::{
    config::UnmappedStatusPolicy,
    entities::commerce::{CartStatus, PaymentData, PaymentStatus},
    errors::ServiceError,
    gateway::PaymentGateway,
    locks::LockManager,
    repositories::{CartFilter, CartPatch, PaymentRecordFilter},
};

/// Maps a gateway (transaction_status, fraud_status) pair onto a domain
/// status. `None` means the pair has no domain meaning.
pub fn map_gateway_status(transaction_status: &str, fraud_status: &str) -> Option<PaymentStatus> {
    match (transaction_status, fraud_status) {
        ("capture", "challenge") => Some(PaymentStatus::Challange),
        ("capture", "accept") => Some(PaymentStatus::Success),
        ("settlement", _) => Some(PaymentStatus::Success),
        ("deny", _) => Some(PaymentStatus::Deny),
        ("cancel" | "expire", _) => Some(PaymentStatus::Failure),
        ("pending", _) => Some(PaymentStatus::Pending),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// The record status was written; `None` records an unmapped status as "".
    Applied(Option<PaymentStatus>),
    /// The record was left untouched.
    Skipped,
}

/// Payment instructions for a transaction as shown to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentDetail {
    pub status: String,
    pub order_id: String,
    pub payment_data: PaymentData,
}

#[derive(Debug, Clone)]
pub struct ReconciliationSettings {
    pub unmapped_status: UnmappedStatusPolicy,
    pub guard_terminal_status: bool,
    pub lock_ttl: Duration,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            unmapped_status: UnmappedStatusPolicy::Record,
            guard_terminal_status: true,
            lock_ttl: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct PaymentReconciliationService {
    stores: CommerceStores,
    gateway: Arc<dyn PaymentGateway>,
    locks: Arc<dyn LockManager>,
    settings: ReconciliationSettings,
}

impl PaymentReconciliationService {
    pub fn new(
        stores: CommerceStores,
        gateway: Arc<dyn PaymentGateway>,
        locks: Arc<dyn LockManager>,
        settings: ReconciliationSettings,
    ) -> Self {
        Self {
            stores,
            gateway,
            locks,
            settings,
        }
    }

    #[instrument(skip(self, payload))]
    pub async fn handle_notification(
        &self,
        payload: &Map<String, Value>,
    ) -> Result<NotificationOutcome, ServiceError> {
        let order_id = payload
            .get("order_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServiceError::MalformedPayload("order_id is required".to_string()))?;

        let lock_key = format!("webhook:order:{order_id}");
        let lock = self
            .locks
            .try_acquire(&lock_key, self.settings.lock_ttl)
            .await?
            .ok_or_else(|| {
                ServiceError::Conflict(format!("notification for {order_id} is being processed"))
            })?;

        let result = self.reconcile(order_id).await;

        if let Err(e) = self.locks.release(&lock).await {
            warn!(error = %e, key = %lock_key, "Failed to release notification lock");
        }
        result
    }

    async fn reconcile(&self, order_id: &str) -> Result<NotificationOutcome, ServiceError> {
        let status = self.gateway.check_status(order_id.to_string()).await?;
        let confirmed_order_id = if status.order_id.is_empty() {
            order_id.to_string()
        } else {
            status.order_id.clone()
        };

        let record = self
            .stores
            .payments
            .get(PaymentRecordFilter::by_order(confirmed_order_id.as_str()))
            .await?;

        let mapped = map_gateway_status(&status.transaction_status, &status.fraud_status);

        if mapped.is_none() && self.settings.unmapped_status == UnmappedStatusPolicy::Ignore {
            info!(
                order_id = %confirmed_order_id,
                transaction_status = %status.transaction_status,
                fraud_status = %status.fraud_status,
                "Ignoring unmapped gateway status"
            );
            return Ok(NotificationOutcome::Skipped);
        }

        let current = record.payment_status();
        if self.settings.guard_terminal_status
            && current.is_some_and(PaymentStatus::is_terminal)
            && current != mapped
        {
            warn!(
                order_id = %confirmed_order_id,
                current = %record.status,
                reported = %status.transaction_status,
                "Refusing to move payment out of a terminal status"
            );
            return Ok(NotificationOutcome::Skipped);
        }

        let new_status = mapped.map(|s| s.to_string()).unwrap_or_default();
        self.stores
            .payments
            .update_status(
                PaymentRecordFilter::by_order(confirmed_order_id.as_str()),
                new_status,
            )
            .await?;

        if mapped == Some(PaymentStatus::Success) {
            let paid = self
                .stores
                .carts
                .update(
                    CartFilter {
                        transaction_id: Some(record.transaction_id),
                        status: Some(CartStatus::Unpaid),
                        ..Default::default()
                    },
                    CartPatch {
                        status: Some(CartStatus::Paid),
                        ..Default::default()
                    },
                )
                .await?;
            info!(transaction_id = record.transaction_id, lines = paid, "Cart lines marked paid");
        }

        info!(order_id = %confirmed_order_id, status = ?mapped, "Payment status reconciled");
        Ok(NotificationOutcome::Applied(mapped))
    }

    #[instrument(skip(self))]
    pub async fn get_payment_detail(
        &self,
        filter: PaymentRecordFilter,
    ) -> Result<PaymentDetail, ServiceError> {
        let record = self.stores.payments.get(filter).await?;
        let payment_data: PaymentData = serde_json::from_str(&record.payment_data)?;

        Ok(PaymentDetail {
            status: record.status,
            order_id: record.order_id,
            payment_data,
        })
    }
}
