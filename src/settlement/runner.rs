use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::payout::{compute_payout, FeePolicy};
use crate::error::AppResult;
use crate::ledger::models::Order;
use crate::ledger::store::SettlementStore;
use crate::processor::PaymentProcessor;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReleaseOptions {
    /// Compute outcomes but never call the mutating transfer API and never
    /// write transfer_ref.
    pub dry_run: bool,
    /// Operational backfill: bypass the hold-window cutoff.
    pub ignore_cutoff: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Transfer created and the release write landed
    Released,
    /// Dry run: this is what a real run would pay
    WouldPay,
    /// Seller has not finished payout onboarding; retried next run
    WaitingSellerOnboarding,
    /// Computed payout was zero or negative; no transfer attempted
    ZeroPayout,
    /// No charge recorded for the payment yet; retried next run
    ChargeUnavailable,
    /// Processor transfer call failed; retried next run
    TransferFailed,
    /// A concurrent run released this order first
    LostRace,
    /// Unexpected per-order failure, isolated from the rest of the batch
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderOutcome {
    pub order: Uuid,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "transferRef")]
    pub transfer_ref: Option<String>,
}

impl OrderOutcome {
    fn bare(order: Uuid, status: OutcomeStatus) -> Self {
        Self {
            order,
            status,
            payout: None,
            transfer_ref: None,
        }
    }
}

/// The batch job that turns escrowed payments into seller payouts.
///
/// This is the only component that ever creates a transfer. Overlapping
/// runs are safe: the transfer idempotency key is derived from the order id
/// and the release write is guarded by `transfer_ref IS NULL`.
pub struct SettlementRunner {
    store: Arc<dyn SettlementStore>,
    processor: Arc<dyn PaymentProcessor>,
    policy: FeePolicy,
    hold_window: Duration,
}

impl SettlementRunner {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        processor: Arc<dyn PaymentProcessor>,
        policy: FeePolicy,
        hold_window: Duration,
    ) -> Self {
        Self {
            store,
            processor,
            policy,
            hold_window,
        }
    }

    /// Processes every order whose hold window has elapsed. A single
    /// order's failure never aborts the batch; the returned list covers
    /// every attempted order.
    pub async fn release_due(
        &self,
        now: DateTime<Utc>,
        options: ReleaseOptions,
    ) -> AppResult<Vec<OrderOutcome>> {
        let cutoff = if options.ignore_cutoff {
            None
        } else {
            Some(now - self.hold_window)
        };

        let due = self.store.eligible_orders(cutoff).await?;
        info!(count = due.len(), dry_run = options.dry_run, "settlement run starting");

        let mut outcomes = Vec::with_capacity(due.len());
        for order in due {
            let order_id = order.id;
            let outcome = match self.process_order(order, now, options.dry_run).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(order_id = %order_id, error = %e, "settlement failed for order");
                    OrderOutcome::bare(order_id, OutcomeStatus::Error)
                }
            };
            outcomes.push(outcome);
        }

        info!(processed = outcomes.len(), "settlement run finished");
        Ok(outcomes)
    }

    async fn process_order(
        &self,
        order: Order,
        now: DateTime<Utc>,
        dry_run: bool,
    ) -> AppResult<OrderOutcome> {
        let seller = self.store.get_profile(order.seller_id).await?;
        let Some(destination) = seller.and_then(|p| p.payout_account) else {
            info!(order_id = %order.id, seller_id = %order.seller_id, "seller not onboarded yet");
            return Ok(OrderOutcome::bare(
                order.id,
                OutcomeStatus::WaitingSellerOnboarding,
            ));
        };

        let Some(charge_ref) = self.charge_ref_for(&order).await? else {
            warn!(order_id = %order.id, "no charge recorded for payment yet");
            return Ok(OrderOutcome::bare(order.id, OutcomeStatus::ChargeUnavailable));
        };

        // Definitive amounts from the processor's balance transaction; the
        // captured gross can differ from what checkout requested.
        let charge = match self.processor.charge_result(&charge_ref).await {
            Ok(charge) => charge,
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "charge lookup failed");
                return Ok(OrderOutcome::bare(order.id, OutcomeStatus::ChargeUnavailable));
            }
        };

        let payout = compute_payout(&charge, &self.policy);
        if payout <= 0 {
            warn!(order_id = %order.id, payout, "non-positive payout, skipping");
            return Ok(OrderOutcome::bare(order.id, OutcomeStatus::ZeroPayout));
        }

        if dry_run {
            return Ok(OrderOutcome {
                order: order.id,
                status: OutcomeStatus::WouldPay,
                payout: Some(payout),
                transfer_ref: None,
            });
        }

        let transfer = match self
            .processor
            .create_transfer(
                &destination,
                payout,
                &order.currency,
                &order.transfer_idempotency_key(),
            )
            .await
        {
            Ok(transfer) => transfer,
            Err(e) => {
                error!(order_id = %order.id, error = %e, "transfer creation failed");
                self.store.record_transfer_failure(order.id).await?;
                return Ok(OrderOutcome::bare(order.id, OutcomeStatus::TransferFailed));
            }
        };

        if self.store.record_release(order.id, &transfer.id, now).await? {
            info!(order_id = %order.id, transfer_ref = %transfer.id, payout, "order released");
            Ok(OrderOutcome {
                order: order.id,
                status: OutcomeStatus::Released,
                payout: Some(payout),
                transfer_ref: Some(transfer.id),
            })
        } else {
            // A concurrent run won; the idempotency key made our transfer
            // call a replay, so nothing was paid twice.
            warn!(order_id = %order.id, "release write lost the race");
            Ok(OrderOutcome::bare(order.id, OutcomeStatus::LostRace))
        }
    }

    async fn charge_ref_for(&self, order: &Order) -> AppResult<Option<String>> {
        if let Some(charge) = &order.external_charge_ref {
            return Ok(Some(charge.clone()));
        }
        let Some(payment_ref) = &order.external_payment_ref else {
            return Ok(None);
        };
        match self.processor.latest_charge(payment_ref).await {
            Ok(charge) => Ok(charge),
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "latest charge lookup failed");
                Ok(None)
            }
        }
    }
}
