use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, DisputeError};
use crate::ledger::models::{Dispute, DisputeResolution, TicketStatus};
use crate::ledger::store::SettlementStore;
use crate::processor::PaymentProcessor;

/// Buyer-raised disputes against delivered orders, and their resolution.
///
/// Resolution updates dispute and order in one ledger transaction - that is
/// the durable record of intent. The processor capture/refund happens after
/// the commit; if it fails, the disagreement is logged for reconciliation
/// and retried out-of-band, never rolled back.
pub struct DisputeService {
    store: Arc<dyn SettlementStore>,
    processor: Arc<dyn PaymentProcessor>,
    hold_window: Duration,
}

impl DisputeService {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        processor: Arc<dyn PaymentProcessor>,
        hold_window: Duration,
    ) -> Self {
        Self {
            store,
            processor,
            hold_window,
        }
    }

    pub async fn open_dispute(
        &self,
        order_id: Uuid,
        raiser_id: Uuid,
        message: &str,
    ) -> AppResult<Dispute> {
        self.open_dispute_at(order_id, raiser_id, message, Utc::now())
            .await
    }

    /// Window check against an explicit clock, for tests.
    pub async fn open_dispute_at(
        &self,
        order_id: Uuid,
        raiser_id: Uuid,
        message: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Dispute> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(DisputeError::OrderNotFound(order_id))?;

        let ticket = self
            .store
            .get_ticket(order.ticket_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("ticket {}", order.ticket_id)))?;
        if ticket.status != TicketStatus::Sold {
            return Err(DisputeError::NotDelivered.into());
        }

        let event = self
            .store
            .get_event(ticket.event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("event {}", ticket.event_id)))?;

        // Disputes close once the escrow window after the event has passed.
        if now >= event.starts_at + self.hold_window {
            return Err(DisputeError::WindowExpired.into());
        }

        let dispute = self.store.create_dispute(order_id, raiser_id, message).await?;
        info!(dispute_id = %dispute.id, order_id = %order_id, "dispute opened");
        Ok(dispute)
    }

    pub async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        action: &str,
        seller_response: &str,
    ) -> AppResult<()> {
        let resolution = DisputeResolution::parse(action)
            .ok_or_else(|| DisputeError::InvalidAction(action.to_string()))?;

        let dispute = self
            .store
            .get_dispute(dispute_id)
            .await?
            .ok_or(DisputeError::NotFound(dispute_id))?;

        let order = self
            .store
            .get_order(dispute.order_id)
            .await?
            .ok_or(DisputeError::OrderNotFound(dispute.order_id))?;

        // One transaction: dispute resolution and order transition commit
        // together or not at all.
        self.store
            .resolve_dispute(dispute_id, order.id, resolution, seller_response)
            .await?;
        info!(dispute_id = %dispute_id, order_id = %order.id, ?resolution, "dispute resolved");

        let Some(payment_ref) = order.external_payment_ref.as_deref() else {
            warn!(order_id = %order.id, "no payment ref on order, skipping processor call");
            return Ok(());
        };

        let processor_result = match resolution {
            DisputeResolution::Capture => self.processor.capture_payment(payment_ref).await,
            DisputeResolution::Refund => self.processor.refund_payment(payment_ref).await,
        };

        if let Err(e) = processor_result {
            // Ledger and processor now disagree. The ledger is the durable
            // record of intent; flag for reconciliation instead of failing
            // the seller's action.
            error!(
                order_id = %order.id,
                dispute_id = %dispute_id,
                ?resolution,
                error = %e,
                "reconciliation required: processor call failed after ledger commit"
            );
        }

        Ok(())
    }
}
