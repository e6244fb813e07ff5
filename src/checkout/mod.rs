use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{AppResult, CheckoutError};
use crate::ledger::models::{BuyerScope, TicketStatus};
use crate::ledger::store::SettlementStore;
use crate::processor::{CheckoutSessionRequest, PaymentProcessor};

/// Starts a purchase: validates the ticket, creates a pending order,
/// requests a hosted payment session and hands back the redirect URL.
///
/// The ticket itself is never touched here - it stays `available` until the
/// payment webhook confirms money actually moved.
pub struct CheckoutService {
    store: Arc<dyn SettlementStore>,
    processor: Arc<dyn PaymentProcessor>,
    currency: String,
    app_url: String,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        processor: Arc<dyn PaymentProcessor>,
        currency: String,
        app_url: String,
    ) -> Self {
        Self {
            store,
            processor,
            currency,
            app_url,
        }
    }

    pub async fn start_checkout(&self, ticket_id: Uuid, buyer_id: Uuid) -> AppResult<String> {
        let ticket = self
            .store
            .get_ticket(ticket_id)
            .await?
            .ok_or(CheckoutError::TicketNotFound(ticket_id))?;

        match ticket.status {
            TicketStatus::Available => {}
            TicketStatus::Sold => return Err(CheckoutError::TicketSold.into()),
            TicketStatus::Cancelled => {
                return Err(CheckoutError::TicketUnavailable("cancelled".to_string()).into())
            }
        }

        if ticket.buyer_scope == BuyerScope::SameInstitution {
            self.check_same_institution(buyer_id, ticket.seller_id)
                .await?;
        }

        let amount_minor = ticket.amount_minor();
        if amount_minor <= 0 {
            return Err(
                CheckoutError::TicketUnavailable("non-positive price".to_string()).into(),
            );
        }

        // The pending order is durable before the processor is involved, so
        // a session can always be correlated back to a ledger row.
        let order = self
            .store
            .create_order(ticket_id, buyer_id, ticket.seller_id, amount_minor, &self.currency)
            .await?;

        let request = CheckoutSessionRequest {
            order_id: order.id,
            ticket_id,
            event_id: ticket.event_id,
            buyer_id,
            amount_minor,
            currency: self.currency.clone(),
            product_name: format!("Ticket for event {}", ticket.event_id),
            success_url: format!(
                "{}/orders/success?session_id={{CHECKOUT_SESSION_ID}}",
                self.app_url
            ),
            cancel_url: format!("{}/cancel", self.app_url),
        };

        let session = match self.processor.create_checkout_session(&request).await {
            Ok(session) => session,
            Err(e) => {
                error!(order_id = %order.id, error = %e, "checkout session creation failed");
                self.abandon(order.id).await;
                return Err(CheckoutError::SessionFailed(e.to_string()).into());
            }
        };

        // The order must never reference a session that was not recorded.
        if !self.store.attach_session(order.id, &session.id).await? {
            error!(order_id = %order.id, session_id = %session.id, "could not record session id");
            self.abandon(order.id).await;
            return Err(
                CheckoutError::SessionFailed("session id was not recorded".to_string()).into(),
            );
        }

        info!(order_id = %order.id, session_id = %session.id, "checkout session created");
        Ok(session.url)
    }

    async fn check_same_institution(&self, buyer_id: Uuid, seller_id: Uuid) -> AppResult<()> {
        let buyer = self
            .store
            .get_profile(buyer_id)
            .await?
            .ok_or(CheckoutError::BuyerNotFound(buyer_id))?;
        let seller = self.store.get_profile(seller_id).await?;

        let same = match (&buyer.institution, seller.and_then(|s| s.institution)) {
            (Some(b), Some(s)) => *b == s,
            _ => false,
        };
        if !same {
            return Err(CheckoutError::NotEligible.into());
        }
        Ok(())
    }

    /// Best-effort: a half-created checkout is marked failed so the
    /// settlement predicates never see it.
    async fn abandon(&self, order_id: Uuid) {
        if let Err(e) = self.store.mark_order_failed(order_id).await {
            error!(order_id = %order_id, error = %e, "failed to mark abandoned order");
        }
    }
}
