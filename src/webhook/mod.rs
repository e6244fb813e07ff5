pub mod signature;

use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AppResult, WebhookError};
use crate::ledger::store::SettlementStore;
use crate::processor::PaymentProcessor;

/// Event classes that mean "the buyer's payment settled".
const COMPLETED_EVENTS: &[&str] = &[
    "checkout.session.completed",
    "checkout.session.async_payment_succeeded",
];

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: EventData,
}

#[derive(Debug, Default, Deserialize)]
struct EventData {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
    #[serde(rename = "paymentRef")]
    payment_ref: Option<String>,
    #[serde(rename = "chargeRef")]
    charge_ref: Option<String>,
}

/// Ingests asynchronous processor events and advances order/ticket state
/// exactly once per logical event.
///
/// Idempotency comes from conditional state transitions, not event-id
/// bookkeeping: `pending -> complete` and `available -> sold` are guarded by
/// the current state, so duplicate or out-of-order redelivery is a no-op.
pub struct WebhookIngester {
    store: Arc<dyn SettlementStore>,
    processor: Arc<dyn PaymentProcessor>,
    signing_secret: String,
}

impl WebhookIngester {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        processor: Arc<dyn PaymentProcessor>,
        signing_secret: String,
    ) -> Self {
        Self {
            store,
            processor,
            signing_secret,
        }
    }

    /// Verifies and applies one raw webhook delivery. Only signature and
    /// parse failures are errors; everything else (unknown session, unknown
    /// event class, duplicate delivery) completes as a benign no-op.
    pub async fn handle_event(&self, raw: &[u8], signature_header: Option<&str>) -> AppResult<()> {
        let header = signature_header.ok_or(WebhookError::MissingSignature)?;

        // Verify over the exact raw bytes, before any parsing.
        signature::verify_signature(
            raw,
            header,
            &self.signing_secret,
            chrono::Utc::now().timestamp(),
            signature::DEFAULT_TOLERANCE_SECS,
        )?;

        let envelope: EventEnvelope = serde_json::from_slice(raw)
            .map_err(|e| WebhookError::Malformed(e.to_string()))?;

        if !COMPLETED_EVENTS.contains(&envelope.kind.as_str()) {
            info!(kind = %envelope.kind, "ignoring webhook event class");
            return Ok(());
        }

        self.apply_completed(envelope.data).await
    }

    async fn apply_completed(&self, data: EventData) -> AppResult<()> {
        let Some(session_id) = data.session_id else {
            warn!("payment-completed event without session id, dropping");
            return Ok(());
        };

        let Some(order) = self.store.find_order_by_session(&session_id).await? else {
            warn!(session_id = %session_id, "no order for webhook session, dropping");
            return Ok(());
        };

        let Some(payment_ref) = data.payment_ref else {
            warn!(order_id = %order.id, "payment-completed event without payment ref, dropping");
            return Ok(());
        };

        // The charge id may be absent from the event; fall back to the
        // processor's record of the payment.
        let charge_ref = match data.charge_ref {
            Some(charge) => Some(charge),
            None => match self.processor.latest_charge(&payment_ref).await {
                Ok(charge) => charge,
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "charge lookup failed");
                    None
                }
            },
        };

        let completed = self
            .store
            .complete_order(order.id, &payment_ref, charge_ref.as_deref())
            .await?;
        if completed {
            info!(order_id = %order.id, "order completed");
        } else {
            info!(order_id = %order.id, "order already complete, duplicate delivery");
        }

        // Guarded independently: safe to attempt on every redelivery.
        let sold = self.store.mark_ticket_sold(order.ticket_id).await?;
        if sold {
            info!(ticket_id = %order.ticket_id, "ticket marked sold");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::ledger::memory::MemoryLedger;
    use crate::ledger::models::*;
    use crate::processor::mock::MockProcessor;
    use chrono::Utc;
    use hmac::{Hmac, Mac};
    use rust_decimal_macros::dec;
    use sha2::Sha256;
    use uuid::Uuid;

    const SECRET: &str = "whsec_test_secret";

    fn signed_header(payload: &[u8]) -> String {
        let timestamp = Utc::now().timestamp();
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn seed_pending_order(store: &MemoryLedger, session_id: &str) -> (Uuid, Uuid) {
        let ticket_id = Uuid::new_v4();
        store.insert_ticket(Ticket {
            id: ticket_id,
            event_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            price: dec!(10.00),
            status: TicketStatus::Available,
            proof_reference: None,
            buyer_scope: BuyerScope::Public,
            created_at: Utc::now(),
        });
        let order_id = Uuid::new_v4();
        store.insert_order(Order {
            id: order_id,
            ticket_id,
            buyer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            amount_minor: 1000,
            currency: "gbp".to_string(),
            external_session_id: Some(session_id.to_string()),
            external_payment_ref: None,
            external_charge_ref: None,
            status: OrderStatus::Pending,
            transfer_ref: None,
            transfer_status: None,
            disputed_at: None,
            created_at: Utc::now(),
            released_at: None,
        });
        (order_id, ticket_id)
    }

    fn ingester(
        store: Arc<MemoryLedger>,
        processor: Arc<MockProcessor>,
    ) -> WebhookIngester {
        WebhookIngester::new(store, processor, SECRET.to_string())
    }

    #[tokio::test]
    async fn duplicate_delivery_applies_once() {
        let store = Arc::new(MemoryLedger::new());
        let processor = Arc::new(MockProcessor::new());
        let (order_id, ticket_id) = seed_pending_order(&store, "cs_123");

        let payload = serde_json::json!({
            "type": "checkout.session.completed",
            "data": { "sessionId": "cs_123", "paymentRef": "pi_123", "chargeRef": "ch_123" }
        });
        let raw = serde_json::to_vec(&payload).unwrap();
        let header = signed_header(&raw);

        let ing = ingester(store.clone(), processor);
        ing.handle_event(&raw, Some(&header)).await.unwrap();
        // Second delivery of the same logical event
        ing.handle_event(&raw, Some(&header)).await.unwrap();

        let order = store.order(order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Complete);
        assert_eq!(order.external_payment_ref.as_deref(), Some("pi_123"));
        assert_eq!(order.external_charge_ref.as_deref(), Some("ch_123"));
        assert_eq!(store.ticket(ticket_id).unwrap().status, TicketStatus::Sold);
    }

    #[tokio::test]
    async fn missing_charge_ref_is_resolved_from_processor() {
        let store = Arc::new(MemoryLedger::new());
        let processor = Arc::new(MockProcessor::new());
        processor.set_latest_charge("pi_456", "ch_456");
        let (order_id, _) = seed_pending_order(&store, "cs_456");

        let payload = serde_json::json!({
            "type": "checkout.session.completed",
            "data": { "sessionId": "cs_456", "paymentRef": "pi_456" }
        });
        let raw = serde_json::to_vec(&payload).unwrap();
        let header = signed_header(&raw);

        ingester(store.clone(), processor)
            .handle_event(&raw, Some(&header))
            .await
            .unwrap();

        let order = store.order(order_id).unwrap();
        assert_eq!(order.external_charge_ref.as_deref(), Some("ch_456"));
    }

    #[tokio::test]
    async fn unknown_session_is_dropped() {
        let store = Arc::new(MemoryLedger::new());
        let processor = Arc::new(MockProcessor::new());

        let payload = serde_json::json!({
            "type": "checkout.session.completed",
            "data": { "sessionId": "cs_unknown", "paymentRef": "pi_1" }
        });
        let raw = serde_json::to_vec(&payload).unwrap();
        let header = signed_header(&raw);

        // Acknowledged, not an error
        assert!(ingester(store, processor)
            .handle_event(&raw, Some(&header))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn other_event_classes_are_ignored() {
        let store = Arc::new(MemoryLedger::new());
        let processor = Arc::new(MockProcessor::new());
        let (order_id, _) = seed_pending_order(&store, "cs_789");

        let payload = serde_json::json!({
            "type": "payment_intent.created",
            "data": { "sessionId": "cs_789", "paymentRef": "pi_789" }
        });
        let raw = serde_json::to_vec(&payload).unwrap();
        let header = signed_header(&raw);

        ingester(store.clone(), processor)
            .handle_event(&raw, Some(&header))
            .await
            .unwrap();
        assert_eq!(store.order(order_id).unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_without_state_change() {
        let store = Arc::new(MemoryLedger::new());
        let processor = Arc::new(MockProcessor::new());
        let (order_id, _) = seed_pending_order(&store, "cs_bad");

        let payload = serde_json::json!({
            "type": "checkout.session.completed",
            "data": { "sessionId": "cs_bad", "paymentRef": "pi_bad" }
        });
        let raw = serde_json::to_vec(&payload).unwrap();

        let ing = ingester(store.clone(), processor);
        let err = ing.handle_event(&raw, Some("t=1,v1=deadbeef")).await;
        assert!(matches!(err, Err(AppError::Webhook(_))));
        let err = ing.handle_event(&raw, None).await;
        assert!(matches!(
            err,
            Err(AppError::Webhook(WebhookError::MissingSignature))
        ));

        assert_eq!(store.order(order_id).unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let store = Arc::new(MemoryLedger::new());
        let processor = Arc::new(MockProcessor::new());

        let raw = b"not json at all";
        let header = signed_header(raw);

        let err = ingester(store, processor).handle_event(raw, Some(&header)).await;
        assert!(matches!(
            err,
            Err(AppError::Webhook(WebhookError::Malformed(_)))
        ));
    }
}
