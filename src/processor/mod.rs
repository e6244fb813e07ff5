pub mod stripe;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProcessorError;

/// Everything the engine asks of a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub order_id: Uuid,
    pub ticket_id: Uuid,
    pub event_id: Uuid,
    pub buyer_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub product_name: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// The processor's authoritative record of a captured payment: gross
/// amount, processor fee and net, all in minor units. Settlement math runs
/// on these, never on the originally requested amount.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChargeResult {
    pub gross: i64,
    pub fee: i64,
    pub net: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    pub id: String,
    pub status: String,
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// Boundary to the external payment processor.
///
/// Injected into every component so tests can script transient failures
/// and observe idempotency-key behavior.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Creates a hosted checkout session; the order/ticket ids travel as
    /// opaque metadata for webhook correlation.
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> ProcessorResult<CheckoutSession>;

    /// Resolves the charge behind a payment reference, if one exists yet.
    async fn latest_charge(&self, payment_ref: &str) -> ProcessorResult<Option<String>>;

    /// Definitive gross/fee/net for a settled charge.
    async fn charge_result(&self, charge_ref: &str) -> ProcessorResult<ChargeResult>;

    /// Moves funds to the seller's payout destination. `idempotency_key`
    /// must make a retried call have effect at most once.
    async fn create_transfer(
        &self,
        destination: &str,
        amount_minor: i64,
        currency: &str,
        idempotency_key: &str,
    ) -> ProcessorResult<TransferResult>;

    /// Finalizes a held authorization; a no-op when already captured.
    async fn capture_payment(&self, payment_ref: &str) -> ProcessorResult<()>;

    /// Reverses the captured amount back to the buyer.
    async fn refund_payment(&self, payment_ref: &str) -> ProcessorResult<()>;
}
