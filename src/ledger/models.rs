use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use uuid::Uuid;

/// Order status enum
///
/// Orders only ever move forward along
/// pending -> complete -> {released | refunded}; `failed` is terminal for
/// checkouts that never saw money move. A dispute is an overlay
/// (`disputed_at` on the order), not a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Complete,
    Released,
    Refunded,
    Failed,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Complete => "complete",
            OrderStatus::Released => "released",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl OrderStatus {
    /// Valid transitions:
    /// - Pending -> Complete, Failed
    /// - Complete -> Released, Refunded
    /// - Released -> Refunded (dispute refund after early release)
    /// - Terminal states (Refunded, Failed) -> NO TRANSITIONS ALLOWED
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        matches!(
            (self, to),
            (OrderStatus::Pending, OrderStatus::Complete)
                | (OrderStatus::Pending, OrderStatus::Failed)
                | (OrderStatus::Complete, OrderStatus::Released)
                | (OrderStatus::Complete, OrderStatus::Refunded)
                | (OrderStatus::Released, OrderStatus::Refunded)
        )
    }
}

/// Transfer status for the seller payout leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "transfer_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Paid,
    Failed,
}

/// Ticket status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "ticket_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Available,
    Sold,
    Cancelled,
}

/// Who may buy a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "buyer_scope", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BuyerScope {
    Public,
    SameInstitution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "dispute_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DisputeStatus {
    Pending,
    Resolved,
}

/// How a resolved dispute ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "dispute_resolution", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DisputeResolution {
    Capture,
    Refund,
}

impl DisputeResolution {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "capture" => Some(DisputeResolution::Capture),
            "refund" => Some(DisputeResolution::Refund),
            _ => None,
        }
    }
}

/// Order entity - one purchase attempt/outcome
///
/// INVARIANT: transfer_ref is set at most once; once set, no further
/// transfer may be created for this order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    /// Amount in the smallest currency unit, always > 0
    pub amount_minor: i64,
    pub currency: String,
    pub external_session_id: Option<String>,
    pub external_payment_ref: Option<String>,
    pub external_charge_ref: Option<String>,
    pub status: OrderStatus,
    pub transfer_ref: Option<String>,
    pub transfer_status: Option<TransferStatus>,
    pub disputed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_disputed(&self) -> bool {
        self.disputed_at.is_some()
    }

    /// Idempotency key for the payout transfer, derived from the order id
    /// so a retried settlement run can never double-transfer.
    pub fn transfer_idempotency_key(&self) -> String {
        format!("transfer_order_{}", self.id)
    }
}

/// Ticket entity - a resalable admission right
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub seller_id: Uuid,
    pub price: Decimal,
    pub status: TicketStatus,
    pub proof_reference: Option<String>,
    pub buyer_scope: BuyerScope,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// Amount the buyer is charged, in minor units.
    pub fn amount_minor(&self) -> i64 {
        use rust_decimal::prelude::ToPrimitive;
        (self.price * Decimal::from(100))
            .round()
            .to_i64()
            .unwrap_or(0)
    }
}

/// Dispute entity - a buyer's claim against a delivered order
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Dispute {
    pub id: Uuid,
    pub order_id: Uuid,
    pub raised_by: Uuid,
    pub message: String,
    pub seller_response: Option<String>,
    pub status: DisputeStatus,
    pub resolution: Option<DisputeResolution>,
    pub created_at: DateTime<Utc>,
}

/// Seller/buyer profile - owned by the identity collaborator, the
/// settlement engine only reads institution and payout_account.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub institution: Option<String>,
    /// Processor account id capable of receiving transfers; None until the
    /// seller completes payout onboarding.
    pub payout_account: Option<String>,
}

/// Event record - only the fields the engine reads
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventRecord {
    pub id: Uuid,
    pub starts_at: DateTime<Utc>,
}
