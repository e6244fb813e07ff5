use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::*;
use crate::error::AppResult;

/// The set of ledger operations the settlement engine performs.
///
/// Every mutation is compare-and-set style: the implementation checks the
/// expected prior state and reports `false` (or skips) when the precondition
/// no longer holds. Callers treat a lost race as benign, never as an error.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    // ---- reads ----

    async fn get_ticket(&self, ticket_id: Uuid) -> AppResult<Option<Ticket>>;

    async fn get_order(&self, order_id: Uuid) -> AppResult<Option<Order>>;

    async fn find_order_by_session(&self, session_id: &str) -> AppResult<Option<Order>>;

    async fn get_profile(&self, profile_id: Uuid) -> AppResult<Option<Profile>>;

    async fn get_event(&self, event_id: Uuid) -> AppResult<Option<EventRecord>>;

    async fn get_dispute(&self, dispute_id: Uuid) -> AppResult<Option<Dispute>>;

    // ---- checkout ----

    async fn create_order(
        &self,
        ticket_id: Uuid,
        buyer_id: Uuid,
        seller_id: Uuid,
        amount_minor: i64,
        currency: &str,
    ) -> AppResult<Order>;

    /// Persist the processor session id on a still-pending order.
    async fn attach_session(&self, order_id: Uuid, session_id: &str) -> AppResult<bool>;

    /// Pending -> failed, for checkouts whose session never materialized.
    async fn mark_order_failed(&self, order_id: Uuid) -> AppResult<bool>;

    // ---- webhook ----

    /// Pending -> complete, recording the processor payment/charge refs.
    /// Returns false if the order is no longer pending (duplicate delivery).
    async fn complete_order(
        &self,
        order_id: Uuid,
        payment_ref: &str,
        charge_ref: Option<&str>,
    ) -> AppResult<bool>;

    /// Available -> sold. Returns false if already sold (duplicate delivery).
    async fn mark_ticket_sold(&self, ticket_id: Uuid) -> AppResult<bool>;

    // ---- settlement ----

    /// Orders eligible for payout: complete (or released via dispute
    /// capture), never transferred, payment ref recorded, and - unless the
    /// cutoff is bypassed - created before `cutoff`.
    async fn eligible_orders(&self, cutoff: Option<DateTime<Utc>>) -> AppResult<Vec<Order>>;

    /// The release write: sets transfer_ref/transfer_status/released_at and
    /// moves the order to released, guarded by `transfer_ref IS NULL`.
    /// Returns false when a concurrent run got there first.
    async fn record_release(
        &self,
        order_id: Uuid,
        transfer_ref: &str,
        released_at: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Marks the payout attempt failed; the order stays eligible for the
    /// next run.
    async fn record_transfer_failure(&self, order_id: Uuid) -> AppResult<bool>;

    // ---- disputes ----

    /// Creates a pending dispute and stamps `disputed_at` on the order.
    /// Fails with DisputeError::AlreadyOpen if an open dispute exists.
    async fn create_dispute(
        &self,
        order_id: Uuid,
        raised_by: Uuid,
        message: &str,
    ) -> AppResult<Dispute>;

    /// Atomically resolves the dispute and moves the order, in one
    /// transaction: Dispute{resolved, resolution, seller_response} plus
    /// Order.status = released (capture) or refunded (refund). Fails with
    /// DisputeError::AlreadyResolved when the dispute is no longer pending.
    async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        order_id: Uuid,
        resolution: DisputeResolution,
        seller_response: &str,
    ) -> AppResult<()>;
}
