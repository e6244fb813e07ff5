//! In-memory `SettlementStore` used by unit tests. Mirrors the conditional
//! write semantics of the Postgres repository, including the one-open-
//! dispute constraint and the atomic dispute/order resolution.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use super::models::*;
use super::store::SettlementStore;
use crate::error::{AppResult, DisputeError};

#[derive(Default)]
struct Inner {
    tickets: HashMap<Uuid, Ticket>,
    orders: HashMap<Uuid, Order>,
    disputes: HashMap<Uuid, Dispute>,
    profiles: HashMap<Uuid, Profile>,
    events: HashMap<Uuid, EventRecord>,
}

#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<Inner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_ticket(&self, ticket: Ticket) {
        self.inner.lock().tickets.insert(ticket.id, ticket);
    }

    pub fn insert_order(&self, order: Order) {
        self.inner.lock().orders.insert(order.id, order);
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.inner.lock().profiles.insert(profile.id, profile);
    }

    pub fn insert_event(&self, event: EventRecord) {
        self.inner.lock().events.insert(event.id, event);
    }

    pub fn order(&self, order_id: Uuid) -> Option<Order> {
        self.inner.lock().orders.get(&order_id).cloned()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.inner.lock().orders.values().cloned().collect()
    }

    pub fn ticket(&self, ticket_id: Uuid) -> Option<Ticket> {
        self.inner.lock().tickets.get(&ticket_id).cloned()
    }

    pub fn dispute(&self, dispute_id: Uuid) -> Option<Dispute> {
        self.inner.lock().disputes.get(&dispute_id).cloned()
    }
}

#[async_trait]
impl SettlementStore for MemoryLedger {
    async fn get_ticket(&self, ticket_id: Uuid) -> AppResult<Option<Ticket>> {
        Ok(self.inner.lock().tickets.get(&ticket_id).cloned())
    }

    async fn get_order(&self, order_id: Uuid) -> AppResult<Option<Order>> {
        Ok(self.inner.lock().orders.get(&order_id).cloned())
    }

    async fn find_order_by_session(&self, session_id: &str) -> AppResult<Option<Order>> {
        Ok(self
            .inner
            .lock()
            .orders
            .values()
            .find(|o| o.external_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn get_profile(&self, profile_id: Uuid) -> AppResult<Option<Profile>> {
        Ok(self.inner.lock().profiles.get(&profile_id).cloned())
    }

    async fn get_event(&self, event_id: Uuid) -> AppResult<Option<EventRecord>> {
        Ok(self.inner.lock().events.get(&event_id).cloned())
    }

    async fn get_dispute(&self, dispute_id: Uuid) -> AppResult<Option<Dispute>> {
        Ok(self.inner.lock().disputes.get(&dispute_id).cloned())
    }

    async fn create_order(
        &self,
        ticket_id: Uuid,
        buyer_id: Uuid,
        seller_id: Uuid,
        amount_minor: i64,
        currency: &str,
    ) -> AppResult<Order> {
        let order = Order {
            id: Uuid::new_v4(),
            ticket_id,
            buyer_id,
            seller_id,
            amount_minor,
            currency: currency.to_string(),
            external_session_id: None,
            external_payment_ref: None,
            external_charge_ref: None,
            status: OrderStatus::Pending,
            transfer_ref: None,
            transfer_status: None,
            disputed_at: None,
            created_at: Utc::now(),
            released_at: None,
        };
        self.inner.lock().orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn attach_session(&self, order_id: Uuid, session_id: &str) -> AppResult<bool> {
        let mut inner = self.inner.lock();
        match inner.orders.get_mut(&order_id) {
            Some(o) if o.status == OrderStatus::Pending && o.external_session_id.is_none() => {
                o.external_session_id = Some(session_id.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_order_failed(&self, order_id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.lock();
        match inner.orders.get_mut(&order_id) {
            Some(o) if o.status == OrderStatus::Pending => {
                o.status = OrderStatus::Failed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_order(
        &self,
        order_id: Uuid,
        payment_ref: &str,
        charge_ref: Option<&str>,
    ) -> AppResult<bool> {
        let mut inner = self.inner.lock();
        match inner.orders.get_mut(&order_id) {
            Some(o) if o.status == OrderStatus::Pending => {
                o.status = OrderStatus::Complete;
                o.external_payment_ref = Some(payment_ref.to_string());
                if let Some(charge) = charge_ref {
                    o.external_charge_ref = Some(charge.to_string());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_ticket_sold(&self, ticket_id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.lock();
        match inner.tickets.get_mut(&ticket_id) {
            Some(t) if t.status == TicketStatus::Available => {
                t.status = TicketStatus::Sold;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn eligible_orders(&self, cutoff: Option<DateTime<Utc>>) -> AppResult<Vec<Order>> {
        let inner = self.inner.lock();
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| {
                matches!(o.status, OrderStatus::Complete | OrderStatus::Released)
                    && o.transfer_ref.is_none()
                    && o.external_payment_ref.is_some()
                    && cutoff.map_or(true, |c| o.created_at < c)
            })
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn record_release(
        &self,
        order_id: Uuid,
        transfer_ref: &str,
        released_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut inner = self.inner.lock();
        match inner.orders.get_mut(&order_id) {
            Some(o)
                if o.transfer_ref.is_none()
                    && matches!(o.status, OrderStatus::Complete | OrderStatus::Released) =>
            {
                o.transfer_ref = Some(transfer_ref.to_string());
                o.transfer_status = Some(TransferStatus::Paid);
                o.released_at = Some(released_at);
                o.status = OrderStatus::Released;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_transfer_failure(&self, order_id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.lock();
        match inner.orders.get_mut(&order_id) {
            Some(o) if o.transfer_ref.is_none() => {
                o.transfer_status = Some(TransferStatus::Failed);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_dispute(
        &self,
        order_id: Uuid,
        raised_by: Uuid,
        message: &str,
    ) -> AppResult<Dispute> {
        let mut inner = self.inner.lock();
        let already_open = inner
            .disputes
            .values()
            .any(|d| d.order_id == order_id && d.status == DisputeStatus::Pending);
        if already_open {
            return Err(DisputeError::AlreadyOpen.into());
        }

        let dispute = Dispute {
            id: Uuid::new_v4(),
            order_id,
            raised_by,
            message: message.to_string(),
            seller_response: None,
            status: DisputeStatus::Pending,
            resolution: None,
            created_at: Utc::now(),
        };
        inner.disputes.insert(dispute.id, dispute.clone());
        if let Some(o) = inner.orders.get_mut(&order_id) {
            if o.disputed_at.is_none() {
                o.disputed_at = Some(Utc::now());
            }
        }
        Ok(dispute)
    }

    async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        order_id: Uuid,
        resolution: DisputeResolution,
        seller_response: &str,
    ) -> AppResult<()> {
        // Single lock scope: both records change or neither does, matching
        // the repository's transaction.
        let mut inner = self.inner.lock();

        match inner.disputes.get(&dispute_id) {
            Some(d) if d.status == DisputeStatus::Pending => {}
            Some(_) => return Err(DisputeError::AlreadyResolved.into()),
            None => return Err(DisputeError::NotFound(dispute_id).into()),
        }

        let dispute = inner.disputes.get_mut(&dispute_id).expect("checked above");
        dispute.status = DisputeStatus::Resolved;
        dispute.resolution = Some(resolution);
        dispute.seller_response = Some(seller_response.to_string());

        if let Some(o) = inner.orders.get_mut(&order_id) {
            if matches!(o.status, OrderStatus::Complete | OrderStatus::Released) {
                match resolution {
                    DisputeResolution::Capture => {
                        o.status = OrderStatus::Released;
                        o.released_at.get_or_insert_with(Utc::now);
                    }
                    DisputeResolution::Refund => o.status = OrderStatus::Refunded,
                }
            }
        }

        Ok(())
    }
}
