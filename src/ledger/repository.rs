use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::*;
use super::store::SettlementStore;
use crate::error::{AppError, AppResult, DisputeError};

const ORDER_COLUMNS: &str = "id, ticket_id, buyer_id, seller_id, amount_minor, currency, \
     external_session_id, external_payment_ref, external_charge_ref, status, \
     transfer_ref, transfer_status, disputed_at, created_at, released_at";

/// Ledger repository - THE source of truth for all settlement state
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[async_trait]
impl SettlementStore for LedgerRepository {
    async fn get_ticket(&self, ticket_id: Uuid) -> AppResult<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT id, event_id, seller_id, price, status, proof_reference, buyer_scope, created_at
            FROM tickets
            WHERE id = $1
            "#,
        )
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ticket)
    }

    async fn get_order(&self, order_id: Uuid) -> AppResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn find_order_by_session(&self, session_id: &str) -> AppResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE external_session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn get_profile(&self, profile_id: Uuid) -> AppResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT id, institution, payout_account FROM profiles WHERE id = $1",
        )
        .bind(profile_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn get_event(&self, event_id: Uuid) -> AppResult<Option<EventRecord>> {
        let event =
            sqlx::query_as::<_, EventRecord>("SELECT id, starts_at FROM events WHERE id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(event)
    }

    async fn get_dispute(&self, dispute_id: Uuid) -> AppResult<Option<Dispute>> {
        let dispute = sqlx::query_as::<_, Dispute>(
            r#"
            SELECT id, order_id, raised_by, message, seller_response, status, resolution, created_at
            FROM disputes
            WHERE id = $1
            "#,
        )
        .bind(dispute_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(dispute)
    }

    async fn create_order(
        &self,
        ticket_id: Uuid,
        buyer_id: Uuid,
        seller_id: Uuid,
        amount_minor: i64,
        currency: &str,
    ) -> AppResult<Order> {
        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            INSERT INTO orders (ticket_id, buyer_id, seller_id, amount_minor, currency, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(ticket_id)
        .bind(buyer_id)
        .bind(seller_id)
        .bind(amount_minor)
        .bind(currency)
        .fetch_one(&self.pool)
        .await?;

        Ok(order)
    }

    async fn attach_session(&self, order_id: Uuid, session_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET external_session_id = $2
            WHERE id = $1 AND status = 'pending' AND external_session_id IS NULL
            "#,
        )
        .bind(order_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_order_failed(&self, order_id: Uuid) -> AppResult<bool> {
        let result =
            sqlx::query("UPDATE orders SET status = 'failed' WHERE id = $1 AND status = 'pending'")
                .bind(order_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete_order(
        &self,
        order_id: Uuid,
        payment_ref: &str,
        charge_ref: Option<&str>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'complete',
                external_payment_ref = $2,
                external_charge_ref = COALESCE($3, external_charge_ref)
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(order_id)
        .bind(payment_ref)
        .bind(charge_ref)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_ticket_sold(&self, ticket_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE tickets SET status = 'sold' WHERE id = $1 AND status = 'available'",
        )
        .bind(ticket_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn eligible_orders(&self, cutoff: Option<DateTime<Utc>>) -> AppResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE status IN ('complete', 'released')
              AND transfer_ref IS NULL
              AND external_payment_ref IS NOT NULL
              AND ($1::timestamptz IS NULL OR created_at < $1)
            ORDER BY created_at
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn record_release(
        &self,
        order_id: Uuid,
        transfer_ref: &str,
        released_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        // transfer_ref IS NULL is the idempotency boundary: the write that
        // loses the race affects zero rows and the caller skips.
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET transfer_ref = $2,
                transfer_status = 'paid',
                released_at = $3,
                status = 'released'
            WHERE id = $1
              AND transfer_ref IS NULL
              AND status IN ('complete', 'released')
            "#,
        )
        .bind(order_id)
        .bind(transfer_ref)
        .bind(released_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_transfer_failure(&self, order_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE orders SET transfer_status = 'failed' WHERE id = $1 AND transfer_ref IS NULL",
        )
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_dispute(
        &self,
        order_id: Uuid,
        raised_by: Uuid,
        message: &str,
    ) -> AppResult<Dispute> {
        let mut tx = self.pool.begin().await?;

        let dispute = sqlx::query_as::<_, Dispute>(
            r#"
            INSERT INTO disputes (order_id, raised_by, message, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING id, order_id, raised_by, message, seller_response, status, resolution, created_at
            "#,
        )
        .bind(order_id)
        .bind(raised_by)
        .bind(message)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Dispute(DisputeError::AlreadyOpen)
            } else {
                AppError::Database(e)
            }
        })?;

        sqlx::query("UPDATE orders SET disputed_at = NOW() WHERE id = $1 AND disputed_at IS NULL")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(dispute)
    }

    async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        order_id: Uuid,
        resolution: DisputeResolution,
        seller_response: &str,
    ) -> AppResult<()> {
        // Both writes commit as one unit so a crash can never leave a
        // resolved dispute without its order transition.
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE disputes
            SET status = 'resolved', resolution = $2, seller_response = $3
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(dispute_id)
        .bind(resolution)
        .bind(seller_response)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DisputeError::AlreadyResolved.into());
        }

        let target = match resolution {
            DisputeResolution::Capture => OrderStatus::Released,
            DisputeResolution::Refund => OrderStatus::Refunded,
        };

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2,
                released_at = CASE WHEN $2 = 'released'::order_status THEN NOW() ELSE released_at END
            WHERE id = $1 AND status IN ('complete', 'released')
            "#,
        )
        .bind(order_id)
        .bind(target)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
