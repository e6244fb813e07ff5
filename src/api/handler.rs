use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::models::*;
use crate::{
    checkout::CheckoutService,
    disputes::DisputeService,
    error::{AppError, AppResult},
    ledger::{models::Order, store::SettlementStore},
    settlement::{ReleaseOptions, SettlementRunner},
    webhook::WebhookIngester,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SettlementStore>,
    pub checkout: Arc<CheckoutService>,
    pub ingester: Arc<WebhookIngester>,
    pub runner: Arc<SettlementRunner>,
    pub disputes: Arc<DisputeService>,
    pub cron_secret: String,
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Start a purchase and hand the buyer the hosted checkout redirect
/// POST /api/v1/checkout/session
pub async fn start_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<Json<CheckoutResponse>> {
    info!(ticket_id = %request.ticket_id, buyer_id = %request.buyer_id, "checkout requested");
    let redirect_url = state
        .checkout
        .start_checkout(request.ticket_id, request.buyer_id)
        .await?;
    Ok(Json(CheckoutResponse { redirect_url }))
}

/// Payment processor webhook
/// POST /api/v1/webhook/payment
///
/// The body must stay raw: the signature is computed over the exact bytes.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok());
    state.ingester.handle_event(&body, signature).await?;
    Ok(Json(WebhookAck { received: true }))
}

/// Recurring settlement trigger, guarded by the cron bearer credential
/// GET /api/v1/settlement/run?dryRun=0|1&ignoreCutoff=0|1
pub async fn run_settlement(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SettlementRunQuery>,
) -> AppResult<Json<SettlementRunResponse>> {
    let authorized = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", state.cron_secret))
        .unwrap_or(false);
    if !authorized {
        return Err(AppError::Unauthorized);
    }

    let options = ReleaseOptions {
        dry_run: query.dry_run(),
        ignore_cutoff: query.ignore_cutoff(),
    };
    let results = state.runner.release_due(Utc::now(), options).await?;

    Ok(Json(SettlementRunResponse {
        ok: true,
        processed: results.len(),
        dry_run: options.dry_run,
        results,
    }))
}

/// Buyer raises a dispute against a delivered order
/// POST /api/v1/disputes
pub async fn open_dispute(
    State(state): State<AppState>,
    Json(request): Json<OpenDisputeRequest>,
) -> AppResult<Json<DisputeResponse>> {
    let dispute = state
        .disputes
        .open_dispute(request.order_id, request.raised_by, &request.message)
        .await?;
    Ok(Json(dispute.into()))
}

/// Seller/admin resolves a dispute with capture or refund
/// POST /api/v1/disputes/:dispute_id/resolve
pub async fn resolve_dispute(
    State(state): State<AppState>,
    Path(dispute_id): Path<Uuid>,
    Json(request): Json<ResolveDisputeRequest>,
) -> AppResult<Json<DisputeResponse>> {
    state
        .disputes
        .resolve_dispute(dispute_id, &request.action, &request.response)
        .await?;

    let dispute = state
        .store
        .get_dispute(dispute_id)
        .await?
        .ok_or(AppError::NotFound(format!("dispute {}", dispute_id)))?;
    Ok(Json(dispute.into()))
}

/// Order status lookup for the post-checkout page
/// GET /api/v1/orders/:order_id
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    let order = state
        .store
        .get_order(order_id)
        .await?
        .ok_or(AppError::NotFound(format!("order {}", order_id)))?;
    Ok(Json(order))
}
