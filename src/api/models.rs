use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::models::{Dispute, DisputeResolution, DisputeStatus};
use crate::settlement::OrderOutcome;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub ticket_id: Uuid,
    pub buyer_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub redirect_url: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct SettlementRunQuery {
    #[serde(rename = "dryRun")]
    pub dry_run: Option<String>,
    #[serde(rename = "ignoreCutoff")]
    pub ignore_cutoff: Option<String>,
}

impl SettlementRunQuery {
    pub fn dry_run(&self) -> bool {
        self.dry_run.as_deref() == Some("1")
    }

    pub fn ignore_cutoff(&self) -> bool {
        self.ignore_cutoff.as_deref() == Some("1")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRunResponse {
    pub ok: bool,
    pub processed: usize,
    pub dry_run: bool,
    pub results: Vec<OrderOutcome>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenDisputeRequest {
    pub order_id: Uuid,
    pub raised_by: Uuid,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveDisputeRequest {
    pub action: String,
    pub response: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: DisputeStatus,
    pub resolution: Option<DisputeResolution>,
}

impl From<Dispute> for DisputeResponse {
    fn from(dispute: Dispute) -> Self {
        Self {
            id: dispute.id,
            order_id: dispute.order_id,
            status: dispute.status,
            resolution: dispute.resolution,
        }
    }
}
