use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use super::{
    CheckoutSession, CheckoutSessionRequest, ChargeResult, PaymentProcessor, ProcessorResult,
    TransferResult,
};
use crate::error::ProcessorError;

const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Per-call timeout so one stuck processor call cannot stall a whole
/// settlement batch.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Stripe REST client. Form-encoded requests, bearer auth, Idempotency-Key
/// header on mutating calls that require it.
pub struct StripeProcessor {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct PaymentIntentResponse {
    status: String,
    latest_charge: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct BalanceTransaction {
    amount: i64,
    fee: i64,
    net: i64,
}

#[derive(Deserialize)]
struct ChargeResponse {
    balance_transaction: Option<BalanceTransaction>,
}

#[derive(Deserialize)]
struct TransferResponse {
    id: String,
    #[serde(default)]
    reversed: bool,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

impl StripeProcessor {
    pub fn new(secret_key: String) -> Self {
        Self::with_api_base(secret_key, DEFAULT_API_BASE.to_string())
    }

    pub fn with_api_base(secret_key: String, api_base: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_base,
            secret_key,
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> ProcessorResult<T> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .map(|b| b.error.message)
                .unwrap_or_default();
            Err(ProcessorError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> ProcessorResult<CheckoutSession> {
        let amount = request.amount_minor.to_string();
        let params: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("payment_method_types[0]", "card"),
            ("line_items[0][quantity]", "1"),
            ("line_items[0][price_data][currency]", &request.currency),
            ("line_items[0][price_data][unit_amount]", &amount),
            (
                "line_items[0][price_data][product_data][name]",
                &request.product_name,
            ),
            ("success_url", &request.success_url),
            ("cancel_url", &request.cancel_url),
        ];
        let order_id = request.order_id.to_string();
        let ticket_id = request.ticket_id.to_string();
        let event_id = request.event_id.to_string();
        let buyer_id = request.buyer_id.to_string();
        let metadata: Vec<(&str, &str)> = vec![
            ("metadata[orderId]", &order_id),
            ("metadata[ticketId]", &ticket_id),
            ("metadata[eventId]", &event_id),
            ("metadata[buyerId]", &buyer_id),
        ];

        let response = self
            .client
            .post(self.url("/v1/checkout/sessions"))
            .bearer_auth(&self.secret_key)
            .form(&[params, metadata].concat())
            .send()
            .await?;

        let session: SessionResponse = Self::decode(response).await?;
        let url = session.url.ok_or(ProcessorError::MissingField("url"))?;
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    async fn latest_charge(&self, payment_ref: &str) -> ProcessorResult<Option<String>> {
        let response = self
            .client
            .get(self.url(&format!("/v1/payment_intents/{}", payment_ref)))
            .bearer_auth(&self.secret_key)
            .query(&[("expand[]", "latest_charge")])
            .send()
            .await?;

        let intent: PaymentIntentResponse = Self::decode(response).await?;
        let charge = match intent.latest_charge {
            Some(serde_json::Value::String(id)) => Some(id),
            Some(serde_json::Value::Object(obj)) => obj
                .get("id")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            _ => None,
        };
        Ok(charge)
    }

    async fn charge_result(&self, charge_ref: &str) -> ProcessorResult<ChargeResult> {
        let response = self
            .client
            .get(self.url(&format!("/v1/charges/{}", charge_ref)))
            .bearer_auth(&self.secret_key)
            .query(&[("expand[]", "balance_transaction")])
            .send()
            .await?;

        let charge: ChargeResponse = Self::decode(response).await?;
        let txn = charge
            .balance_transaction
            .ok_or(ProcessorError::MissingField("balance_transaction"))?;
        Ok(ChargeResult {
            gross: txn.amount,
            fee: txn.fee,
            net: txn.net,
        })
    }

    async fn create_transfer(
        &self,
        destination: &str,
        amount_minor: i64,
        currency: &str,
        idempotency_key: &str,
    ) -> ProcessorResult<TransferResult> {
        let amount = amount_minor.to_string();
        let response = self
            .client
            .post(self.url("/v1/transfers"))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", idempotency_key)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", currency),
                ("destination", destination),
            ])
            .send()
            .await?;

        let transfer: TransferResponse = Self::decode(response).await?;
        let status = if transfer.reversed { "reversed" } else { "paid" };
        Ok(TransferResult {
            id: transfer.id,
            status: status.to_string(),
        })
    }

    async fn capture_payment(&self, payment_ref: &str) -> ProcessorResult<()> {
        // Capture only when the intent is still holding an authorization;
        // an already-captured intent is a no-op.
        let response = self
            .client
            .get(self.url(&format!("/v1/payment_intents/{}", payment_ref)))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let intent: PaymentIntentResponse = Self::decode(response).await?;

        match intent.status.as_str() {
            "succeeded" => return Ok(()),
            "requires_capture" => {}
            other => {
                warn!(payment_ref, status = other, "payment intent not capturable");
                return Err(ProcessorError::Api {
                    status: 409,
                    message: format!("payment intent is {}", other),
                });
            }
        }

        let response = self
            .client
            .post(self.url(&format!("/v1/payment_intents/{}/capture", payment_ref)))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::decode::<serde_json::Value>(response).await?;
        Ok(())
    }

    async fn refund_payment(&self, payment_ref: &str) -> ProcessorResult<()> {
        let response = self
            .client
            .post(self.url("/v1/refunds"))
            .bearer_auth(&self.secret_key)
            .form(&[("payment_intent", payment_ref)])
            .send()
            .await?;
        Self::decode::<serde_json::Value>(response).await?;
        Ok(())
    }
}
