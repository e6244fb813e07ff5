//! Scripted processor used by unit tests: records every call, honors
//! idempotency keys, and can be told to fail specific operations.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{
    CheckoutSession, CheckoutSessionRequest, ChargeResult, PaymentProcessor, ProcessorResult,
    TransferResult,
};
use crate::error::ProcessorError;

#[derive(Default)]
struct State {
    session_counter: u64,
    sessions: Vec<CheckoutSessionRequest>,
    charges: HashMap<String, ChargeResult>,
    latest_charges: HashMap<String, String>,
    /// idempotency key -> transfer, the at-most-once ledger
    transfers: HashMap<String, TransferResult>,
    transfer_calls: Vec<(String, i64)>,
    captures: Vec<String>,
    refunds: Vec<String>,
    fail_sessions: bool,
    fail_transfers: bool,
    fail_captures: bool,
    fail_refunds: bool,
}

#[derive(Default)]
pub struct MockProcessor {
    state: Mutex<State>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_charge_result(&self, charge_ref: &str, result: ChargeResult) {
        self.state
            .lock()
            .charges
            .insert(charge_ref.to_string(), result);
    }

    pub fn set_latest_charge(&self, payment_ref: &str, charge_ref: &str) {
        self.state
            .lock()
            .latest_charges
            .insert(payment_ref.to_string(), charge_ref.to_string());
    }

    pub fn fail_sessions(&self, fail: bool) {
        self.state.lock().fail_sessions = fail;
    }

    pub fn fail_transfers(&self, fail: bool) {
        self.state.lock().fail_transfers = fail;
    }

    pub fn fail_captures(&self, fail: bool) {
        self.state.lock().fail_captures = fail;
    }

    pub fn fail_refunds(&self, fail: bool) {
        self.state.lock().fail_refunds = fail;
    }

    pub fn session_requests(&self) -> Vec<CheckoutSessionRequest> {
        self.state.lock().sessions.clone()
    }

    /// Every transfer creation attempt (idempotency key, amount), including
    /// replays the key ledger absorbed.
    pub fn transfer_calls(&self) -> Vec<(String, i64)> {
        self.state.lock().transfer_calls.clone()
    }

    /// Distinct transfers actually created.
    pub fn transfers_created(&self) -> usize {
        self.state.lock().transfers.len()
    }

    pub fn captures(&self) -> Vec<String> {
        self.state.lock().captures.clone()
    }

    pub fn refunds(&self) -> Vec<String> {
        self.state.lock().refunds.clone()
    }

    fn transient() -> ProcessorError {
        ProcessorError::Request("scripted failure".to_string())
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> ProcessorResult<CheckoutSession> {
        let mut state = self.state.lock();
        if state.fail_sessions {
            return Err(Self::transient());
        }
        state.session_counter += 1;
        state.sessions.push(request.clone());
        let id = format!("cs_test_{}", state.session_counter);
        Ok(CheckoutSession {
            url: format!("https://checkout.test/pay/{}", id),
            id,
        })
    }

    async fn latest_charge(&self, payment_ref: &str) -> ProcessorResult<Option<String>> {
        Ok(self.state.lock().latest_charges.get(payment_ref).cloned())
    }

    async fn charge_result(&self, charge_ref: &str) -> ProcessorResult<ChargeResult> {
        self.state
            .lock()
            .charges
            .get(charge_ref)
            .copied()
            .ok_or(ProcessorError::MissingField("balance_transaction"))
    }

    async fn create_transfer(
        &self,
        _destination: &str,
        amount_minor: i64,
        _currency: &str,
        idempotency_key: &str,
    ) -> ProcessorResult<TransferResult> {
        let mut state = self.state.lock();
        if state.fail_transfers {
            return Err(Self::transient());
        }
        state
            .transfer_calls
            .push((idempotency_key.to_string(), amount_minor));
        if let Some(existing) = state.transfers.get(idempotency_key) {
            return Ok(existing.clone());
        }
        let transfer = TransferResult {
            id: format!("tr_test_{}", state.transfers.len() + 1),
            status: "paid".to_string(),
        };
        state
            .transfers
            .insert(idempotency_key.to_string(), transfer.clone());
        Ok(transfer)
    }

    async fn capture_payment(&self, payment_ref: &str) -> ProcessorResult<()> {
        let mut state = self.state.lock();
        if state.fail_captures {
            return Err(Self::transient());
        }
        state.captures.push(payment_ref.to_string());
        Ok(())
    }

    async fn refund_payment(&self, payment_ref: &str) -> ProcessorResult<()> {
        let mut state = self.state.lock();
        if state.fail_refunds {
            return Err(Self::transient());
        }
        state.refunds.push(payment_ref.to_string());
        Ok(())
    }
}
