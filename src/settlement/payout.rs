//! Payout math. All amounts are integer minor units; the inputs come from
//! the processor's balance transaction (gross/fee/net), never from the
//! amount the checkout originally requested.

use crate::processor::ChargeResult;

#[derive(Debug, Clone, Copy)]
pub struct FeePolicy {
    /// Platform fee in basis points of the gross amount
    pub platform_fee_bps: i64,
    /// Flat buffer withheld per payout, in minor units
    pub safety_buffer_minor: i64,
}

/// `round(gross * bps / 10000)`, half away from zero.
pub fn platform_fee(gross: i64, bps: i64) -> i64 {
    let product = gross as i128 * bps as i128;
    let fee = if product >= 0 {
        (product + 5_000) / 10_000
    } else {
        (product - 5_000) / 10_000
    };
    fee as i64
}

/// `payout = captured_net - platform_fee - safety_buffer`. A result of zero
/// or less means no transfer is attempted.
pub fn compute_payout(charge: &ChargeResult, policy: &FeePolicy) -> i64 {
    charge.net - platform_fee(charge.gross, policy.platform_fee_bps) - policy.safety_buffer_minor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_fee_rounds_half_up() {
        assert_eq!(platform_fee(1000, 500), 50);
        // 999 * 25 / 10000 = 2.4975 -> 2
        assert_eq!(platform_fee(999, 25), 2);
        // 1990 * 25 / 10000 = 4.975 -> 5
        assert_eq!(platform_fee(1990, 25), 5);
        // 200 * 25 / 10000 = 0.5 -> 1
        assert_eq!(platform_fee(200, 25), 1);
        assert_eq!(platform_fee(0, 500), 0);
    }

    #[test]
    fn payout_uses_processor_net_not_requested_amount() {
        // gross 1000, processor fee 30, platform 5% of gross, buffer 2
        let charge = ChargeResult {
            gross: 1000,
            fee: 30,
            net: 970,
        };
        let policy = FeePolicy {
            platform_fee_bps: 500,
            safety_buffer_minor: 2,
        };
        assert_eq!(compute_payout(&charge, &policy), 918);
    }

    #[test]
    fn payout_can_go_non_positive() {
        let charge = ChargeResult {
            gross: 100,
            fee: 95,
            net: 5,
        };
        let policy = FeePolicy {
            platform_fee_bps: 500,
            safety_buffer_minor: 10,
        };
        // 5 - 5 - 10 = -10
        assert_eq!(compute_payout(&charge, &policy), -10);
    }
}
