pub mod payout;
pub mod runner;

pub use payout::FeePolicy;
pub use runner::{OrderOutcome, OutcomeStatus, ReleaseOptions, SettlementRunner};
