use chrono::Duration;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub app_url: String,
    /// Secret key for the payment processor REST API
    pub processor_secret_key: String,
    /// Shared secret for webhook signature verification
    pub webhook_signing_secret: String,
    /// Bearer credential guarding the settlement run endpoint
    pub cron_secret: String,
    /// Platform fee in basis points of the gross amount
    pub platform_fee_bps: i64,
    /// Flat safety buffer withheld per payout, in minor units
    pub safety_buffer_minor: i64,
    /// Escrow hold window in hours (also the dispute window)
    pub hold_window_hours: i64,
    pub currency: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/ticketbridge".to_string()),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            app_url: std::env::var("APP_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            processor_secret_key: std::env::var("STRIPE_SECRET_KEY").map_err(|_| {
                config::ConfigError::NotFound("STRIPE_SECRET_KEY".to_string())
            })?,
            webhook_signing_secret: std::env::var("STRIPE_WEBHOOK_SECRET").map_err(|_| {
                config::ConfigError::NotFound("STRIPE_WEBHOOK_SECRET".to_string())
            })?,
            cron_secret: std::env::var("CRON_SECRET")
                .map_err(|_| config::ConfigError::NotFound("CRON_SECRET".to_string()))?,
            platform_fee_bps: std::env::var("PLATFORM_FEE_BPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            safety_buffer_minor: std::env::var("SAFETY_BUFFER_MINOR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            hold_window_hours: std::env::var("HOLD_WINDOW_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
            currency: std::env::var("CURRENCY").unwrap_or_else(|_| "gbp".to_string()),
        })
    }

    pub fn hold_window(&self) -> Duration {
        Duration::hours(self.hold_window_hours)
    }
}
