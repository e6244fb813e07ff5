use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::{
    api::handler::AppState,
    checkout::CheckoutService,
    config::Config,
    disputes::DisputeService,
    error::AppResult,
    ledger::{repository::LedgerRepository, store::SettlementStore},
    processor::{stripe::StripeProcessor, PaymentProcessor},
    settlement::{FeePolicy, SettlementRunner},
    webhook::WebhookIngester,
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let pool = initialize_database(&config.database_url).await?;

    // The ledger is the single source of truth for settlement state
    let store: Arc<dyn SettlementStore> = Arc::new(LedgerRepository::new(pool));
    info!("✅ Order ledger initialized");

    let processor: Arc<dyn PaymentProcessor> =
        Arc::new(StripeProcessor::new(config.processor_secret_key.clone()));
    info!("✅ Payment processor client initialized");

    let checkout = Arc::new(CheckoutService::new(
        store.clone(),
        processor.clone(),
        config.currency.clone(),
        config.app_url.clone(),
    ));

    let ingester = Arc::new(WebhookIngester::new(
        store.clone(),
        processor.clone(),
        config.webhook_signing_secret.clone(),
    ));

    let policy = FeePolicy {
        platform_fee_bps: config.platform_fee_bps,
        safety_buffer_minor: config.safety_buffer_minor,
    };
    let runner = Arc::new(SettlementRunner::new(
        store.clone(),
        processor.clone(),
        policy,
        config.hold_window(),
    ));
    info!(
        "✅ Settlement runner initialized (hold window {}h, fee {}bps, buffer {})",
        config.hold_window_hours, config.platform_fee_bps, config.safety_buffer_minor
    );

    let disputes = Arc::new(DisputeService::new(
        store.clone(),
        processor.clone(),
        config.hold_window(),
    ));

    Ok(AppState {
        store,
        checkout,
        ingester,
        runner,
        disputes,
        cron_secret: config.cron_secret.clone(),
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(50)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
