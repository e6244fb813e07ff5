use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::handler::{
    get_order, health_check, open_dispute, payment_webhook, resolve_dispute, run_settlement,
    start_checkout, AppState,
};

pub async fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        // Public health check endpoint
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                // Checkout
                .route("/checkout/session", post(start_checkout))
                // Processor webhook (raw body, signature verified inside)
                .route("/webhook/payment", post(payment_webhook))
                // Settlement trigger (bearer guarded)
                .route("/settlement/run", get(run_settlement))
                // Disputes
                .route("/disputes", post(open_dispute))
                .route("/disputes/:dispute_id/resolve", post(resolve_dispute))
                // Order status
                .route("/orders/:order_id", get(get_order)),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(
    app: Router,
    bind_address: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
