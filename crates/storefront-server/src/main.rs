//! Storefront HTTP Server
//!
//! Axum server exposing the storefront API in front of Stripe.

use std::sync::Arc;

use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_payments::StripeClient;
use storefront_server::{config::Config, router, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Missing Stripe credentials abort startup
    let config = Config::from_env()?;

    let stripe = StripeClient::new(&config.stripe_secret_key)?
        .with_api_base(config.stripe_api_base.clone())
        .with_api_version(config.stripe_api_version.clone());
    tracing::info!(api_base = %config.stripe_api_base, "✓ Stripe configured");

    if config.webhook_secret.is_none() {
        tracing::warn!("⚠ STRIPE_WEBHOOK_SECRET not set - webhook deliveries will be rejected");
    }

    // Build application state
    let state = AppState::new(
        Arc::new(stripe),
        config.tax_policy.clone(),
        &config.public_app_url,
        config.webhook_secret.clone(),
    );

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state)
        // Static files (storefront UI)
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 storefront server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health              - Health check");
    tracing::info!("  GET  /products            - Active products with prices");
    tracing::info!("  POST /checkout-sessions   - Create Stripe checkout");
    tracing::info!("  GET  /customer-id         - Customer id for an email");
    tracing::info!("  GET  /user-transactions   - Charges for a customer");
    tracing::info!("  POST /cancel-subscription - Cancel at period end");
    tracing::info!("  POST /update-subscription - Change subscription price");
    tracing::info!("  POST /webhook             - Stripe webhook");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
