//! Storefront HTTP API
//!
//! JSON endpoints the browser storefront calls. Each one delegates to
//! `storefront-payments` and reshapes the result.

pub mod config;
pub mod handlers;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers::{
    cancel_subscription, create_checkout_session, customer_id, health_check, list_products,
    stripe_webhook, update_subscription, user_transactions,
};
use crate::state::AppState;

/// API routes, without middleware or static file fallback
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health & info
        .route("/health", get(health_check))

        // Catalog & checkout
        .route("/products", get(list_products))
        .route("/checkout-sessions", post(create_checkout_session))

        // Customers & subscriptions
        .route("/customer-id", get(customer_id))
        .route("/user-transactions", get(user_transactions))
        .route("/cancel-subscription", post(cancel_subscription))
        .route("/update-subscription", post(update_subscription))

        // Provider callbacks
        .route("/webhook", post(stripe_webhook))

        .with_state(state)
}
