//! HTTP Handlers
//!
//! Every handler answers either its success body or `{ "error": "<message>" }`
//! with the status class of the underlying [`PaymentError`].

use axum::{
    Json,
    body::Bytes,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};

use storefront_payments::webhook::SIGNATURE_HEADER;
use storefront_payments::{
    CatalogProduct, Charge, CheckoutRequest, Dispatch, PaymentError, Subscription,
};

use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, PaymentError>;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub webhook_configured: bool,
}

/// Fields are optional so an absent field and an empty one fail the same way
#[derive(Debug, Default, Deserialize)]
pub struct CheckoutBody {
    pub price_id: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CustomerIdResponse {
    pub customer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CustomerQuery {
    pub customer_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<Charge>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelSubscriptionBody {
    pub subscription_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSubscriptionBody {
    pub subscription_id: Option<String>,
    pub new_price_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub message: &'static str,
    pub subscription: Subscription,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

// ============================================================================
// Extraction helpers
// ============================================================================

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, PaymentError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| PaymentError::validation(rejection.body_text()))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, PaymentError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| PaymentError::validation(rejection.body_text()))
}

fn log_failure(operation: &'static str, err: &PaymentError) {
    match err {
        PaymentError::Upstream(_) | PaymentError::Config(_) => {
            tracing::error!(operation, kind = err.kind(), error = %err, "Request failed");
        }
        _ => tracing::warn!(operation, kind = err.kind(), error = %err, "Request rejected"),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.provider.name().to_string(),
        webhook_configured: state.webhooks.is_configured(),
    })
}

/// Start a hosted checkout for one price
pub async fn create_checkout_session(
    State(state): State<AppState>,
    payload: Result<Json<CheckoutBody>, JsonRejection>,
) -> ApiResult<CheckoutResponse> {
    const OPERATION: &str = "create_checkout_session";

    let body = json_body(payload).inspect_err(|e| log_failure(OPERATION, e))?;
    let request = CheckoutRequest::new(
        body.price_id.unwrap_or_default(),
        body.email.unwrap_or_default(),
        body.country.unwrap_or_default(),
    );

    let created = state
        .checkout
        .create_session(&request)
        .await
        .inspect_err(|e| log_failure(OPERATION, e))?;

    tracing::info!(
        session_id = %created.session_id,
        customer_id = %created.customer_id,
        "Checkout session created"
    );
    Ok(Json(CheckoutResponse {
        checkout_url: created.checkout_url,
    }))
}

/// Active products with their prices
pub async fn list_products(State(state): State<AppState>) -> ApiResult<Vec<CatalogProduct>> {
    let catalog = state
        .catalog
        .list()
        .await
        .inspect_err(|e| log_failure("list_products", e))?;
    Ok(Json(catalog))
}

/// Customer id previously created for an email
pub async fn customer_id(
    State(state): State<AppState>,
    query: Result<Query<EmailQuery>, QueryRejection>,
) -> ApiResult<CustomerIdResponse> {
    let customer_id = query_params(query)
        .and_then(|q| state.directory.customer_id(&q.email.unwrap_or_default()))
        .inspect_err(|e| log_failure("customer_id", e))?;
    Ok(Json(CustomerIdResponse { customer_id }))
}

/// Recent charges for a customer
pub async fn user_transactions(
    State(state): State<AppState>,
    query: Result<Query<CustomerQuery>, QueryRejection>,
) -> ApiResult<TransactionsResponse> {
    const OPERATION: &str = "user_transactions";

    let params = query_params(query).inspect_err(|e| log_failure(OPERATION, e))?;
    let transactions = state
        .transactions
        .list(&params.customer_id.unwrap_or_default())
        .await
        .inspect_err(|e| log_failure(OPERATION, e))?;

    Ok(Json(TransactionsResponse { transactions }))
}

/// Cancel a subscription at the end of its current period
pub async fn cancel_subscription(
    State(state): State<AppState>,
    payload: Result<Json<CancelSubscriptionBody>, JsonRejection>,
) -> ApiResult<SubscriptionResponse> {
    const OPERATION: &str = "cancel_subscription";

    let body = json_body(payload).inspect_err(|e| log_failure(OPERATION, e))?;
    let subscription = state
        .subscriptions
        .cancel_at_period_end(&body.subscription_id.unwrap_or_default())
        .await
        .inspect_err(|e| log_failure(OPERATION, e))?;

    Ok(Json(SubscriptionResponse {
        message: "Subscription cancelled",
        subscription,
    }))
}

/// Move a subscription to a new price
pub async fn update_subscription(
    State(state): State<AppState>,
    payload: Result<Json<UpdateSubscriptionBody>, JsonRejection>,
) -> ApiResult<SubscriptionResponse> {
    const OPERATION: &str = "update_subscription";

    let body = json_body(payload).inspect_err(|e| log_failure(OPERATION, e))?;
    let subscription = state
        .subscriptions
        .change_price(
            &body.subscription_id.unwrap_or_default(),
            &body.new_price_id.unwrap_or_default(),
        )
        .await
        .inspect_err(|e| log_failure(OPERATION, e))?;

    Ok(Json(SubscriptionResponse {
        message: "Subscription updated",
        subscription,
    }))
}

/// Stripe webhook handler
///
/// Takes the body as raw bytes: the signature covers the exact payload.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<WebhookAck> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let dispatch = state
        .webhooks
        .process(&body, signature)
        .inspect_err(|e| log_failure("stripe_webhook", e))?;

    if let Dispatch::Unhandled(event_type) = dispatch {
        tracing::info!(event_type = %event_type, "Acknowledged unhandled webhook event");
    }

    Ok(Json(WebhookAck { received: true }))
}
