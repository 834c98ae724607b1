//! End-to-end API tests against the in-memory billing provider

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use storefront_payments::provider::{ProviderCall, Recurring, SubscriptionItem};
use storefront_payments::webhook::{SIGNATURE_HEADER, signature_header};
use storefront_payments::{Charge, MemoryBillingProvider, Price, Product, Subscription, TaxPolicy};
use storefront_server::{router, state::AppState};

const WEBHOOK_SECRET: &str = "whsec_test_secret";

fn product(id: &str, name: &str) -> Product {
    Product {
        id: id.into(),
        name: name.into(),
        description: None,
        active: true,
        images: vec![],
    }
}

fn monthly_price(id: &str, product: &str, amount: i64) -> Price {
    Price {
        id: id.into(),
        product: product.into(),
        active: true,
        currency: "usd".into(),
        unit_amount: Some(amount),
        nickname: None,
        recurring: Some(Recurring {
            interval: "month".into(),
            interval_count: 1,
        }),
    }
}

fn charge(id: &str, amount: i64, created: i64) -> Charge {
    Charge {
        id: id.into(),
        amount,
        amount_refunded: 0,
        currency: "usd".into(),
        status: "succeeded".into(),
        paid: true,
        created,
        description: None,
        receipt_url: None,
    }
}

fn seeded_provider() -> Arc<MemoryBillingProvider> {
    Arc::new(
        MemoryBillingProvider::new()
            .with_products(vec![product("prod_basic", "Basic"), product("prod_pro", "Pro")])
            .with_prices(vec![
                monthly_price("price_1", "prod_basic", 900),
                monthly_price("price_2", "prod_basic", 1900),
            ])
            .with_subscription(Subscription {
                id: "sub_1".into(),
                customer: "cus_1".into(),
                status: "active".into(),
                cancel_at_period_end: false,
                cancel_at: None,
                items: vec![SubscriptionItem {
                    id: "si_1".into(),
                    price: monthly_price("price_1", "prod_basic", 900),
                    quantity: Some(1),
                }],
            })
            .with_charge("cus_1", charge("ch_old", 900, 1_700_000_000))
            .with_charge("cus_1", charge("ch_new", 1900, 1_700_100_000)),
    )
}

fn app(provider: &Arc<MemoryBillingProvider>, webhook_secret: Option<&str>) -> Router {
    let state = AppState::new(
        provider.clone(),
        TaxPolicy::default(),
        "https://shop.example.com",
        webhook_secret.map(str::to_string),
    );
    router(state)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn webhook(payload: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(payload.to_string())).unwrap()
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        .try_into()
        .unwrap()
}

fn count_customer_creations(provider: &MemoryBillingProvider) -> usize {
    provider
        .calls()
        .iter()
        .filter(|call| matches!(call, ProviderCall::CreateCustomer { .. }))
        .count()
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health() {
    let provider = seeded_provider();
    let (status, body) = send(app(&provider, None), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["webhook_configured"], false);
}

// ============================================================================
// Checkout
// ============================================================================

#[tokio::test]
async fn test_checkout_returns_url_and_registers_customer() {
    let provider = seeded_provider();
    let app = app(&provider, None);

    let (status, body) = send(
        app.clone(),
        post_json(
            "/checkout-sessions",
            &json!({ "price_id": "price_1", "email": "a@x.com", "country": "US" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checkout_url"], "https://checkout.example.test/c/cs_mem_1");

    let (status, body) = send(app, get("/customer-id?email=a@x.com")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["customer_id"], "cus_mem_1");
}

#[tokio::test]
async fn test_checkout_reuses_customer_for_same_email() {
    let provider = seeded_provider();
    let app = app(&provider, None);
    let request = json!({ "price_id": "price_1", "email": "a@x.com", "country": "PK" });

    let (first, _) = send(app.clone(), post_json("/checkout-sessions", &request)).await;
    let (second, _) = send(app, post_json("/checkout-sessions", &request)).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(count_customer_creations(&provider), 1);
}

#[tokio::test]
async fn test_checkout_missing_field_is_rejected_before_provider() {
    let provider = seeded_provider();

    let (status, body) = send(
        app(&provider, None),
        post_json("/checkout-sessions", &json!({ "price_id": "price_1", "email": "a@x.com" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "price_id, email, and country are required");
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_checkout_malformed_json() {
    let provider = seeded_provider();
    let request = Request::builder()
        .method("POST")
        .uri("/checkout-sessions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(app(&provider, None), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_checkout_provider_failure_is_reported() {
    let provider = seeded_provider();
    provider.fail_with("No such price: 'price_missing'");

    let (status, body) = send(
        app(&provider, None),
        post_json(
            "/checkout-sessions",
            &json!({ "price_id": "price_missing", "email": "a@x.com", "country": "US" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No such price: 'price_missing'");
}

// ============================================================================
// Customers
// ============================================================================

#[tokio::test]
async fn test_customer_id_unknown_email() {
    let provider = seeded_provider();
    let (status, body) = send(app(&provider, None), get("/customer-id?email=new@x.com")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "No customer_id found for this email");
}

#[tokio::test]
async fn test_customer_id_requires_email() {
    let provider = seeded_provider();
    let (status, body) = send(app(&provider, None), get("/customer-id")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "email is required");
}

// ============================================================================
// Catalog
// ============================================================================

#[tokio::test]
async fn test_products_include_prices() {
    let provider = seeded_provider();
    let (status, body) = send(app(&provider, None), get("/products")).await;

    assert_eq!(status, StatusCode::OK);
    let products = body.as_array().unwrap();
    assert_eq!(products.len(), 2);

    assert_eq!(products[0]["id"], "prod_basic");
    assert_eq!(products[0]["name"], "Basic");
    let prices: Vec<&str> = products[0]["prices"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(prices, vec!["price_1", "price_2"]);

    assert_eq!(products[1]["id"], "prod_pro");
    assert_eq!(products[1]["prices"], json!([]));
}

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test]
async fn test_update_subscription_price() {
    let provider = seeded_provider();

    let (status, body) = send(
        app(&provider, None),
        post_json(
            "/update-subscription",
            &json!({ "subscription_id": "sub_1", "new_price_id": "price_2" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Subscription updated");
    assert_eq!(body["subscription"]["items"][0]["id"], "si_1");
    assert_eq!(body["subscription"]["items"][0]["price"]["id"], "price_2");
}

#[tokio::test]
async fn test_update_subscription_requires_both_ids() {
    let provider = seeded_provider();

    let (status, body) = send(
        app(&provider, None),
        post_json("/update-subscription", &json!({ "subscription_id": "sub_1" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "subscription_id and new_price_id are required");
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_subscription() {
    let provider = seeded_provider();

    let (status, body) = send(
        app(&provider, None),
        post_json("/cancel-subscription", &json!({ "subscription_id": "sub_1" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Subscription cancelled");
    assert_eq!(body["subscription"]["cancel_at_period_end"], true);
    assert_eq!(body["subscription"]["status"], "active");
}

#[tokio::test]
async fn test_cancel_requires_subscription_id() {
    let provider = seeded_provider();

    let (status, body) = send(
        app(&provider, None),
        post_json("/cancel-subscription", &json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "subscription_id is required");
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_unknown_subscription() {
    let provider = seeded_provider();

    let (status, body) = send(
        app(&provider, None),
        post_json("/cancel-subscription", &json!({ "subscription_id": "sub_missing" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No such subscription: 'sub_missing'");
}

// ============================================================================
// Transactions
// ============================================================================

#[tokio::test]
async fn test_user_transactions_newest_first() {
    let provider = seeded_provider();
    let (status, body) = send(app(&provider, None), get("/user-transactions?customer_id=cus_1")).await;

    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["transactions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["ch_new", "ch_old"]);
}

#[tokio::test]
async fn test_user_transactions_requires_customer_id() {
    let provider = seeded_provider();
    let (status, body) = send(app(&provider, None), get("/user-transactions")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "customer_id is required");
}

// ============================================================================
// Webhook
// ============================================================================

#[tokio::test]
async fn test_webhook_missing_signature() {
    let provider = seeded_provider();
    let (status, body) = send(app(&provider, Some(WEBHOOK_SECRET)), webhook("{}", None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing stripe-signature header");
}

#[tokio::test]
async fn test_webhook_secret_not_configured() {
    let provider = seeded_provider();
    let (status, body) = send(app(&provider, None), webhook("{}", Some("t=1,v1=00"))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Webhook secret not configured");
}

#[tokio::test]
async fn test_webhook_bad_signature() {
    let provider = seeded_provider();
    let payload = json!({ "id": "evt_1", "type": "invoice.paid", "data": { "object": {} } }).to_string();
    let signature = signature_header(payload.as_bytes(), "whsec_other", now()).unwrap();

    let (status, body) = send(
        app(&provider, Some(WEBHOOK_SECRET)),
        webhook(&payload, Some(&signature)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Webhook Error: "));
}

#[tokio::test]
async fn test_webhook_acknowledges_handled_event() {
    let provider = seeded_provider();
    let payload = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "created": 1_700_000_000,
        "livemode": false,
        "data": { "object": { "id": "cs_1", "customer": "cus_1" } }
    })
    .to_string();
    let signature = signature_header(payload.as_bytes(), WEBHOOK_SECRET, now()).unwrap();

    let (status, body) = send(
        app(&provider, Some(WEBHOOK_SECRET)),
        webhook(&payload, Some(&signature)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
}

#[tokio::test]
async fn test_webhook_acknowledges_unknown_event_type() {
    let provider = seeded_provider();
    let payload = json!({
        "id": "evt_2",
        "type": "product.created",
        "data": { "object": { "id": "prod_new" } }
    })
    .to_string();
    let signature = signature_header(payload.as_bytes(), WEBHOOK_SECRET, now()).unwrap();

    let (status, body) = send(
        app(&provider, Some(WEBHOOK_SECRET)),
        webhook(&payload, Some(&signature)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
    assert!(provider.calls().is_empty());
}
