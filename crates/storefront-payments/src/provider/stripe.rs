//! Stripe REST client
//!
//! Talks to the Stripe API directly over `reqwest`: form-encoded POST bodies,
//! query-string GETs, bearer auth with the secret key.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{
    BillingProvider, Charge, CheckoutSession, Customer, Price, Product, Subscription,
    SubscriptionItem, SubscriptionUpdate,
};
use crate::checkout::{CheckoutSessionParams, CustomerUpdate};
use crate::error::{PaymentError, Result};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// API version the response shapes below were written against
pub const DEFAULT_API_VERSION: &str = "2025-06-30.basil";

/// Upper bound on a single Stripe call, connect through body
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type Form = Vec<(String, String)>;

/// Stripe client wrapper
pub struct StripeClient {
    http: Client,
    secret_key: String,
    api_base: String,
    api_version: String,
}

impl fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base)
            .field("api_version", &self.api_version)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PaymentError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            secret_key: secret_key.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        })
    }

    /// Point at a different API host (stripe-mock, a proxy)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Build `<base>/v1/<segments…>`, escaping each segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| PaymentError::Config(format!("Invalid Stripe API base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| PaymentError::Config("Stripe API base URL cannot have a path".into()))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        params: &[(String, String)],
    ) -> Result<T> {
        let url = self.endpoint(segments)?;
        let request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(&self.secret_key)
            .header("Stripe-Version", &self.api_version);

        let request = if method == Method::GET {
            request.query(params)
        } else {
            request.form(params)
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(status.as_u16(), &body);
            tracing::warn!(
                status = status.as_u16(),
                path = %segments.join("/"),
                error = %message,
                "Stripe request failed"
            );
            return Err(PaymentError::Upstream(message));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PaymentError::upstream(format!("Invalid response from payment provider: {e}")))
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn create_customer(&self, email: &str) -> Result<Customer> {
        let form = vec![("email".to_string(), email.to_string())];
        self.send(Method::POST, &["customers"], &form).await
    }

    async fn list_active_products(&self) -> Result<Vec<Product>> {
        let query = vec![("active".to_string(), "true".to_string())];
        let list: List<Product> = self.send(Method::GET, &["products"], &query).await?;
        Ok(list.data)
    }

    async fn list_active_prices(&self) -> Result<Vec<Price>> {
        let query = vec![("active".to_string(), "true".to_string())];
        let list: List<Price> = self.send(Method::GET, &["prices"], &query).await?;
        Ok(list.data)
    }

    async fn create_checkout_session(&self, params: &CheckoutSessionParams) -> Result<CheckoutSession> {
        let form = checkout_session_form(params);
        self.send(Method::POST, &["checkout", "sessions"], &form).await
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Subscription> {
        let raw: RawSubscription = self
            .send(Method::GET, &["subscriptions", subscription_id], &[])
            .await?;
        Ok(raw.into())
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: &SubscriptionUpdate,
    ) -> Result<Subscription> {
        let form = subscription_update_form(update);
        let raw: RawSubscription = self
            .send(Method::POST, &["subscriptions", subscription_id], &form)
            .await?;
        Ok(raw.into())
    }

    async fn list_charges(&self, customer_id: &str, limit: u8) -> Result<Vec<Charge>> {
        let query = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        let list: List<Charge> = self.send(Method::GET, &["charges"], &query).await?;
        Ok(list.data)
    }

    fn name(&self) -> &str {
        "Stripe"
    }
}

/// Stripe list envelope
#[derive(Debug, Deserialize)]
struct List<T> {
    data: Vec<T>,
}

/// Subscription as Stripe returns it; items arrive wrapped in a list object
#[derive(Debug, Deserialize)]
struct RawSubscription {
    id: String,
    customer: String,
    status: String,
    #[serde(default)]
    cancel_at_period_end: bool,
    #[serde(default)]
    cancel_at: Option<i64>,
    items: List<SubscriptionItem>,
}

impl From<RawSubscription> for Subscription {
    fn from(raw: RawSubscription) -> Self {
        Self {
            id: raw.id,
            customer: raw.customer,
            status: raw.status,
            cancel_at_period_end: raw.cancel_at_period_end,
            cancel_at: raw.cancel_at,
            items: raw.items.data,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Pull the human-readable message out of a Stripe error body
fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .unwrap_or_else(|| format!("Stripe request failed with status {status}"))
}

/// Encode checkout session params with Stripe's bracketed form keys
fn checkout_session_form(params: &CheckoutSessionParams) -> Form {
    let mut form: Form = vec![
        ("mode".into(), params.mode.as_str().into()),
        ("customer".into(), params.customer.clone()),
        ("success_url".into(), params.success_url.clone()),
        ("cancel_url".into(), params.cancel_url.clone()),
    ];

    for (i, method) in params.payment_method_types.iter().enumerate() {
        form.push((format!("payment_method_types[{i}]"), method.clone()));
    }

    for (i, item) in params.line_items.iter().enumerate() {
        form.push((format!("line_items[{i}][price]"), item.price.clone()));
        form.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
        match &item.tax_rates {
            None => {}
            // An empty value clears the array on Stripe's side
            Some(rates) if rates.is_empty() => {
                form.push((format!("line_items[{i}][tax_rates]"), String::new()));
            }
            Some(rates) => {
                for (j, rate) in rates.iter().enumerate() {
                    form.push((format!("line_items[{i}][tax_rates][{j}]"), rate.clone()));
                }
            }
        }
    }

    if params.automatic_tax {
        form.push(("automatic_tax[enabled]".into(), "true".into()));
    }
    if let Some(CustomerUpdate::Auto) = params.customer_update {
        for field in ["address", "shipping", "name"] {
            form.push((format!("customer_update[{field}]"), "auto".into()));
        }
    }
    if params.tax_id_collection {
        form.push(("tax_id_collection[enabled]".into(), "true".into()));
    }

    form
}

fn subscription_update_form(update: &SubscriptionUpdate) -> Form {
    match update {
        SubscriptionUpdate::CancelAtPeriodEnd => {
            vec![("cancel_at_period_end".into(), "true".into())]
        }
        SubscriptionUpdate::ReplaceItemPrice { item_id, price_id } => vec![
            ("items[0][id]".into(), item_id.clone()),
            ("items[0][price]".into(), price_id.clone()),
        ],
    }
}
