//! Billing Provider Abstraction
//!
//! Every piece of real billing work (customers, catalog, checkout,
//! subscriptions, charges) happens at the payment provider. This module
//! defines the narrow interface the storefront needs from it, plus the
//! trimmed-down records the browser client consumes.

mod memory;
mod stripe;

pub use memory::{MemoryBillingProvider, ProviderCall};
pub use stripe::{DEFAULT_API_BASE, DEFAULT_API_VERSION, StripeClient};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::checkout::CheckoutSessionParams;
use crate::error::Result;

/// Payment provider trait (Strategy pattern)
///
/// `StripeClient` talks to the real API; `MemoryBillingProvider` backs tests
/// and local demos.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a customer record for an email
    async fn create_customer(&self, email: &str) -> Result<Customer>;

    /// First page of active products
    async fn list_active_products(&self) -> Result<Vec<Product>>;

    /// First page of active prices
    async fn list_active_prices(&self) -> Result<Vec<Price>>;

    /// Create a hosted checkout session
    async fn create_checkout_session(&self, params: &CheckoutSessionParams) -> Result<CheckoutSession>;

    /// Fetch a subscription by id
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Subscription>;

    /// Apply an update to a subscription and return the new snapshot
    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: &SubscriptionUpdate,
    ) -> Result<Subscription>;

    /// Most recent charges for a customer, at most `limit`
    async fn list_charges(&self, customer_id: &str, limit: u8) -> Result<Vec<Charge>>;

    /// Provider name
    fn name(&self) -> &str;
}

/// Provider customer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Catalog product
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub active: bool,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Price attached to a product
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub id: String,

    /// Id of the product this price belongs to
    pub product: String,

    pub active: bool,

    /// Lower-case ISO currency code
    pub currency: String,

    /// Amount in the currency's minor unit
    #[serde(default)]
    pub unit_amount: Option<i64>,

    #[serde(default)]
    pub nickname: Option<String>,

    /// Absent for one-time prices
    #[serde(default)]
    pub recurring: Option<Recurring>,
}

/// Billing cadence of a recurring price
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurring {
    /// `day`, `week`, `month` or `year`
    pub interval: String,
    #[serde(default = "default_interval_count")]
    pub interval_count: u32,
}

fn default_interval_count() -> u32 {
    1
}

/// Hosted checkout session as returned by the provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Only present while the session is open
    #[serde(default)]
    pub url: Option<String>,
}

/// Subscription snapshot
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub cancel_at_period_end: bool,
    pub cancel_at: Option<i64>,
    /// Line items in provider order
    pub items: Vec<SubscriptionItem>,
}

/// One price+quantity entry of a subscription
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionItem {
    pub id: String,
    pub price: Price,
    #[serde(default)]
    pub quantity: Option<u64>,
}

/// Change applied to a subscription
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionUpdate {
    /// Keep the subscription running until the current period ends
    CancelAtPeriodEnd,
    /// Swap the price of an existing line item, prorated by the provider
    ReplaceItemPrice { item_id: String, price_id: String },
}

/// A charge, exposed to the client as a transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    /// Amount in the currency's minor unit
    pub amount: i64,
    #[serde(default)]
    pub amount_refunded: i64,
    pub currency: String,
    /// `succeeded`, `pending` or `failed`
    pub status: String,
    #[serde(default)]
    pub paid: bool,
    /// Unix timestamp
    pub created: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub receipt_url: Option<String>,
}
