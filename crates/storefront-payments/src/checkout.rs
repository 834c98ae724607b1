//! Stripe Checkout Integration
//!
//! Builds hosted checkout sessions for subscription purchases. The session
//! shape depends on the shopper's billing country: Stripe Tax where it is
//! supported, a manual tax rate where one is configured, no tax otherwise.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::directory::CustomerDirectory;
use crate::error::{PaymentError, Result};
use crate::provider::BillingProvider;
use crate::tax::{TaxPolicy, TaxTreatment};

/// Request to start a checkout for one price
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub price_id: String,
    #[serde(default)]
    pub email: String,
    /// Two-letter billing country code
    #[serde(default)]
    pub country: String,
}

impl CheckoutRequest {
    pub fn new(price_id: impl Into<String>, email: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            price_id: price_id.into(),
            email: email.into(),
            country: country.into(),
        }
    }

    /// Check required fields, returning the normalized country code
    pub fn validate(&self) -> Result<String> {
        if [&self.price_id, &self.email, &self.country]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            return Err(PaymentError::validation(
                "price_id, email, and country are required",
            ));
        }

        let country = self.country.trim().to_ascii_uppercase();
        if country.len() != 2 || !country.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(PaymentError::validation(
                "country must be a two-letter ISO country code",
            ));
        }
        Ok(country)
    }
}

/// Result of creating a checkout session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedCheckout {
    /// Stripe session ID
    pub session_id: String,

    /// URL to redirect the shopper to
    pub checkout_url: String,

    /// Customer the session is billed to
    pub customer_id: String,
}

/// Where Stripe sends the shopper after checkout
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedirectUrls {
    pub success_url: String,
    pub cancel_url: String,
}

impl RedirectUrls {
    /// Both outcomes land back on the storefront root
    pub fn from_base(base_url: &str) -> Self {
        let root = format!("{}/", base_url.trim_end_matches('/'));
        Self {
            success_url: root.clone(),
            cancel_url: root,
        }
    }
}

/// Checkout session mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckoutMode {
    Subscription,
}

impl CheckoutMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckoutMode::Subscription => "subscription",
        }
    }
}

/// How Stripe may refresh customer details collected during checkout
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CustomerUpdate {
    /// Save address, shipping and name back onto the customer
    Auto,
}

/// One line of a checkout session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineItem {
    pub price: String,
    pub quantity: u32,
    /// `None` leaves tax rates unset; `Some(vec![])` sends an explicit empty list
    pub tax_rates: Option<Vec<String>>,
}

/// Provider-agnostic checkout session request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutSessionParams {
    pub mode: CheckoutMode,
    pub customer: String,
    pub payment_method_types: Vec<String>,
    pub line_items: Vec<LineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub automatic_tax: bool,
    pub customer_update: Option<CustomerUpdate>,
    pub tax_id_collection: bool,
}

/// Assemble a single-item subscription checkout for a tax treatment
pub fn build_session_params(
    customer_id: &str,
    price_id: &str,
    treatment: &TaxTreatment,
    redirects: &RedirectUrls,
) -> CheckoutSessionParams {
    let mut line_item = LineItem {
        price: price_id.to_string(),
        quantity: 1,
        tax_rates: None,
    };

    let mut params = CheckoutSessionParams {
        mode: CheckoutMode::Subscription,
        customer: customer_id.to_string(),
        payment_method_types: vec!["card".to_string()],
        line_items: Vec::new(),
        success_url: redirects.success_url.clone(),
        cancel_url: redirects.cancel_url.clone(),
        automatic_tax: false,
        customer_update: None,
        tax_id_collection: false,
    };

    match treatment {
        TaxTreatment::Automatic => {
            params.automatic_tax = true;
            params.customer_update = Some(CustomerUpdate::Auto);
            params.tax_id_collection = true;
        }
        TaxTreatment::ManualRate(rate) => line_item.tax_rates = Some(vec![rate.clone()]),
        TaxTreatment::NoTax => line_item.tax_rates = Some(Vec::new()),
    }

    params.line_items.push(line_item);
    params
}

/// Per-email creation locks; an entry lives while someone holds or waits on it
type CreationLocks = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Creates checkout sessions, registering customers on first use
pub struct CheckoutSessionBuilder {
    provider: Arc<dyn BillingProvider>,
    directory: Arc<dyn CustomerDirectory>,
    tax_policy: TaxPolicy,
    redirects: RedirectUrls,
    /// Serializes customer creation per email so one email maps to one customer
    creation_locks: CreationLocks,
}

impl CheckoutSessionBuilder {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        directory: Arc<dyn CustomerDirectory>,
        tax_policy: TaxPolicy,
        redirects: RedirectUrls,
    ) -> Self {
        Self {
            provider,
            directory,
            tax_policy,
            redirects,
            creation_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Return the customer for an email, creating one at the provider if needed
    pub async fn resolve_customer(&self, email: &str) -> Result<String> {
        if let Some(customer_id) = self.directory.get(email) {
            return Ok(customer_id);
        }

        let slot = CreationSlot::acquire(&self.creation_locks, email);
        let _guard = slot.lock.lock().await;

        // Another request may have created it while we waited
        if let Some(customer_id) = self.directory.get(email) {
            return Ok(customer_id);
        }

        let customer = self.provider.create_customer(email).await?;
        tracing::info!(customer_id = %customer.id, "Created Stripe customer");
        Ok(self.directory.insert(email, &customer.id))
    }

    /// Create a hosted checkout session and return its URL
    pub async fn create_session(&self, request: &CheckoutRequest) -> Result<CreatedCheckout> {
        let country = request.validate()?;
        let customer_id = self.resolve_customer(&request.email).await?;

        let treatment = self.tax_policy.treatment(&country);
        tracing::debug!(country = %country, treatment = ?treatment, "Resolved tax treatment");

        let params = build_session_params(&customer_id, &request.price_id, &treatment, &self.redirects);
        let session = self.provider.create_checkout_session(&params).await?;

        let checkout_url = session
            .url
            .ok_or_else(|| PaymentError::upstream("Failed to create checkout session URL"))?;

        Ok(CreatedCheckout {
            session_id: session.id,
            checkout_url,
            customer_id,
        })
    }
}

/// Handle on one email's creation lock.
///
/// Dropping the last handle removes the map entry, including when the
/// request future is cancelled mid-creation.
struct CreationSlot<'a> {
    locks: &'a CreationLocks,
    email: String,
    lock: Arc<AsyncMutex<()>>,
}

impl<'a> CreationSlot<'a> {
    fn acquire(locks: &'a CreationLocks, email: &str) -> Self {
        let lock = locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(email.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        Self {
            locks,
            email: email.to_string(),
            lock,
        }
    }
}

impl Drop for CreationSlot<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Handles are only cloned under the map lock, so the count is stable here
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.email);
        }
    }
}
