//! In-memory Billing Provider
//!
//! For tests and local demos. Keeps customers, catalog, subscriptions and
//! charges in process memory and records every call it receives.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{
    BillingProvider, Charge, CheckoutSession, Customer, Price, Product, Subscription,
    SubscriptionUpdate,
};
use crate::checkout::CheckoutSessionParams;
use crate::error::{PaymentError, Result};

/// A call received by [`MemoryBillingProvider`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderCall {
    CreateCustomer { email: String },
    ListProducts,
    ListPrices,
    CreateCheckoutSession(CheckoutSessionParams),
    RetrieveSubscription { subscription_id: String },
    UpdateSubscription {
        subscription_id: String,
        update: SubscriptionUpdate,
    },
    ListCharges { customer_id: String, limit: u8 },
}

#[derive(Default)]
struct State {
    customers: Vec<Customer>,
    products: Vec<Product>,
    prices: Vec<Price>,
    subscriptions: HashMap<String, Subscription>,
    charges: Vec<(String, Charge)>,
    sessions: u32,
    omit_session_url: bool,
    failure: Option<String>,
    calls: Vec<ProviderCall>,
}

/// In-memory billing provider
#[derive(Default)]
pub struct MemoryBillingProvider {
    state: Mutex<State>,
}

impl MemoryBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(self, products: Vec<Product>) -> Self {
        self.state().products = products;
        self
    }

    pub fn with_prices(self, prices: Vec<Price>) -> Self {
        self.state().prices = prices;
        self
    }

    pub fn with_subscription(self, subscription: Subscription) -> Self {
        self.state()
            .subscriptions
            .insert(subscription.id.clone(), subscription);
        self
    }

    /// Add a charge billed to `customer_id`; newer charges go last
    pub fn with_charge(self, customer_id: &str, charge: Charge) -> Self {
        self.state().charges.push((customer_id.to_string(), charge));
        self
    }

    /// Make every subsequent call fail with this provider message
    pub fn fail_with(&self, message: impl Into<String>) {
        self.state().failure = Some(message.into());
    }

    /// Return checkout sessions without a URL
    pub fn omit_session_url(&self) {
        self.state().omit_session_url = true;
    }

    /// Calls received so far, oldest first
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state().calls.clone()
    }

    pub fn customers(&self) -> Vec<Customer> {
        self.state().customers.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call, then fail if a failure was injected
    fn record(&self, call: ProviderCall) -> Result<MutexGuard<'_, State>> {
        let mut state = self.state();
        state.calls.push(call);
        match &state.failure {
            Some(message) => Err(PaymentError::upstream(message.clone())),
            None => Ok(state),
        }
    }
}

fn no_such(kind: &str, id: &str) -> PaymentError {
    PaymentError::upstream(format!("No such {kind}: '{id}'"))
}

#[async_trait]
impl BillingProvider for MemoryBillingProvider {
    async fn create_customer(&self, email: &str) -> Result<Customer> {
        // Give concurrent callers a chance to interleave, like a network hop would
        tokio::task::yield_now().await;

        let mut state = self.record(ProviderCall::CreateCustomer {
            email: email.to_string(),
        })?;
        let customer = Customer {
            id: format!("cus_mem_{}", state.customers.len() + 1),
            email: Some(email.to_string()),
        };
        state.customers.push(customer.clone());
        Ok(customer)
    }

    async fn list_active_products(&self) -> Result<Vec<Product>> {
        let state = self.record(ProviderCall::ListProducts)?;
        Ok(state.products.iter().filter(|p| p.active).cloned().collect())
    }

    async fn list_active_prices(&self) -> Result<Vec<Price>> {
        let state = self.record(ProviderCall::ListPrices)?;
        Ok(state.prices.iter().filter(|p| p.active).cloned().collect())
    }

    async fn create_checkout_session(&self, params: &CheckoutSessionParams) -> Result<CheckoutSession> {
        let mut state = self.record(ProviderCall::CreateCheckoutSession(params.clone()))?;
        state.sessions += 1;
        let id = format!("cs_mem_{}", state.sessions);
        let url = (!state.omit_session_url).then(|| format!("https://checkout.example.test/c/{id}"));
        Ok(CheckoutSession { id, url })
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Subscription> {
        let state = self.record(ProviderCall::RetrieveSubscription {
            subscription_id: subscription_id.to_string(),
        })?;
        state
            .subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| no_such("subscription", subscription_id))
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: &SubscriptionUpdate,
    ) -> Result<Subscription> {
        let mut state = self.record(ProviderCall::UpdateSubscription {
            subscription_id: subscription_id.to_string(),
            update: update.clone(),
        })?;

        let new_price = match update {
            SubscriptionUpdate::ReplaceItemPrice { price_id, .. } => Some(
                state
                    .prices
                    .iter()
                    .find(|p| &p.id == price_id)
                    .cloned()
                    .ok_or_else(|| no_such("price", price_id))?,
            ),
            SubscriptionUpdate::CancelAtPeriodEnd => None,
        };

        let subscription = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| no_such("subscription", subscription_id))?;

        match (update, new_price) {
            (SubscriptionUpdate::ReplaceItemPrice { item_id, .. }, Some(price)) => {
                let item = subscription
                    .items
                    .iter_mut()
                    .find(|item| &item.id == item_id)
                    .ok_or_else(|| no_such("subscription item", item_id))?;
                item.price = price;
            }
            _ => subscription.cancel_at_period_end = true,
        }

        Ok(subscription.clone())
    }

    async fn list_charges(&self, customer_id: &str, limit: u8) -> Result<Vec<Charge>> {
        let state = self.record(ProviderCall::ListCharges {
            customer_id: customer_id.to_string(),
            limit,
        })?;
        Ok(state
            .charges
            .iter()
            .rev()
            .filter(|(owner, _)| owner == customer_id)
            .take(usize::from(limit))
            .map(|(_, charge)| charge.clone())
            .collect())
    }

    fn name(&self) -> &str {
        "MemoryBilling"
    }
}
