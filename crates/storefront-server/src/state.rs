//! Application State

use std::sync::Arc;

use storefront_payments::{
    BillingProvider, CatalogReader, CheckoutSessionBuilder, CustomerDirectory,
    MemoryCustomerDirectory, RedirectUrls, SubscriptionManager, TaxPolicy, TransactionLister,
    WebhookIntake,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Payment provider (Stripe, or in-memory for tests)
    pub provider: Arc<dyn BillingProvider>,

    /// Email → customer id, shared with the checkout builder
    pub directory: Arc<dyn CustomerDirectory>,

    pub checkout: Arc<CheckoutSessionBuilder>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub transactions: Arc<TransactionLister>,
    pub catalog: Arc<CatalogReader>,
    pub webhooks: Arc<WebhookIntake>,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        tax_policy: TaxPolicy,
        public_app_url: &str,
        webhook_secret: Option<String>,
    ) -> Self {
        let directory: Arc<dyn CustomerDirectory> = Arc::new(MemoryCustomerDirectory::new());

        let checkout = CheckoutSessionBuilder::new(
            provider.clone(),
            directory.clone(),
            tax_policy,
            RedirectUrls::from_base(public_app_url),
        );

        Self {
            checkout: Arc::new(checkout),
            subscriptions: Arc::new(SubscriptionManager::new(provider.clone())),
            transactions: Arc::new(TransactionLister::new(provider.clone())),
            catalog: Arc::new(CatalogReader::new(provider.clone())),
            webhooks: Arc::new(WebhookIntake::new(webhook_secret)),
            directory,
            provider,
        }
    }
}
