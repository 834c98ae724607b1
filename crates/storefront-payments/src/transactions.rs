//! Customer transaction history

use std::sync::Arc;

use crate::error::{PaymentError, Result};
use crate::provider::{BillingProvider, Charge};

/// Largest page Stripe returns for a list call
pub const MAX_CHARGES_PER_PAGE: u8 = 100;

pub struct TransactionLister {
    provider: Arc<dyn BillingProvider>,
}

impl TransactionLister {
    pub fn new(provider: Arc<dyn BillingProvider>) -> Self {
        Self { provider }
    }

    /// Most recent charges for a customer, newest first, single page only
    pub async fn list(&self, customer_id: &str) -> Result<Vec<Charge>> {
        if customer_id.trim().is_empty() {
            return Err(PaymentError::validation("customer_id is required"));
        }
        self.provider.list_charges(customer_id, MAX_CHARGES_PER_PAGE).await
    }
}
