//! Subscription Management
//!
//! Pass-through operations on subscriptions owned by the provider.

use std::sync::Arc;

use crate::error::{PaymentError, Result};
use crate::provider::{BillingProvider, Subscription, SubscriptionUpdate};

pub struct SubscriptionManager {
    provider: Arc<dyn BillingProvider>,
}

impl SubscriptionManager {
    pub fn new(provider: Arc<dyn BillingProvider>) -> Self {
        Self { provider }
    }

    /// Stop renewal at the end of the current period; access continues until then
    pub async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<Subscription> {
        if subscription_id.trim().is_empty() {
            return Err(PaymentError::validation("subscription_id is required"));
        }

        let subscription = self
            .provider
            .update_subscription(subscription_id, &SubscriptionUpdate::CancelAtPeriodEnd)
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            status = %subscription.status,
            "Subscription set to cancel at period end"
        );
        Ok(subscription)
    }

    /// Move the subscription to a different price.
    ///
    /// Only the first line item is replaced; the provider prorates by default.
    pub async fn change_price(&self, subscription_id: &str, new_price_id: &str) -> Result<Subscription> {
        if subscription_id.trim().is_empty() || new_price_id.trim().is_empty() {
            return Err(PaymentError::validation(
                "subscription_id and new_price_id are required",
            ));
        }

        let current = self.provider.retrieve_subscription(subscription_id).await?;
        let item = current
            .items
            .first()
            .ok_or_else(|| PaymentError::upstream("Subscription has no items"))?;

        if current.items.len() > 1 {
            tracing::warn!(
                subscription_id = %current.id,
                items = current.items.len(),
                "Subscription has several items, only the first is repriced"
            );
        }

        let update = SubscriptionUpdate::ReplaceItemPrice {
            item_id: item.id.clone(),
            price_id: new_price_id.to_string(),
        };
        let updated = self.provider.update_subscription(subscription_id, &update).await?;

        tracing::info!(
            subscription_id = %updated.id,
            price_id = %new_price_id,
            "Subscription price changed"
        );
        Ok(updated)
    }
}
