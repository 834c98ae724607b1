//! # storefront-payments
//!
//! Stripe plumbing for a subscription storefront. All billing work (pricing,
//! tax, subscription lifecycle, payment processing) happens at Stripe; this
//! crate validates input, shapes provider requests and trims provider
//! responses down to what the browser client needs.
//!
//! ## Checkout flow
//!
//! ```text
//! ┌─────────────┐  email, country,  ┌──────────────────┐     ┌─────────────────┐
//! │  Storefront │──── price_id ────▶│ Checkout builder │────▶│  Stripe Hosted  │
//! │    (UI)     │◀── checkout_url ──│ directory + tax  │     │  Checkout Page  │
//! └─────────────┘                   └──────────────────┘     └─────────────────┘
//! ```
//!
//! The tax treatment of a session is picked per billing country:
//!
//! - **Automatic**: Stripe Tax computes tax from the collected address
//! - **Manual rate**: a pre-created tax rate is attached to the line item
//! - **No tax**: the line item carries an explicitly empty tax rate list
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use storefront_payments::{
//!     CheckoutRequest, CheckoutSessionBuilder, MemoryCustomerDirectory, RedirectUrls,
//!     StripeClient, TaxPolicy,
//! };
//!
//! let stripe = Arc::new(StripeClient::new("sk_test_xxx")?);
//! let checkout = CheckoutSessionBuilder::new(
//!     stripe,
//!     Arc::new(MemoryCustomerDirectory::new()),
//!     TaxPolicy::default(),
//!     RedirectUrls::from_base("https://shop.example.com"),
//! );
//!
//! let session = checkout
//!     .create_session(&CheckoutRequest::new("price_123", "user@example.com", "US"))
//!     .await?;
//!
//! // Redirect user to: session.checkout_url
//! ```

pub mod catalog;
pub mod checkout;
pub mod directory;
pub mod error;
pub mod provider;
pub mod subscription;
pub mod tax;
pub mod transactions;
pub mod webhook;

pub use catalog::{CatalogProduct, CatalogReader};
pub use checkout::{CheckoutRequest, CheckoutSessionBuilder, CreatedCheckout, RedirectUrls};
pub use directory::{CustomerDirectory, MemoryCustomerDirectory};
pub use error::{PaymentError, Result};
pub use provider::{
    BillingProvider, Charge, MemoryBillingProvider, Price, Product, StripeClient, Subscription,
};
pub use subscription::SubscriptionManager;
pub use tax::{TaxPolicy, TaxTreatment};
pub use transactions::TransactionLister;
pub use webhook::{Dispatch, WebhookEvent, WebhookIntake};
