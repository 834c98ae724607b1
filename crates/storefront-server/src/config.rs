//! Server Configuration
//!
//! Read from the process environment (after `.env` is loaded). Only the
//! Stripe secret key is mandatory; everything else has a default.

use std::fmt;

use storefront_payments::provider::{DEFAULT_API_BASE, DEFAULT_API_VERSION};
use storefront_payments::tax::{parse_country_list, parse_rate_map};
use storefront_payments::{PaymentError, Result, TaxPolicy};

const DEFAULT_APP_URL: &str = "http://localhost:3000";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_STATIC_DIR: &str = "static";

#[derive(Clone)]
pub struct Config {
    pub stripe_secret_key: String,
    /// Checked per webhook request, not at startup
    pub webhook_secret: Option<String>,
    /// Base for checkout redirect URLs, without trailing slash
    pub public_app_url: String,
    pub stripe_api_base: String,
    pub stripe_api_version: String,
    pub tax_policy: TaxPolicy,
    pub bind_addr: String,
    pub static_dir: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("stripe_secret_key", &"<redacted>")
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("public_app_url", &self.public_app_url)
            .field("stripe_api_base", &self.stripe_api_base)
            .field("stripe_api_version", &self.stripe_api_version)
            .field("tax_policy", &self.tax_policy)
            .field("bind_addr", &self.bind_addr)
            .field("static_dir", &self.static_dir)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let stripe_secret_key = var("STRIPE_SECRET_KEY").ok_or_else(|| {
            PaymentError::Config("STRIPE_SECRET_KEY is not set in environment variables".into())
        })?;

        let defaults = TaxPolicy::default();
        let tax_policy = match (var("TAX_AUTOMATIC_COUNTRIES"), var("TAX_MANUAL_RATES")) {
            (None, None) => defaults,
            (automatic, manual) => {
                let automatic = match automatic {
                    Some(raw) => parse_country_list(&raw),
                    None => defaults.automatic_countries().map(str::to_string).collect(),
                };
                let manual = match manual {
                    Some(raw) => parse_rate_map(&raw)?,
                    None => defaults
                        .manual_rates()
                        .map(|(country, rate)| (country.to_string(), rate.to_string()))
                        .collect(),
                };
                TaxPolicy::new(automatic, manual)?
            }
        };

        Ok(Self {
            stripe_secret_key,
            webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            public_app_url: var("PUBLIC_APP_URL")
                .unwrap_or_else(|| DEFAULT_APP_URL.into())
                .trim_end_matches('/')
                .to_string(),
            stripe_api_base: var("STRIPE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.into()),
            stripe_api_version: var("STRIPE_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.into()),
            tax_policy,
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            static_dir: var("STATIC_DIR").unwrap_or_else(|| DEFAULT_STATIC_DIR.into()),
        })
    }
}
