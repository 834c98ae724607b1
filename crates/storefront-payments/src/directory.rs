//! Customer Directory
//!
//! Maps a shopper's email to the Stripe customer created for it. Entries live
//! for the lifetime of the process.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{PaymentError, Result};

/// Customer directory storage trait
pub trait CustomerDirectory: Send + Sync {
    /// Look up the customer id recorded for an email
    fn get(&self, email: &str) -> Option<String>;

    /// Record a customer id for an email.
    ///
    /// Returns the id that ends up stored: an existing entry is kept, so the
    /// first recorded customer wins.
    fn insert(&self, email: &str, customer_id: &str) -> String;

    /// Number of known emails
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve an email or fail with the lookup-miss error the API exposes
    fn customer_id(&self, email: &str) -> Result<String> {
        if email.trim().is_empty() {
            return Err(PaymentError::validation("email is required"));
        }
        self.get(email)
            .ok_or_else(|| PaymentError::NotFound("No customer_id found for this email".into()))
    }
}

/// In-memory customer directory
#[derive(Default)]
pub struct MemoryCustomerDirectory {
    by_email: RwLock<HashMap<String, String>>,
}

impl MemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CustomerDirectory for MemoryCustomerDirectory {
    fn get(&self, email: &str) -> Option<String> {
        let by_email = self.by_email.read().unwrap_or_else(PoisonError::into_inner);
        by_email.get(email).cloned()
    }

    fn insert(&self, email: &str, customer_id: &str) -> String {
        let mut by_email = self.by_email.write().unwrap_or_else(PoisonError::into_inner);
        by_email
            .entry(email.to_string())
            .or_insert_with(|| customer_id.to_string())
            .clone()
    }

    fn len(&self) -> usize {
        self.by_email.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
