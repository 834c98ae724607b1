//! Stripe Webhook Handling
//!
//! Verifies the `stripe-signature` header over the raw request body, decodes
//! the event envelope and routes it through a table of per-type handlers.
//! Handlers only log; nothing here mutates local state.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use crate::error::{PaymentError, Result};

/// Header carrying the webhook signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a signed timestamp, matching Stripe's libraries
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// Decoded event envelope
#[derive(Clone, Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: String,

    /// Event type tag, e.g. `invoice.paid`
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub created: i64,

    #[serde(default)]
    pub livemode: bool,

    pub data: EventData,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EventData {
    /// The Stripe object the event is about, left undecoded
    pub object: Value,
}

impl WebhookEvent {
    /// String field of `data.object`, if present
    pub fn object_str(&self, field: &str) -> Option<&str> {
        self.data.object.get(field).and_then(Value::as_str)
    }

    /// Integer field of `data.object`, if present
    pub fn object_i64(&self, field: &str) -> Option<i64> {
        self.data.object.get(field).and_then(Value::as_i64)
    }
}

/// Outcome of routing an event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// A registered handler ran
    Handled(String),
    /// No handler for this type; logged and acknowledged anyway
    Unhandled(String),
}

/// Handler for one event type
pub type EventHandler = fn(&WebhookEvent);

/// Webhook intake: signature check, decoding and dispatch
pub struct WebhookIntake {
    secret: Option<String>,
    tolerance_secs: i64,
    handlers: HashMap<&'static str, EventHandler>,
}

impl WebhookIntake {
    /// Intake with the default handler table.
    ///
    /// A missing secret is only reported when a webhook actually arrives.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.trim().is_empty()),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            handlers: default_handlers(),
        }
    }

    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Register or replace the handler for an event type
    pub fn register(&mut self, event_type: &'static str, handler: EventHandler) {
        self.handlers.insert(event_type, handler);
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn handles(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    /// Verify, decode and dispatch a webhook delivery
    pub fn process(&self, payload: &[u8], signature: Option<&str>) -> Result<Dispatch> {
        self.process_at(payload, signature, chrono::Utc::now().timestamp())
    }

    /// [`process`](Self::process) with an explicit "now" (unix seconds)
    pub fn process_at(&self, payload: &[u8], signature: Option<&str>, now: i64) -> Result<Dispatch> {
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| PaymentError::validation("Missing stripe-signature header"))?;

        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| PaymentError::Config("Webhook secret not configured".into()))?;

        verify_signature(payload, signature, secret, now, self.tolerance_secs)?;

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::validation(format!("Webhook Error: invalid event payload: {e}")))?;

        Ok(self.dispatch(&event))
    }

    /// Route an already-verified event to its handler
    pub fn dispatch(&self, event: &WebhookEvent) -> Dispatch {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            livemode = event.livemode,
            "Processing Stripe webhook"
        );

        match self.handlers.get(event.event_type.as_str()) {
            Some(handler) => {
                handler(event);
                Dispatch::Handled(event.event_type.clone())
            }
            None => {
                tracing::debug!(event_type = %event.event_type, "Unhandled webhook event");
                Dispatch::Unhandled(event.event_type.clone())
            }
        }
    }
}

/// Check a `t=…,v1=…` signature header against the raw payload
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        if let Some((key, value)) = part.trim().split_once('=') {
            match key {
                "t" => timestamp = value.parse::<i64>().ok(),
                "v1" => signatures.push(value),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        PaymentError::Signature("Unable to extract timestamp and signatures from header".into())
    })?;
    if signatures.is_empty() {
        return Err(PaymentError::Signature(
            "No signatures found with expected scheme".into(),
        ));
    }

    let mac = signed_payload_mac(payload, secret, timestamp)?;
    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if !matched {
        return Err(PaymentError::Signature(
            "No signatures found matching the expected signature for payload".into(),
        ));
    }

    if tolerance_secs > 0 && now.saturating_sub(timestamp) > tolerance_secs {
        return Err(PaymentError::Signature("Timestamp outside the tolerance zone".into()));
    }

    Ok(())
}

/// Produce a valid signature header for a payload, as Stripe would send it
pub fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let mac = signed_payload_mac(payload, secret, timestamp)?;
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

fn signed_payload_mac(payload: &[u8], secret: &str, timestamp: i64) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Config(format!("Invalid webhook secret: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

fn default_handlers() -> HashMap<&'static str, EventHandler> {
    let table: [(&'static str, EventHandler); 11] = [
        ("checkout.session.completed", on_checkout_completed),
        ("payment_intent.succeeded", on_payment_intent_succeeded),
        ("payment_intent.payment_failed", on_payment_intent_failed),
        ("charge.succeeded", on_charge_succeeded),
        ("charge.failed", on_charge_failed),
        ("customer.subscription.created", on_subscription_created),
        ("customer.subscription.updated", on_subscription_updated),
        ("customer.subscription.deleted", on_subscription_deleted),
        ("invoice.paid", on_invoice_paid),
        ("invoice.payment_failed", on_invoice_payment_failed),
        ("invoice.upcoming", on_invoice_upcoming),
    ];
    table.into_iter().collect()
}

fn on_checkout_completed(event: &WebhookEvent) {
    tracing::info!(
        session_id = ?event.object_str("id"),
        customer_id = ?event.object_str("customer"),
        subscription_id = ?event.object_str("subscription"),
        "Checkout session completed"
    );
}

fn on_payment_intent_succeeded(event: &WebhookEvent) {
    tracing::info!(
        payment_intent = ?event.object_str("id"),
        amount = ?event.object_i64("amount"),
        currency = ?event.object_str("currency"),
        "Payment intent succeeded"
    );
}

fn on_payment_intent_failed(event: &WebhookEvent) {
    let reason = event
        .data
        .object
        .pointer("/last_payment_error/message")
        .and_then(Value::as_str);
    tracing::warn!(
        payment_intent = ?event.object_str("id"),
        reason = ?reason,
        "Payment intent failed"
    );
}

fn on_charge_succeeded(event: &WebhookEvent) {
    tracing::info!(
        charge_id = ?event.object_str("id"),
        customer_id = ?event.object_str("customer"),
        amount = ?event.object_i64("amount"),
        "Charge succeeded"
    );
}

fn on_charge_failed(event: &WebhookEvent) {
    tracing::warn!(
        charge_id = ?event.object_str("id"),
        customer_id = ?event.object_str("customer"),
        failure = ?event.object_str("failure_message"),
        "Charge failed"
    );
}

fn on_subscription_created(event: &WebhookEvent) {
    tracing::info!(
        subscription_id = ?event.object_str("id"),
        customer_id = ?event.object_str("customer"),
        status = ?event.object_str("status"),
        "Subscription created"
    );
}

fn on_subscription_updated(event: &WebhookEvent) {
    let cancel_at_period_end = event
        .data
        .object
        .get("cancel_at_period_end")
        .and_then(Value::as_bool);
    tracing::info!(
        subscription_id = ?event.object_str("id"),
        status = ?event.object_str("status"),
        cancel_at_period_end = ?cancel_at_period_end,
        "Subscription updated"
    );
}

fn on_subscription_deleted(event: &WebhookEvent) {
    tracing::info!(
        subscription_id = ?event.object_str("id"),
        customer_id = ?event.object_str("customer"),
        "Subscription deleted"
    );
}

fn on_invoice_paid(event: &WebhookEvent) {
    tracing::info!(
        invoice_id = ?event.object_str("id"),
        customer_id = ?event.object_str("customer"),
        amount_paid = ?event.object_i64("amount_paid"),
        "Invoice paid"
    );
}

fn on_invoice_payment_failed(event: &WebhookEvent) {
    tracing::warn!(
        invoice_id = ?event.object_str("id"),
        customer_id = ?event.object_str("customer"),
        email = ?event.object_str("customer_email"),
        "Invoice payment failed"
    );
}

fn on_invoice_upcoming(event: &WebhookEvent) {
    tracing::info!(
        customer_id = ?event.object_str("customer"),
        amount_due = ?event.object_i64("amount_due"),
        "Invoice upcoming"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_750_000_000;

    fn payload(event_type: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": "evt_1",
            "object": "event",
            "type": event_type,
            "created": NOW,
            "livemode": false,
            "data": {"object": {"id": "obj_1", "customer": "cus_1"}}
        }))
        .unwrap()
    }

    fn intake() -> WebhookIntake {
        WebhookIntake::new(Some(SECRET.to_string()))
    }

    fn signed(body: &[u8]) -> String {
        signature_header(body, SECRET, NOW).unwrap()
    }

    #[test]
    fn test_allowlisted_event_is_handled() {
        let body = payload("invoice.paid");
        let dispatch = intake().process_at(&body, Some(&signed(&body)), NOW).unwrap();
        assert_eq!(dispatch, Dispatch::Handled("invoice.paid".into()));
    }

    #[test]
    fn test_unknown_event_is_acknowledged() {
        let body = payload("customer.tax_id.created");
        let dispatch = intake().process_at(&body, Some(&signed(&body)), NOW).unwrap();
        assert_eq!(dispatch, Dispatch::Unhandled("customer.tax_id.created".into()));
    }

    #[test]
    fn test_full_allowlist_registered() {
        let intake = intake();
        for event_type in [
            "checkout.session.completed",
            "payment_intent.succeeded",
            "payment_intent.payment_failed",
            "charge.succeeded",
            "charge.failed",
            "customer.subscription.created",
            "customer.subscription.updated",
            "customer.subscription.deleted",
            "invoice.paid",
            "invoice.payment_failed",
            "invoice.upcoming",
        ] {
            assert!(intake.handles(event_type), "{event_type} not registered");
        }
        assert!(!intake.handles("customer.created"));
    }

    #[test]
    fn test_missing_header_checked_before_secret() {
        let body = payload("invoice.paid");
        let err = WebhookIntake::new(None).process_at(&body, None, NOW).unwrap_err();
        assert_eq!(err, PaymentError::validation("Missing stripe-signature header"));
    }

    #[test]
    fn test_missing_secret() {
        let body = payload("invoice.paid");
        let err = WebhookIntake::new(None)
            .process_at(&body, Some(&signed(&body)), NOW)
            .unwrap_err();
        assert_eq!(err, PaymentError::Config("Webhook secret not configured".into()));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let body = payload("invoice.paid");
        let header = signed(&body);
        let tampered = payload("charge.succeeded");

        let err = intake().process_at(&tampered, Some(&header), NOW).unwrap_err();
        assert!(matches!(err, PaymentError::Signature(_)));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let body = payload("invoice.paid");
        let header = signature_header(&body, "whsec_other", NOW).unwrap();
        let err = intake().process_at(&body, Some(&header), NOW).unwrap_err();
        assert!(matches!(err, PaymentError::Signature(_)));
    }

    #[test]
    fn test_malformed_headers_are_rejected() {
        let body = payload("invoice.paid");
        for header in ["garbage", "t=abc,v1=00", "t=1750000000", "v1=deadbeef", "t=1750000000,v1=not-hex"] {
            let err = intake().process_at(&body, Some(header), NOW).unwrap_err();
            assert!(matches!(err, PaymentError::Signature(_)), "{header} accepted");
        }
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let body = payload("invoice.paid");
        let header = signed(&body);
        let later = NOW + DEFAULT_TOLERANCE_SECS + 1;

        let err = intake().process_at(&body, Some(&header), later).unwrap_err();
        assert_eq!(err, PaymentError::Signature("Timestamp outside the tolerance zone".into()));

        assert!(intake().with_tolerance(0).process_at(&body, Some(&header), later).is_ok());
    }

    #[test]
    fn test_extreme_timestamp_is_rejected_without_overflow() {
        let body = payload("invoice.paid");
        let header = signature_header(&body, SECRET, i64::MIN).unwrap();

        let err = intake().process_at(&body, Some(&header), NOW).unwrap_err();
        assert_eq!(err, PaymentError::Signature("Timestamp outside the tolerance zone".into()));
    }

    #[test]
    fn test_any_matching_v1_signature_passes() {
        let body = payload("invoice.paid");
        let good = signed(&body);
        let good_sig = good.split_once(",v1=").unwrap().1;
        let header = format!("t={NOW},v1={},v1={good_sig}", "0".repeat(64));

        assert!(verify_signature(&body, &header, SECRET, NOW, DEFAULT_TOLERANCE_SECS).is_ok());
    }

    #[test]
    fn test_signed_garbage_is_validation_error() {
        let body = b"not json".to_vec();
        let err = intake().process_at(&body, Some(&signed(&body)), NOW).unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)));
    }

    #[test]
    fn test_register_custom_handler() {
        fn noop(_: &WebhookEvent) {}

        let mut intake = intake();
        intake.register("customer.created", noop);
        let body = payload("customer.created");
        let dispatch = intake.process_at(&body, Some(&signed(&body)), NOW).unwrap();
        assert_eq!(dispatch, Dispatch::Handled("customer.created".into()));
    }
}
