//! Stripe adapter
//!
//! Checkout goes through Checkout Sessions (form-encoded API). Webhook events
//! are signed with `Stripe-Signature: t=...,v1=...`, an HMAC-SHA256 over
//! `{t}.{payload}` with the endpoint secret. See
//! https://stripe.com/docs/webhooks/signatures

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument};

use core_kernel::{Currency, Money, PortError};

use super::{
    credential, ensure_success, http_error, verify_hmac_sha256, CheckoutRequest, CheckoutSession,
    GatewayAdapter,
};
use crate::error::PaymentError;
use crate::gateway::{GatewayType, JsonMap, PaymentGateway};
use crate::webhook::{GatewayNotification, NotificationOutcome, ReportedAmount, WebhookRequest};

const PROVIDER: &str = "Stripe";

/// Sessions may expire between 30 minutes and 24 hours after creation
const MIN_SESSION_TTL_SECS: i64 = 30 * 60;
const MAX_SESSION_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StripeConfig {
    pub api_base_url: String,
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
    /// Maximum accepted age of a signed event
    pub tolerance_secs: i64,
    pub timeout_secs: u64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.stripe.com".to_string(),
            secret_key: None,
            webhook_secret: None,
            success_url: None,
            cancel_url: None,
            tolerance_secs: 300,
            timeout_secs: 15,
        }
    }
}

/// Minimal Stripe client built on reqwest
pub struct StripeAdapter {
    http: reqwest::Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: Option<String>,
    #[serde(rename = "type")]
    type_: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: Value,
}

impl StripeAdapter {
    pub fn new(config: StripeConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, config }
    }

    /// Form fields for `POST /v1/checkout/sessions`
    pub fn session_form(
        &self,
        gateway: &PaymentGateway,
        request: &CheckoutRequest,
    ) -> Result<Vec<(String, String)>, PortError> {
        let success_url = credential(gateway, "success_url", self.config.success_url.as_deref())
            .ok_or_else(|| PortError::validation_field("Stripe success_url is not configured", "success_url"))?;
        let unit_amount = request
            .amount
            .to_minor()
            .map_err(|e| PortError::validation_field(e.to_string(), "amount"))?;

        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("success_url".into(), success_url.to_string()),
            ("customer_email".into(), request.payer_email.clone()),
            ("client_reference_id".into(), request.transaction_id.clone()),
            (
                "line_items[0][price_data][currency]".into(),
                request.amount.currency().code().to_ascii_lowercase(),
            ),
            ("line_items[0][price_data][unit_amount]".into(), unit_amount.to_string()),
            ("line_items[0][price_data][product_data][name]".into(), request.title.clone()),
            ("line_items[0][quantity]".into(), "1".into()),
            ("metadata[transaction_id]".into(), request.transaction_id.clone()),
            ("metadata[quote_id]".into(), request.quote_id.as_uuid().to_string()),
            (
                "payment_intent_data[metadata][transaction_id]".into(),
                request.transaction_id.clone(),
            ),
        ];

        if let Some(cancel_url) = credential(gateway, "cancel_url", self.config.cancel_url.as_deref()) {
            form.push(("cancel_url".into(), cancel_url.to_string()));
        }

        if let Some(expires_at) = request.expires_at {
            let ttl = (expires_at - Utc::now()).num_seconds();
            if (MIN_SESSION_TTL_SECS..=MAX_SESSION_TTL_SECS).contains(&ttl) {
                form.push(("expires_at".into(), expires_at.timestamp().to_string()));
            }
        }

        Ok(form)
    }
}

#[async_trait]
impl GatewayAdapter for StripeAdapter {
    fn gateway_type(&self) -> GatewayType {
        GatewayType::Stripe
    }

    #[instrument(skip(self, gateway, request), fields(transaction_id = %request.transaction_id))]
    async fn create_checkout(
        &self,
        gateway: &PaymentGateway,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PortError> {
        let secret_key = credential(gateway, "secret_key", self.config.secret_key.as_deref())
            .ok_or_else(|| PortError::validation_field("Stripe secret key is not configured", "secret_key"))?;
        let form = self.session_form(gateway, request)?;

        let resp = self
            .http
            .post(format!(
                "{}/v1/checkout/sessions",
                self.config.api_base_url.trim_end_matches('/')
            ))
            .bearer_auth(secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| http_error("create checkout session", e))?;
        let resp = ensure_success(PROVIDER, resp, "create checkout session").await?;

        let raw: Value = resp
            .json()
            .await
            .map_err(|e| http_error("decode checkout session", e))?;

        let preference_id = raw
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PortError::internal("Stripe checkout session has no id"))?;
        let payment_url = raw
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PortError::internal("Stripe Checkout session URL is missing"))?;
        debug!(session_id = %preference_id, "Stripe checkout session created");

        Ok(CheckoutSession {
            payment_url,
            sandbox_url: None,
            preference_id,
            raw,
        })
    }

    fn verify_signature(
        &self,
        gateway: &PaymentGateway,
        request: &WebhookRequest,
    ) -> Result<(), PaymentError> {
        let secret = credential(gateway, "webhook_secret", self.config.webhook_secret.as_deref())
            .ok_or_else(|| PaymentError::verification("Stripe webhook secret is not configured"))?;
        let header = request
            .header("stripe-signature")
            .ok_or_else(|| PaymentError::verification("Missing Stripe-Signature header"))?;

        verify_stripe_signature(
            secret,
            request.body(),
            header,
            Utc::now().timestamp(),
            self.config.tolerance_secs,
        )
    }

    async fn resolve_notification(
        &self,
        _gateway: &PaymentGateway,
        request: &WebhookRequest,
    ) -> Result<GatewayNotification, PaymentError> {
        let event: StripeEvent = serde_json::from_slice(request.body())
            .map_err(|e| PaymentError::verification(format!("Malformed Stripe event: {}", e)))?;
        let raw = request.json_body()?;
        Ok(parse_event(event, raw))
    }
}

/// Checks a `Stripe-Signature` header against the raw payload
///
/// Any `v1` entry may match (Stripe sends several during secret rotation).
pub fn verify_stripe_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now_ts: i64,
    tolerance_secs: i64,
) -> Result<(), PaymentError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        if let Some(rest) = part.trim().strip_prefix("t=") {
            timestamp = Some(rest);
        } else if let Some(rest) = part.trim().strip_prefix("v1=") {
            signatures.push(rest);
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| PaymentError::verification("missing timestamp in stripe-signature"))?;
    if signatures.is_empty() {
        return Err(PaymentError::verification("missing v1 in stripe-signature"));
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| PaymentError::verification("invalid timestamp in stripe-signature"))?;
    if (now_ts - ts).abs() > tolerance_secs {
        return Err(PaymentError::verification("stripe-signature timestamp outside tolerance"));
    }

    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    if signatures
        .iter()
        .any(|sig| verify_hmac_sha256(secret, &signed_payload, sig).is_ok())
    {
        Ok(())
    } else {
        Err(PaymentError::verification("invalid webhook signature"))
    }
}

fn parse_event(event: StripeEvent, raw: Value) -> GatewayNotification {
    let object = &event.data.object;
    let str_field = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);
    let metadata_ref = object
        .get("metadata")
        .and_then(|m| m.get("transaction_id"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let (transaction_ref, external_id, outcome, amount_key) = match event.type_.as_str() {
        "payment_intent.succeeded" => (
            metadata_ref,
            str_field("id"),
            NotificationOutcome::Approved,
            "amount_received",
        ),
        "payment_intent.payment_failed" => {
            let error = object.get("last_payment_error");
            let reason = error
                .and_then(|e| e.get("message").or_else(|| e.get("code")))
                .and_then(Value::as_str)
                .unwrap_or("payment_failed")
                .to_string();
            (metadata_ref, str_field("id"), NotificationOutcome::Rejected { reason }, "amount")
        }
        "payment_intent.canceled" => {
            let reason = str_field("cancellation_reason").unwrap_or_else(|| "canceled".to_string());
            (metadata_ref, str_field("id"), NotificationOutcome::Rejected { reason }, "amount")
        }
        "payment_intent.processing" => {
            (metadata_ref, str_field("id"), NotificationOutcome::Pending, "amount")
        }
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            let outcome = match object.get("payment_status").and_then(Value::as_str) {
                Some("paid") | Some("no_payment_required") => NotificationOutcome::Approved,
                _ => NotificationOutcome::Pending,
            };
            (
                str_field("client_reference_id").or(metadata_ref),
                str_field("payment_intent"),
                outcome,
                "amount_total",
            )
        }
        "checkout.session.async_payment_failed" => (
            str_field("client_reference_id").or(metadata_ref),
            str_field("payment_intent"),
            NotificationOutcome::Rejected { reason: "async_payment_failed".to_string() },
            "amount_total",
        ),
        "checkout.session.expired" => (
            str_field("client_reference_id").or(metadata_ref),
            str_field("payment_intent"),
            NotificationOutcome::Rejected { reason: "checkout_session_expired".to_string() },
            "amount_total",
        ),
        other => {
            debug!(event_type = %other, "Ignoring Stripe event");
            return GatewayNotification::ignored(raw);
        }
    };

    let amount = object
        .get(amount_key)
        .and_then(Value::as_i64)
        .zip(
            object
                .get("currency")
                .and_then(Value::as_str)
                .and_then(|c| Currency::from_str(c).ok()),
        )
        .map(|(minor, currency)| ReportedAmount {
            value: Money::from_minor(minor, currency).amount(),
            currency: Some(currency),
        });

    let mut details = JsonMap::new();
    details.insert("stripe_event_id".into(), json!(event.id));
    details.insert("stripe_event_type".into(), json!(event.type_));
    details.insert("payment_intent".into(), json!(external_id));
    details.insert("webhook_received_at".into(), json!(Utc::now().to_rfc3339()));

    GatewayNotification {
        transaction_ref,
        external_id,
        outcome,
        amount,
        details,
        raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::hmac_sha256_hex;
    use core_kernel::QuoteId;
    use rust_decimal_macros::dec;

    const SECRET: &str = "whsec_test";

    fn gateway() -> PaymentGateway {
        PaymentGateway::new("Stripe", GatewayType::Stripe)
            .with_config("secret_key", "sk_test_1")
            .with_config("webhook_secret", SECRET)
            .with_config("success_url", "https://condo.example/pagos/ok")
            .with_config("cancel_url", "https://condo.example/pagos/cancel")
    }

    fn sign(payload: &str, ts: i64) -> String {
        let sig = hmac_sha256_hex(SECRET, &format!("{}.{}", ts, payload)).unwrap();
        format!("t={},v1={}", ts, sig)
    }

    fn event_request(event: Value) -> WebhookRequest {
        let payload = event.to_string();
        let header = sign(&payload, Utc::now().timestamp());
        WebhookRequest::new(payload).with_header("Stripe-Signature", header)
    }

    // ========================================================================
    // Signatures
    // ========================================================================

    #[test]
    fn test_valid_signature_accepted() {
        let adapter = StripeAdapter::new(StripeConfig::default());
        let request = event_request(json!({"id": "evt_1", "type": "ping", "data": {"object": {}}}));
        assert!(adapter.verify_signature(&gateway(), &request).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let ts = 1_700_000_000;
        let header = sign(r#"{"amount":100}"#, ts);
        let result = verify_stripe_signature(SECRET, br#"{"amount":999}"#, &header, ts, 300);
        assert!(matches!(result, Err(PaymentError::WebhookVerification(_))));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let ts = 1_700_000_000;
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign(payload, ts);
        assert!(verify_stripe_signature(SECRET, payload.as_bytes(), &header, ts + 301, 300).is_err());
        assert!(verify_stripe_signature(SECRET, payload.as_bytes(), &header, ts + 299, 300).is_ok());
    }

    #[test]
    fn test_any_v1_may_match() {
        let ts = 1_700_000_000;
        let payload = r#"{"id":"evt_1"}"#;
        let good = sign(payload, ts);
        let header = format!("t={},v1={},{}", ts, "00".repeat(32), good.split_once(',').unwrap().1);
        assert!(verify_stripe_signature(SECRET, payload.as_bytes(), &header, ts, 300).is_ok());
    }

    #[test]
    fn test_missing_parts_rejected() {
        assert!(verify_stripe_signature(SECRET, b"{}", "v1=abcd", 0, 300).is_err());
        assert!(verify_stripe_signature(SECRET, b"{}", "t=0", 0, 300).is_err());
    }

    #[test]
    fn test_missing_secret_fails_closed() {
        let adapter = StripeAdapter::new(StripeConfig::default());
        let gateway = PaymentGateway::new("Stripe", GatewayType::Stripe);
        let request = event_request(json!({"id": "evt_1", "type": "ping", "data": {"object": {}}}));
        assert!(adapter.verify_signature(&gateway, &request).is_err());
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    #[test]
    fn test_session_form_uses_minor_units() {
        let adapter = StripeAdapter::new(StripeConfig::default());
        let request = CheckoutRequest {
            transaction_id: "STRIPE_abc".to_string(),
            quote_id: QuoteId::new(),
            title: "Cuota".to_string(),
            amount: Money::new(dec!(120.50), Currency::USD),
            payer_email: "residente@example.com".to_string(),
            expires_at: Some(Utc::now() + chrono::Duration::days(10)),
        };
        let form = adapter.session_form(&gateway(), &request).unwrap();
        let get = |k: &str| form.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());

        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("12050"));
        assert_eq!(get("line_items[0][price_data][currency]"), Some("usd"));
        assert_eq!(get("client_reference_id"), Some("STRIPE_abc"));
        assert_eq!(get("cancel_url"), Some("https://condo.example/pagos/cancel"));
        // beyond Stripe's 24h window
        assert_eq!(get("expires_at"), None);
    }

    #[test]
    fn test_session_form_requires_success_url() {
        let adapter = StripeAdapter::new(StripeConfig::default());
        let gateway = PaymentGateway::new("Stripe", GatewayType::Stripe);
        let request = CheckoutRequest {
            transaction_id: "STRIPE_abc".to_string(),
            quote_id: QuoteId::new(),
            title: "Cuota".to_string(),
            amount: Money::new(dec!(45000), Currency::CLP),
            payer_email: "residente@example.com".to_string(),
            expires_at: None,
        };
        assert!(adapter.session_form(&gateway, &request).is_err());
    }

    // ========================================================================
    // Events
    // ========================================================================

    #[tokio::test]
    async fn test_payment_intent_succeeded() {
        let adapter = StripeAdapter::new(StripeConfig::default());
        let request = event_request(json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": {"object": {
                "id": "pi_123",
                "amount_received": 45000,
                "currency": "clp",
                "metadata": {"transaction_id": "STRIPE_abc"}
            }}
        }));

        let n = adapter.resolve_notification(&gateway(), &request).await.unwrap();
        assert_eq!(n.outcome, NotificationOutcome::Approved);
        assert_eq!(n.transaction_ref.as_deref(), Some("STRIPE_abc"));
        assert_eq!(n.external_id.as_deref(), Some("pi_123"));
        assert_eq!(
            n.amount,
            Some(ReportedAmount { value: dec!(45000), currency: Some(Currency::CLP) })
        );
    }

    #[tokio::test]
    async fn test_payment_failed_carries_reason() {
        let adapter = StripeAdapter::new(StripeConfig::default());
        let request = event_request(json!({
            "id": "evt_2",
            "type": "payment_intent.payment_failed",
            "data": {"object": {
                "id": "pi_123",
                "metadata": {"transaction_id": "STRIPE_abc"},
                "last_payment_error": {"code": "card_declined", "message": "Your card was declined."}
            }}
        }));

        let n = adapter.resolve_notification(&gateway(), &request).await.unwrap();
        assert_eq!(
            n.outcome,
            NotificationOutcome::Rejected { reason: "Your card was declined.".into() }
        );
    }

    #[tokio::test]
    async fn test_checkout_session_completed_uses_client_reference() {
        let adapter = StripeAdapter::new(StripeConfig::default());
        let request = event_request(json!({
            "id": "evt_3",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_1",
                "client_reference_id": "STRIPE_abc",
                "payment_intent": "pi_123",
                "payment_status": "paid",
                "amount_total": 12050,
                "currency": "usd"
            }}
        }));

        let n = adapter.resolve_notification(&gateway(), &request).await.unwrap();
        assert_eq!(n.outcome, NotificationOutcome::Approved);
        assert_eq!(n.transaction_ref.as_deref(), Some("STRIPE_abc"));
        assert_eq!(n.external_id.as_deref(), Some("pi_123"));
        assert_eq!(n.amount.map(|a| a.value), Some(dec!(120.50)));
    }

    #[tokio::test]
    async fn test_unhandled_event_ignored() {
        let adapter = StripeAdapter::new(StripeConfig::default());
        let request = event_request(json!({
            "id": "evt_4",
            "type": "customer.created",
            "data": {"object": {"id": "cus_1"}}
        }));
        let n = adapter.resolve_notification(&gateway(), &request).await.unwrap();
        assert_eq!(n.outcome, NotificationOutcome::Ignored);
    }
}
