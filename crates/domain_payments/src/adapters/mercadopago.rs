//! MercadoPago adapter
//!
//! Checkout uses Checkout Pro preferences. Notifications only carry the
//! payment id, so the verdict is always read back from `/v1/payments/{id}`
//! with the account's access token rather than trusted from the callback.
//!
//! Signatures follow the `x-signature: ts=...,v1=...` scheme: HMAC-SHA256
//! over `id:{data.id};request-id:{x-request-id};ts:{ts};`.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument};

use core_kernel::{Currency, PortError};

use super::{
    credential, ensure_success, http_error, verify_hmac_sha256, CheckoutRequest, CheckoutSession,
    GatewayAdapter,
};
use crate::error::PaymentError;
use crate::gateway::{GatewayType, JsonMap, PaymentGateway};
use crate::webhook::{GatewayNotification, NotificationOutcome, ReportedAmount, WebhookRequest};

const PROVIDER: &str = "MercadoPago";

/// Credentials and URLs injected at startup
///
/// Values on the gateway record's `config_data` take precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MercadoPagoConfig {
    pub api_base_url: String,
    pub access_token: Option<String>,
    pub webhook_secret: Option<String>,
    /// Public URL of `/webhooks/mercadopago`
    pub notification_url: Option<String>,
    pub success_url: Option<String>,
    pub failure_url: Option<String>,
    pub pending_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for MercadoPagoConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.mercadopago.com".to_string(),
            access_token: None,
            webhook_secret: None,
            notification_url: None,
            success_url: None,
            failure_url: None,
            pending_url: None,
            timeout_secs: 15,
        }
    }
}

pub struct MercadoPagoAdapter {
    http: reqwest::Client,
    config: MercadoPagoConfig,
}

impl MercadoPagoAdapter {
    pub fn new(config: MercadoPagoConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, config }
    }

    fn base_url(&self) -> &str {
        self.config.api_base_url.trim_end_matches('/')
    }

    fn access_token<'a>(&'a self, gateway: &'a PaymentGateway) -> Option<&'a str> {
        credential(gateway, "access_token", self.config.access_token.as_deref())
    }

    /// Builds the Checkout Pro preference body
    pub fn preference_body(
        &self,
        gateway: &PaymentGateway,
        request: &CheckoutRequest,
    ) -> Result<Value, PortError> {
        let unit_price = request.amount.amount().to_f64().ok_or_else(|| {
            PortError::validation_field("Amount cannot be represented for MercadoPago", "amount")
        })?;

        let mut body = json!({
            "items": [{
                "id": request.quote_id.as_uuid().to_string(),
                "title": request.title,
                "quantity": 1,
                "currency_id": request.amount.currency().code(),
                "unit_price": unit_price,
            }],
            "payer": { "email": request.payer_email },
            "external_reference": request.transaction_id,
        });

        let success = credential(gateway, "success_url", self.config.success_url.as_deref());
        let failure = credential(gateway, "failure_url", self.config.failure_url.as_deref());
        let pending = credential(gateway, "pending_url", self.config.pending_url.as_deref());
        if success.is_some() || failure.is_some() || pending.is_some() {
            body["back_urls"] = json!({
                "success": success,
                "failure": failure,
                "pending": pending,
            });
        }
        // auto_return is rejected by the API without a success URL
        if success.is_some() {
            body["auto_return"] = json!("approved");
        }

        if let Some(url) = credential(gateway, "webhook_url", self.config.notification_url.as_deref()) {
            body["notification_url"] = json!(url);
        }

        if let Some(expires_at) = request.expires_at {
            body["expires"] = json!(true);
            body["expiration_date_from"] =
                json!(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
            body["expiration_date_to"] =
                json!(expires_at.to_rfc3339_opts(SecondsFormat::Millis, true));
        }

        Ok(body)
    }
}

#[async_trait]
impl GatewayAdapter for MercadoPagoAdapter {
    fn gateway_type(&self) -> GatewayType {
        GatewayType::MercadoPago
    }

    #[instrument(skip(self, gateway, request), fields(transaction_id = %request.transaction_id))]
    async fn create_checkout(
        &self,
        gateway: &PaymentGateway,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PortError> {
        let token = self.access_token(gateway).ok_or_else(|| {
            PortError::validation_field("MercadoPago access token is not configured", "access_token")
        })?;
        let body = self.preference_body(gateway, request)?;

        let resp = self
            .http
            .post(format!("{}/checkout/preferences", self.base_url()))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| http_error("create preference", e))?;
        let resp = ensure_success(PROVIDER, resp, "create preference").await?;

        let raw: Value = resp
            .json()
            .await
            .map_err(|e| http_error("decode preference", e))?;
        debug!(preference_id = ?raw.get("id"), "MercadoPago preference created");
        parse_preference(raw)
    }

    fn verify_signature(
        &self,
        gateway: &PaymentGateway,
        request: &WebhookRequest,
    ) -> Result<(), PaymentError> {
        let secret = credential(gateway, "webhook_secret", self.config.webhook_secret.as_deref())
            .ok_or_else(|| PaymentError::verification("MercadoPago webhook secret is not configured"))?;
        let header = request
            .header("x-signature")
            .ok_or_else(|| PaymentError::verification("Missing x-signature header"))?;
        let (ts, v1) = parse_signature_header(header)?;

        let data_id = notification_data_id(request);
        let manifest = signature_manifest(data_id.as_deref(), request.header("x-request-id"), &ts);
        verify_hmac_sha256(secret, &manifest, &v1)
    }

    #[instrument(skip(self, gateway, request))]
    async fn resolve_notification(
        &self,
        gateway: &PaymentGateway,
        request: &WebhookRequest,
    ) -> Result<GatewayNotification, PaymentError> {
        let body = request.json_body()?;
        let topic = body
            .get("type")
            .or_else(|| body.get("topic"))
            .and_then(Value::as_str)
            .or_else(|| request.query_param("type"))
            .or_else(|| request.query_param("topic"));

        if topic != Some("payment") {
            debug!(topic = ?topic, "Ignoring non-payment MercadoPago notification");
            return Ok(GatewayNotification::ignored(body));
        }

        let payment_id = notification_data_id(request)
            .ok_or_else(|| PaymentError::verification("Notification carries no payment id"))?;
        let token = self
            .access_token(gateway)
            .ok_or_else(|| PaymentError::gateway("MercadoPago access token is not configured"))?;

        let resp = self
            .http
            .get(format!("{}/v1/payments/{}", self.base_url(), payment_id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| PaymentError::gateway(http_error("fetch payment", e).to_string()))?;
        let resp = ensure_success(PROVIDER, resp, "fetch payment")
            .await
            .map_err(|e| PaymentError::gateway(e.to_string()))?;
        let payment: Value = resp
            .json()
            .await
            .map_err(|e| PaymentError::gateway(format!("Undecodable MercadoPago payment: {}", e)))?;

        Ok(parse_payment(payment))
    }
}

fn parse_preference(raw: Value) -> Result<CheckoutSession, PortError> {
    let preference_id = raw
        .get("id")
        .and_then(value_as_string)
        .ok_or_else(|| PortError::internal("MercadoPago preference has no id"))?;
    let payment_url = raw
        .get("init_point")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PortError::internal("MercadoPago preference has no init_point"))?;
    let sandbox_url = raw
        .get("sandbox_init_point")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(CheckoutSession {
        payment_url,
        sandbox_url,
        preference_id,
        raw,
    })
}

/// Maps a payment resource to a notification
pub fn parse_payment(payment: Value) -> GatewayNotification {
    let status = payment.get("status").and_then(Value::as_str).unwrap_or("");
    let status_detail = payment.get("status_detail").and_then(Value::as_str);
    let external_id = payment.get("id").and_then(value_as_string);

    let amount = payment
        .get("transaction_amount")
        .and_then(value_as_decimal)
        .map(|value| ReportedAmount {
            value,
            currency: payment
                .get("currency_id")
                .and_then(Value::as_str)
                .and_then(|c| Currency::from_str(c).ok()),
        });

    let mut details = JsonMap::new();
    details.insert("mp_payment_id".into(), json!(external_id));
    details.insert("payment_method".into(), payment.get("payment_method_id").cloned().unwrap_or(Value::Null));
    details.insert("payment_type".into(), payment.get("payment_type_id").cloned().unwrap_or(Value::Null));
    details.insert("status_detail".into(), json!(status_detail));
    details.insert("webhook_received_at".into(), json!(Utc::now().to_rfc3339()));

    GatewayNotification {
        transaction_ref: payment
            .get("external_reference")
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
        external_id,
        outcome: map_status(status, status_detail),
        amount,
        details,
        raw: payment,
    }
}

/// MercadoPago payment status to normalized outcome
pub fn map_status(status: &str, status_detail: Option<&str>) -> NotificationOutcome {
    match status {
        "approved" => NotificationOutcome::Approved,
        "rejected" | "cancelled" => NotificationOutcome::Rejected {
            reason: status_detail
                .filter(|d| !d.is_empty())
                .unwrap_or(status)
                .to_string(),
        },
        "pending" | "in_process" | "authorized" | "in_mediation" => NotificationOutcome::Pending,
        other => NotificationOutcome::Unknown(other.to_string()),
    }
}

/// Splits `ts=...,v1=...`
fn parse_signature_header(header: &str) -> Result<(String, String), PaymentError> {
    let mut ts = None;
    let mut v1 = None;
    for part in header.split(',') {
        let (key, value) = match part.split_once('=') {
            Some(kv) => kv,
            None => continue,
        };
        match key.trim() {
            "ts" => ts = Some(value.trim().to_string()),
            "v1" => v1 = Some(value.trim().to_string()),
            _ => {}
        }
    }
    match (ts, v1) {
        (Some(ts), Some(v1)) => Ok((ts, v1)),
        _ => Err(PaymentError::verification("Malformed x-signature header")),
    }
}

/// Payment id from `?data.id=` or the JSON body's `data.id`
fn notification_data_id(request: &WebhookRequest) -> Option<String> {
    if let Some(id) = request.query_param("data.id").or_else(|| request.query_param("id")) {
        return Some(id.to_string());
    }
    request
        .json_body()
        .ok()
        .and_then(|body| body.get("data").and_then(|d| d.get("id")).and_then(value_as_string))
}

/// The string MercadoPago signs
pub fn signature_manifest(data_id: Option<&str>, request_id: Option<&str>, ts: &str) -> String {
    let mut manifest = String::new();
    if let Some(id) = data_id {
        let id = if id.chars().all(|c| c.is_ascii_alphanumeric()) {
            id.to_ascii_lowercase()
        } else {
            id.to_string()
        };
        manifest.push_str(&format!("id:{};", id));
    }
    if let Some(request_id) = request_id {
        manifest.push_str(&format!("request-id:{};", request_id));
    }
    manifest.push_str(&format!("ts:{};", ts));
    manifest
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::hmac_sha256_hex;
    use core_kernel::{Money, QuoteId};
    use rust_decimal_macros::dec;

    fn gateway() -> PaymentGateway {
        PaymentGateway::new("MercadoPago", GatewayType::MercadoPago)
            .with_config("access_token", "TEST-token")
            .with_config("webhook_secret", "mp-secret")
            .with_config("webhook_url", "https://condo.example/webhooks/mercadopago")
            .with_config("success_url", "https://condo.example/pagos/ok")
    }

    fn checkout_request() -> CheckoutRequest {
        CheckoutRequest {
            transaction_id: "MP_abc_20260310_120000_a1b2c3".to_string(),
            quote_id: QuoteId::new(),
            title: "Cuota 03/2026 - Vivienda A-101".to_string(),
            amount: Money::new(dec!(45000), Currency::CLP),
            payer_email: "residente@example.com".to_string(),
            expires_at: Some(Utc::now() + chrono::Duration::days(3)),
        }
    }

    fn signed_request(payment_id: &str, secret: &str) -> WebhookRequest {
        let ts = "1742505638683";
        let manifest = signature_manifest(Some(payment_id), Some("req-1"), ts);
        let sig = hmac_sha256_hex(secret, &manifest).unwrap();
        WebhookRequest::new(json!({"type": "payment", "data": {"id": payment_id}}).to_string())
            .with_header("x-signature", format!("ts={},v1={}", ts, sig))
            .with_header("x-request-id", "req-1")
            .with_query("data.id", payment_id)
    }

    // ========================================================================
    // Preferences
    // ========================================================================

    #[test]
    fn test_preference_body() {
        let adapter = MercadoPagoAdapter::new(MercadoPagoConfig::default());
        let req = checkout_request();
        let body = adapter.preference_body(&gateway(), &req).unwrap();

        assert_eq!(body["external_reference"], json!(req.transaction_id));
        assert_eq!(body["items"][0]["currency_id"], json!("CLP"));
        assert_eq!(body["items"][0]["unit_price"], json!(45000.0));
        assert_eq!(body["items"][0]["quantity"], json!(1));
        assert_eq!(body["payer"]["email"], json!("residente@example.com"));
        assert_eq!(body["auto_return"], json!("approved"));
        assert_eq!(body["back_urls"]["success"], json!("https://condo.example/pagos/ok"));
        assert_eq!(body["notification_url"], json!("https://condo.example/webhooks/mercadopago"));
        assert_eq!(body["expires"], json!(true));
    }

    #[test]
    fn test_preference_without_back_urls_has_no_auto_return() {
        let adapter = MercadoPagoAdapter::new(MercadoPagoConfig::default());
        let gateway = PaymentGateway::new("MercadoPago", GatewayType::MercadoPago);
        let body = adapter.preference_body(&gateway, &checkout_request()).unwrap();
        assert!(body.get("auto_return").is_none());
        assert!(body.get("back_urls").is_none());
    }

    #[test]
    fn test_parse_preference() {
        let session = parse_preference(json!({
            "id": "123-abc",
            "init_point": "https://www.mercadopago.cl/checkout/v1/redirect?pref_id=123-abc",
            "sandbox_init_point": "https://sandbox.mercadopago.cl/checkout/v1/redirect?pref_id=123-abc",
        }))
        .unwrap();
        assert_eq!(session.preference_id, "123-abc");
        assert!(session.sandbox_url.is_some());

        assert!(parse_preference(json!({"id": "x"})).is_err());
    }

    // ========================================================================
    // Signatures
    // ========================================================================

    #[test]
    fn test_valid_signature_accepted() {
        let adapter = MercadoPagoAdapter::new(MercadoPagoConfig::default());
        let request = signed_request("98765", "mp-secret");
        assert!(adapter.verify_signature(&gateway(), &request).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let adapter = MercadoPagoAdapter::new(MercadoPagoConfig::default());
        let request = signed_request("98765", "attacker-secret");
        assert!(matches!(
            adapter.verify_signature(&gateway(), &request),
            Err(PaymentError::WebhookVerification(_))
        ));
    }

    #[test]
    fn test_tampered_payment_id_rejected() {
        let adapter = MercadoPagoAdapter::new(MercadoPagoConfig::default());
        let request = signed_request("98765", "mp-secret").with_query("data.id", "11111");
        assert!(adapter.verify_signature(&gateway(), &request).is_err());
    }

    #[test]
    fn test_missing_secret_fails_closed() {
        let adapter = MercadoPagoAdapter::new(MercadoPagoConfig::default());
        let gateway = PaymentGateway::new("MercadoPago", GatewayType::MercadoPago);
        let request = signed_request("98765", "mp-secret");
        assert!(adapter.verify_signature(&gateway, &request).is_err());
    }

    #[test]
    fn test_missing_header_rejected() {
        let adapter = MercadoPagoAdapter::new(MercadoPagoConfig::default());
        let request = WebhookRequest::new("{}");
        assert!(adapter.verify_signature(&gateway(), &request).is_err());
    }

    #[test]
    fn test_manifest_lowercases_alphanumeric_ids() {
        assert_eq!(
            signature_manifest(Some("ABC123"), None, "10"),
            "id:abc123;ts:10;"
        );
    }

    // ========================================================================
    // Payment parsing
    // ========================================================================

    #[test]
    fn test_parse_approved_payment() {
        let notification = parse_payment(json!({
            "id": 98765,
            "status": "approved",
            "status_detail": "accredited",
            "external_reference": "MP_abc",
            "transaction_amount": 45000,
            "currency_id": "CLP",
            "payment_method_id": "visa",
            "payment_type_id": "credit_card",
        }));

        assert_eq!(notification.outcome, NotificationOutcome::Approved);
        assert_eq!(notification.transaction_ref.as_deref(), Some("MP_abc"));
        assert_eq!(notification.external_id.as_deref(), Some("98765"));
        assert_eq!(
            notification.amount,
            Some(ReportedAmount { value: dec!(45000), currency: Some(Currency::CLP) })
        );
        assert_eq!(notification.details["payment_method"], json!("visa"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            map_status("rejected", Some("cc_rejected_call_for_authorize")),
            NotificationOutcome::Rejected { reason: "cc_rejected_call_for_authorize".into() }
        );
        assert_eq!(
            map_status("cancelled", None),
            NotificationOutcome::Rejected { reason: "cancelled".into() }
        );
        assert_eq!(map_status("in_process", None), NotificationOutcome::Pending);
        assert_eq!(
            map_status("charged_back", None),
            NotificationOutcome::Unknown("charged_back".into())
        );
    }

    #[tokio::test]
    async fn test_non_payment_topic_is_ignored() {
        let adapter = MercadoPagoAdapter::new(MercadoPagoConfig::default());
        let request = WebhookRequest::new(json!({"type": "merchant_order", "data": {"id": "1"}}).to_string());
        let notification = adapter.resolve_notification(&gateway(), &request).await.unwrap();
        assert_eq!(notification.outcome, NotificationOutcome::Ignored);
    }
}
