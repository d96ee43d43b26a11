//! Gateway adapters
//!
//! One [`GatewayAdapter`] per provider. An adapter turns a pending
//! transaction into a hosted checkout link and turns provider callbacks into
//! a normalized [`GatewayNotification`]. The service picks adapters out of a
//! [`GatewayRegistry`] by `gateway_type`.

pub mod mercadopago;
pub mod stripe;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

use core_kernel::{Money, PortError, QuoteId};

use crate::error::PaymentError;
use crate::gateway::{GatewayType, PaymentGateway};
use crate::webhook::{GatewayNotification, WebhookRequest};

pub use mercadopago::{MercadoPagoAdapter, MercadoPagoConfig};
pub use stripe::{StripeAdapter, StripeConfig};

type HmacSha256 = Hmac<Sha256>;

/// What the provider needs to build a checkout for one transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutRequest {
    pub transaction_id: String,
    pub quote_id: QuoteId,
    pub title: String,
    pub amount: Money,
    pub payer_email: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A created checkout
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSession {
    pub payment_url: String,
    pub sandbox_url: Option<String>,
    /// Provider id of the preference / session
    pub preference_id: String,
    pub raw: Value,
}

#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    fn gateway_type(&self) -> GatewayType;

    /// Calls the provider to create a hosted payment link
    async fn create_checkout(
        &self,
        gateway: &PaymentGateway,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PortError>;

    /// Authenticates a callback; fails closed when no secret is configured
    fn verify_signature(
        &self,
        gateway: &PaymentGateway,
        request: &WebhookRequest,
    ) -> Result<(), PaymentError>;

    /// Extracts the payment verdict, querying the provider if needed
    async fn resolve_notification(
        &self,
        gateway: &PaymentGateway,
        request: &WebhookRequest,
    ) -> Result<GatewayNotification, PaymentError>;
}

/// Adapters keyed by gateway type
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    adapters: HashMap<GatewayType, Arc<dyn GatewayAdapter>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn GatewayAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Registers an adapter, replacing any previous one for the same type
    pub fn register(&mut self, adapter: Arc<dyn GatewayAdapter>) {
        self.adapters.insert(adapter.gateway_type(), adapter);
    }

    pub fn get(&self, gateway_type: GatewayType) -> Option<Arc<dyn GatewayAdapter>> {
        self.adapters.get(&gateway_type).cloned()
    }

    pub fn supported_types(&self) -> Vec<GatewayType> {
        let mut types: Vec<_> = self.adapters.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}

impl std::fmt::Debug for GatewayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRegistry")
            .field("adapters", &self.supported_types())
            .finish()
    }
}

/// Looks up a credential on the gateway record, falling back to the value
/// injected at adapter construction
pub(crate) fn credential<'a>(
    gateway: &'a PaymentGateway,
    key: &str,
    fallback: Option<&'a str>,
) -> Option<&'a str> {
    gateway
        .config_str(key)
        .or(fallback.filter(|v| !v.trim().is_empty()))
}

/// Hex HMAC-SHA256 of `message`
pub fn hmac_sha256_hex(secret: &str, message: &str) -> Result<String, PaymentError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::verification(format!("Invalid signing key: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex HMAC-SHA256 signature
pub fn verify_hmac_sha256(
    secret: &str,
    message: &str,
    signature_hex: &str,
) -> Result<(), PaymentError> {
    let provided = hex::decode(signature_hex.trim())
        .map_err(|_| PaymentError::verification("Signature is not valid hex"))?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::verification(format!("Invalid signing key: {}", e)))?;
    mac.update(message.as_bytes());
    mac.verify_slice(&provided)
        .map_err(|_| PaymentError::verification("Signature mismatch"))
}

/// Passes through 2xx responses; logs and converts anything else
pub(crate) async fn ensure_success(
    provider: &str,
    resp: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response, PortError> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status();
    let body = match resp.text().await {
        Ok(text) if !text.is_empty() => text,
        Ok(_) => "<empty response body>".to_string(),
        Err(err) => format!("<failed to read response body: {err}>"),
    };

    error!(
        provider = %provider,
        status = %status,
        response_body = %body,
        context = %context,
        "gateway api request failed"
    );

    Err(PortError::internal(format!(
        "{} API request failed: {} (status {})",
        provider, context, status
    )))
}

/// Maps a reqwest failure into a port error
pub(crate) fn http_error(context: &str, err: reqwest::Error) -> PortError {
    let message = if err.is_timeout() {
        format!("{} timed out", context)
    } else {
        format!("{}: {}", context, err)
    };
    PortError::Connection {
        message,
        source: Some(Box::new(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_round_trip() {
        let sig = hmac_sha256_hex("secret", "payload").unwrap();
        assert!(verify_hmac_sha256("secret", "payload", &sig).is_ok());
        assert!(verify_hmac_sha256("secret", "payload2", &sig).is_err());
        assert!(verify_hmac_sha256("other", "payload", &sig).is_err());
    }

    #[test]
    fn test_verify_rejects_non_hex() {
        let err = verify_hmac_sha256("secret", "payload", "zz").unwrap_err();
        assert!(matches!(err, PaymentError::WebhookVerification(_)));
    }

    #[test]
    fn test_credential_prefers_gateway_record() {
        let gateway = PaymentGateway::new("MP", GatewayType::MercadoPago)
            .with_config("access_token", "from-record")
            .with_config("webhook_secret", "");

        assert_eq!(credential(&gateway, "access_token", Some("from-env")), Some("from-record"));
        assert_eq!(credential(&gateway, "webhook_secret", Some("from-env")), Some("from-env"));
        assert_eq!(credential(&gateway, "webhook_secret", Some(" ")), None);
        assert_eq!(credential(&gateway, "missing", None), None);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = GatewayRegistry::new()
            .with_adapter(Arc::new(MercadoPagoAdapter::new(MercadoPagoConfig::default())))
            .with_adapter(Arc::new(StripeAdapter::new(StripeConfig::default())));

        assert!(registry.get(GatewayType::MercadoPago).is_some());
        assert!(registry.get(GatewayType::Stripe).is_some());
        assert!(registry.get(GatewayType::PayPal).is_none());
        assert_eq!(
            registry.supported_types(),
            vec![GatewayType::MercadoPago, GatewayType::Stripe]
        );
    }
}
