//! Scripted gateway adapter for tests

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use core_kernel::{Currency, PortError};
use rust_decimal::Decimal;

use super::{CheckoutRequest, CheckoutSession, GatewayAdapter};
use crate::error::PaymentError;
use crate::gateway::{GatewayType, JsonMap, PaymentGateway};
use crate::webhook::{GatewayNotification, NotificationOutcome, ReportedAmount, WebhookRequest};

/// Header carrying the shared token checked by [`MockGatewayAdapter`]
pub const MOCK_SIGNATURE_HEADER: &str = "x-mock-signature";

/// Test adapter with a JSON callback format
///
/// Callbacks look like
/// `{"transaction_id": "...", "external_id": "...", "status": "approved", "amount": "500"}`
/// and must carry `x-mock-signature: <token>`.
pub struct MockGatewayAdapter {
    gateway_type: GatewayType,
    token: String,
    fail_checkout: bool,
    checkout_calls: AtomicUsize,
    last_request: Mutex<Option<CheckoutRequest>>,
}

#[derive(Debug, Deserialize)]
struct MockCallback {
    transaction_id: Option<String>,
    external_id: Option<String>,
    status: String,
    reason: Option<String>,
    amount: Option<Decimal>,
    currency: Option<Currency>,
}

impl MockGatewayAdapter {
    pub fn new(gateway_type: GatewayType, token: impl Into<String>) -> Self {
        Self {
            gateway_type,
            token: token.into(),
            fail_checkout: false,
            checkout_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Every checkout call fails as if the provider were down
    pub fn failing(mut self) -> Self {
        self.fail_checkout = true;
        self
    }

    pub fn checkout_calls(&self) -> usize {
        self.checkout_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CheckoutRequest> {
        self.last_request.lock().ok().and_then(|guard| guard.clone())
    }

    /// Builds a correctly signed callback
    pub fn callback(&self, body: Value) -> WebhookRequest {
        WebhookRequest::new(body.to_string()).with_header(MOCK_SIGNATURE_HEADER, self.token.clone())
    }
}

#[async_trait]
impl GatewayAdapter for MockGatewayAdapter {
    fn gateway_type(&self) -> GatewayType {
        self.gateway_type
    }

    async fn create_checkout(
        &self,
        _gateway: &PaymentGateway,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PortError> {
        self.checkout_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        if self.fail_checkout {
            return Err(PortError::connection("mock gateway unavailable"));
        }

        let preference_id = format!("pref-{}", request.transaction_id);
        Ok(CheckoutSession {
            payment_url: format!("https://pay.mock/checkout/{}", preference_id),
            sandbox_url: Some(format!("https://sandbox.pay.mock/checkout/{}", preference_id)),
            raw: json!({ "id": preference_id }),
            preference_id,
        })
    }

    fn verify_signature(
        &self,
        _gateway: &PaymentGateway,
        request: &WebhookRequest,
    ) -> Result<(), PaymentError> {
        match request.header(MOCK_SIGNATURE_HEADER) {
            Some(token) if token == self.token => Ok(()),
            Some(_) => Err(PaymentError::verification("Signature mismatch")),
            None => Err(PaymentError::verification("Missing signature header")),
        }
    }

    async fn resolve_notification(
        &self,
        _gateway: &PaymentGateway,
        request: &WebhookRequest,
    ) -> Result<GatewayNotification, PaymentError> {
        let raw = request.json_body()?;
        let callback: MockCallback = serde_json::from_value(raw.clone())
            .map_err(|e| PaymentError::verification(format!("Malformed mock callback: {}", e)))?;

        let outcome = match callback.status.as_str() {
            "approved" => NotificationOutcome::Approved,
            "rejected" => NotificationOutcome::Rejected {
                reason: callback.reason.unwrap_or_else(|| "rejected".to_string()),
            },
            "pending" => NotificationOutcome::Pending,
            "ignored" => NotificationOutcome::Ignored,
            other => NotificationOutcome::Unknown(other.to_string()),
        };

        Ok(GatewayNotification {
            transaction_ref: callback.transaction_id,
            external_id: callback.external_id,
            outcome,
            amount: callback.amount.map(|value| ReportedAmount {
                value,
                currency: callback.currency,
            }),
            details: JsonMap::new(),
            raw,
        })
    }
}
