//! Webhook request and notification types

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use core_kernel::Money;

use crate::error::PaymentError;
use crate::gateway::JsonMap;
use crate::transaction::TransactionStatus;

/// An inbound provider callback, as received over HTTP
///
/// Header names are stored lowercased; the body is kept as raw bytes since
/// signatures are computed over the exact payload.
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
    body: Vec<u8>,
}

impl WebhookRequest {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Parses the body as JSON; an empty body yields `Value::Null`
    pub fn json_body(&self) -> Result<Value, PaymentError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| PaymentError::verification(format!("Malformed JSON payload: {}", e)))
    }
}

/// Provider verdict for a payment, normalized across gateways
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Approved,
    Rejected { reason: String },
    /// Still in progress on the provider side
    Pending,
    /// A status code this system does not act on
    Unknown(String),
    /// Not a payment notification (topic we don't handle)
    Ignored,
}

/// What an adapter extracted from a verified callback
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayNotification {
    /// Our `transaction_id`, echoed back as external reference or metadata
    pub transaction_ref: Option<String>,
    /// Provider payment id
    pub external_id: Option<String>,
    pub outcome: NotificationOutcome,
    /// Amount the provider reports as paid, if any
    pub amount: Option<ReportedAmount>,
    /// Provider facts worth keeping in `payment_details`
    pub details: JsonMap,
    pub raw: Value,
}

impl GatewayNotification {
    pub fn ignored(raw: Value) -> Self {
        Self {
            transaction_ref: None,
            external_id: None,
            outcome: NotificationOutcome::Ignored,
            amount: None,
            details: JsonMap::new(),
            raw,
        }
    }
}

/// Amount reported by a provider; currency may be absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportedAmount {
    pub value: Decimal,
    pub currency: Option<core_kernel::Currency>,
}

impl ReportedAmount {
    /// True if the report agrees exactly with the expected amount
    pub fn matches(&self, expected: &Money) -> bool {
        if let Some(currency) = self.currency {
            if currency != expected.currency() {
                return false;
            }
        }
        self.value == expected.amount()
    }
}

/// Result of handling one webhook delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Transition applied
    Processed {
        transaction_id: String,
        transaction_status: TransactionStatus,
        quote_marked_paid: bool,
    },
    /// Transaction was already terminal; nothing changed
    Replayed {
        transaction_id: String,
        transaction_status: TransactionStatus,
    },
    /// Callback acknowledged without a transition
    Ignored {
        transaction_id: Option<String>,
        reason: String,
    },
    /// Approval withheld because the reported amount differs from the quote
    AmountMismatch {
        transaction_id: String,
        expected: Decimal,
        reported: Decimal,
    },
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed { .. } => "processed",
            WebhookOutcome::Replayed { .. } => "replayed",
            WebhookOutcome::Ignored { .. } => "ignored",
            WebhookOutcome::AmountMismatch { .. } => "amount_mismatch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_headers_are_case_insensitive() {
        let req = WebhookRequest::new("{}").with_header("Stripe-Signature", "t=1,v1=ab");
        assert_eq!(req.header("stripe-signature"), Some("t=1,v1=ab"));
        assert_eq!(req.header("STRIPE-SIGNATURE"), Some("t=1,v1=ab"));
    }

    #[test]
    fn test_empty_body_is_null() {
        let req = WebhookRequest::new("  ");
        assert_eq!(req.json_body().unwrap(), Value::Null);
    }

    #[test]
    fn test_malformed_body_fails_verification() {
        let req = WebhookRequest::new("{not json");
        assert!(matches!(req.json_body(), Err(PaymentError::WebhookVerification(_))));
    }

    #[test]
    fn test_reported_amount_matching() {
        let expected = Money::new(dec!(500), Currency::CLP);
        let same = ReportedAmount { value: dec!(500.00), currency: None };
        let other_currency = ReportedAmount { value: dec!(500), currency: Some(Currency::USD) };
        let short = ReportedAmount { value: dec!(499.6), currency: Some(Currency::CLP) };

        assert!(same.matches(&expected));
        assert!(!other_currency.matches(&expected));
        assert!(!short.matches(&expected));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = WebhookOutcome::Replayed {
            transaction_id: "MP_1".to_string(),
            transaction_status: TransactionStatus::Approved,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], json!("replayed"));
        assert_eq!(json["transaction_status"], json!("approved"));
        assert_eq!(outcome.label(), "replayed");
    }
}
