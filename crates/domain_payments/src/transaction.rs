//! Payment transaction ledger
//!
//! One `PaymentTransaction` per payment attempt. The only legal moves are
//! `pending -> approved` and `pending -> rejected`; both targets are terminal.
//! `transaction_id` is generated once and never changes, and `external_id`
//! is written by the first callback that reports it and never replaced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use core_kernel::{Money, PaymentGatewayId, PaymentMethodId, PaymentTransactionId, QuoteId};

use crate::error::PaymentError;
use crate::gateway::{JsonMap, PaymentGateway};
use crate::method::PaymentMethod;
use crate::quote::Quote;

/// Prefix for transactions that have no gateway record (cash)
pub const CASH_PREFIX: &str = "CASH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Approved)
                | (TransactionStatus::Pending, TransactionStatus::Rejected)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "approved" => Ok(TransactionStatus::Approved),
            "rejected" => Ok(TransactionStatus::Rejected),
            other => Err(PaymentError::validation(format!(
                "Unknown transaction status: {}",
                other
            ))),
        }
    }
}

/// A single payment attempt against a quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: PaymentTransactionId,
    pub quote_id: QuoteId,
    /// None for cash payments
    pub payment_gateway_id: Option<PaymentGatewayId>,
    pub payment_method_id: PaymentMethodId,
    /// Internal reference, sent to providers as external reference
    pub transaction_id: String,
    /// Provider-side payment id
    pub external_id: Option<String>,
    pub amount: Money,
    pub status: TransactionStatus,
    /// Last raw payload received from the provider
    pub gateway_response: JsonMap,
    pub payment_details: JsonMap,
    /// Advisory; late callbacks are still honored
    pub expires_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// Creates a pending transaction for the full quote amount
    pub fn new(
        quote: &Quote,
        method: &PaymentMethod,
        gateway: Option<&PaymentGateway>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        let prefix = gateway
            .map(|g| g.gateway_type.transaction_prefix())
            .unwrap_or(CASH_PREFIX);

        Self {
            id: PaymentTransactionId::new_v7(),
            quote_id: quote.id,
            payment_gateway_id: gateway.map(|g| g.id),
            payment_method_id: method.id,
            transaction_id: generate_transaction_id(prefix, quote.id, now),
            external_id: None,
            amount: quote.amount,
            status: TransactionStatus::Pending,
            gateway_response: JsonMap::new(),
            payment_details: JsonMap::new(),
            expires_at,
            processed_at: None,
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at < now).unwrap_or(false)
    }

    /// Fails with `InvalidState` unless the transaction is still pending
    pub fn ensure_pending(&self) -> Result<(), PaymentError> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(self.invalid_state())
        }
    }

    /// Sets the provider id if none is recorded yet
    ///
    /// Returns false when a different id is already recorded; the existing
    /// value is kept.
    pub fn assign_external_id(&mut self, external_id: &str) -> bool {
        match &self.external_id {
            None => {
                self.external_id = Some(external_id.to_string());
                self.updated_at = Utc::now();
                true
            }
            Some(existing) => existing == external_id,
        }
    }

    pub fn merge_details(&mut self, details: JsonMap) {
        self.payment_details.extend(details);
        self.updated_at = Utc::now();
    }

    pub fn set_detail(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.payment_details.insert(key.into(), value.into());
        self.updated_at = Utc::now();
    }

    /// Stores the latest provider payload
    pub fn record_response(&mut self, raw: &Value) {
        self.gateway_response = match raw {
            Value::Object(map) => map.clone(),
            Value::Null => JsonMap::new(),
            other => {
                let mut wrapped = JsonMap::new();
                wrapped.insert("payload".into(), other.clone());
                wrapped
            }
        };
        self.updated_at = Utc::now();
    }

    /// Stamps the time a provider callback was applied
    pub fn mark_processed(&mut self, at: DateTime<Utc>) {
        self.processed_at = Some(at);
        self.updated_at = at;
    }

    pub fn approve(&mut self, at: DateTime<Utc>) -> Result<(), PaymentError> {
        self.transition_to(TransactionStatus::Approved)?;
        self.confirmed_at = Some(at);
        self.processed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    pub fn reject(&mut self, reason: &str, at: DateTime<Utc>) -> Result<(), PaymentError> {
        self.transition_to(TransactionStatus::Rejected)?;
        self.gateway_response
            .insert("rejection_reason".into(), Value::String(reason.to_string()));
        self.processed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    pub fn invalid_state(&self) -> PaymentError {
        PaymentError::InvalidState {
            transaction_id: self.transaction_id.clone(),
            status: self.status,
        }
    }

    fn transition_to(&mut self, next: TransactionStatus) -> Result<(), PaymentError> {
        if !self.status.can_transition_to(next) {
            return Err(self.invalid_state());
        }
        self.status = next;
        Ok(())
    }
}

/// Generates an internal transaction reference
///
/// Format: {PREFIX}_{QUOTE_UUID}_{YYYYMMDD_HHMMSS}_{SUFFIX}. The random
/// suffix keeps same-second attempts for one quote distinct.
pub fn generate_transaction_id(prefix: &str, quote_id: QuoteId, at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}_{}",
        prefix,
        quote_id.as_uuid(),
        at.format("%Y%m%d_%H%M%S"),
        &suffix[..6]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayType;
    use chrono::NaiveDate;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn pending() -> PaymentTransaction {
        let quote = Quote::new(
            "B-202",
            "Cuota marzo",
            Money::new(dec!(500), Currency::CLP),
            NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
        );
        let method = PaymentMethod::new("Tarjeta", "Card", true, false);
        let gateway = PaymentGateway::new("MercadoPago", GatewayType::MercadoPago);
        PaymentTransaction::new(&quote, &method, Some(&gateway), None)
    }

    // ========================================================================
    // Status machine
    // ========================================================================

    #[test]
    fn test_allowed_transitions() {
        use TransactionStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_approve_sets_confirmed_at() {
        let mut tx = pending();
        let at = Utc::now();
        tx.approve(at).unwrap();
        assert_eq!(tx.status, TransactionStatus::Approved);
        assert_eq!(tx.confirmed_at, Some(at));
    }

    #[test]
    fn test_approve_twice_is_invalid_state() {
        let mut tx = pending();
        tx.approve(Utc::now()).unwrap();
        let err = tx.approve(Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            PaymentError::InvalidState { status: TransactionStatus::Approved, .. }
        ));
    }

    #[test]
    fn test_reject_records_reason() {
        let mut tx = pending();
        tx.reject("cc_rejected_insufficient_amount", Utc::now()).unwrap();
        assert_eq!(tx.status, TransactionStatus::Rejected);
        assert_eq!(
            tx.gateway_response["rejection_reason"],
            json!("cc_rejected_insufficient_amount")
        );
        assert!(tx.confirmed_at.is_none());
        assert!(tx.approve(Utc::now()).is_err());
    }

    // ========================================================================
    // Identifiers
    // ========================================================================

    #[test]
    fn test_transaction_id_format() {
        let tx = pending();
        assert!(tx.transaction_id.starts_with("MP_"));
        assert!(tx.transaction_id.contains(&tx.quote_id.as_uuid().to_string()));
        assert_eq!(tx.amount, Money::new(dec!(500), Currency::CLP));
    }

    #[test]
    fn test_same_second_ids_differ() {
        let quote_id = QuoteId::new();
        let at = Utc::now();
        let a = generate_transaction_id("MP", quote_id, at);
        let b = generate_transaction_id("MP", quote_id, at);
        assert_ne!(a, b);
    }

    #[test]
    fn test_cash_transaction_has_no_gateway() {
        let quote = Quote::new(
            "C-1",
            "Cuota",
            Money::new(dec!(100), Currency::CLP),
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        );
        let cash = PaymentMethod::new("Efectivo", "Cash", false, true);
        let tx = PaymentTransaction::new(&quote, &cash, None, None);
        assert!(tx.transaction_id.starts_with("CASH_"));
        assert!(tx.payment_gateway_id.is_none());
    }

    #[test]
    fn test_external_id_never_overwritten() {
        let mut tx = pending();
        assert!(tx.assign_external_id("111"));
        assert!(tx.assign_external_id("111"));
        assert!(!tx.assign_external_id("222"));
        assert_eq!(tx.external_id.as_deref(), Some("111"));
    }

    #[test]
    fn test_record_response_wraps_non_objects() {
        let mut tx = pending();
        tx.record_response(&json!("raw text"));
        assert_eq!(tx.gateway_response["payload"], json!("raw text"));
        assert!(tx.processed_at.is_none());
    }

    #[test]
    fn test_is_expired() {
        let mut tx = pending();
        assert!(!tx.is_expired(Utc::now()));
        tx.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        assert!(tx.is_expired(Utc::now()));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn status_strategy() -> impl Strategy<Value = TransactionStatus> {
        prop_oneof![
            Just(TransactionStatus::Pending),
            Just(TransactionStatus::Approved),
            Just(TransactionStatus::Rejected),
        ]
    }

    proptest! {
        /// No sequence of requested moves ever leaves a terminal status
        #[test]
        fn terminal_statuses_are_absorbing(moves in proptest::collection::vec(status_strategy(), 1..20)) {
            let mut current = TransactionStatus::Pending;
            let mut left_terminal = false;
            for next in moves {
                if current.can_transition_to(next) {
                    if current.is_terminal() {
                        left_terminal = true;
                    }
                    current = next;
                }
            }
            prop_assert!(!left_terminal);
        }
    }
}
