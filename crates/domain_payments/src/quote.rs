//! Quote view
//!
//! Quotes (monthly or annual condominium fees) are owned by the billing
//! module. Payments only read them and flip them to PAID once a linked
//! transaction is approved.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

use core_kernel::{Money, QuoteId};

use crate::error::PaymentError;
use crate::gateway::JsonMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Pending => "PENDING",
            QuoteStatus::Paid => "PAID",
            QuoteStatus::Overdue => "OVERDUE",
            QuoteStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(QuoteStatus::Pending),
            "PAID" => Ok(QuoteStatus::Paid),
            "OVERDUE" => Ok(QuoteStatus::Overdue),
            "CANCELLED" => Ok(QuoteStatus::Cancelled),
            other => Err(PaymentError::validation(format!("Unknown quote status: {}", other))),
        }
    }
}

/// A payable obligation of one house
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub house_code: String,
    pub resident_email: Option<String>,
    pub description: String,
    /// Amount due
    pub amount: Money,
    pub due_date: NaiveDate,
    pub status: QuoteStatus,
    pub paid_date: Option<DateTime<Utc>>,
    pub payment_reference: Option<String>,
    pub payment_data: JsonMap,
    pub period_month: Option<u32>,
    pub period_year: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(
        house_code: impl Into<String>,
        description: impl Into<String>,
        amount: Money,
        due_date: NaiveDate,
    ) -> Self {
        use chrono::Datelike;

        let now = Utc::now();
        Self {
            id: QuoteId::new_v7(),
            house_code: house_code.into(),
            resident_email: None,
            description: description.into(),
            amount,
            due_date,
            status: QuoteStatus::Pending,
            paid_date: None,
            payment_reference: None,
            payment_data: JsonMap::new(),
            period_month: Some(due_date.month()),
            period_year: due_date.year(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_resident_email(mut self, email: impl Into<String>) -> Self {
        self.resident_email = Some(email.into());
        self
    }

    pub fn is_payable(&self) -> bool {
        matches!(self.status, QuoteStatus::Pending | QuoteStatus::Overdue)
    }

    /// Pending and past its due date
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == QuoteStatus::Pending && self.due_date < today
    }

    /// Checks that a new payment may be started for this quote
    pub fn ensure_payable(&self) -> Result<(), PaymentError> {
        match self.status {
            QuoteStatus::Pending | QuoteStatus::Overdue => Ok(()),
            QuoteStatus::Paid => Err(PaymentError::validation(format!(
                "Quote {} is already paid",
                self.id
            ))),
            QuoteStatus::Cancelled => Err(PaymentError::validation(format!(
                "Quote {} is cancelled",
                self.id
            ))),
        }
    }

    /// Records the approved payment on the quote
    ///
    /// Refused when the quote is already PAID, so a second approval never
    /// credits it twice, and when it has been CANCELLED.
    pub fn mark_paid(
        &mut self,
        transaction_id: &str,
        external_id: Option<&str>,
        gateway: Option<&str>,
        confirmed_at: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        match self.status {
            QuoteStatus::Paid => {
                return Err(PaymentError::validation(format!(
                    "Quote {} is already paid",
                    self.id
                )))
            }
            QuoteStatus::Cancelled => {
                return Err(PaymentError::validation(format!(
                    "Quote {} is cancelled",
                    self.id
                )))
            }
            QuoteStatus::Pending | QuoteStatus::Overdue => {}
        }

        let mut data = JsonMap::new();
        data.insert("transaction_id".into(), json!(transaction_id));
        data.insert("external_id".into(), json!(external_id));
        data.insert("gateway".into(), json!(gateway));
        data.insert("confirmed_at".into(), json!(confirmed_at.to_rfc3339()));

        self.status = QuoteStatus::Paid;
        self.paid_date = Some(confirmed_at);
        self.payment_reference = Some(transaction_id.to_string());
        self.payment_data = data;
        self.updated_at = confirmed_at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    fn quote() -> Quote {
        Quote::new(
            "A-101",
            "Gasto común marzo",
            Money::new(dec!(45000), Currency::CLP),
            NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
        )
    }

    #[test]
    fn test_new_quote_is_pending_and_payable() {
        let q = quote();
        assert_eq!(q.status, QuoteStatus::Pending);
        assert!(q.is_payable());
        assert_eq!(q.period_month, Some(3));
        assert_eq!(q.period_year, 2026);
    }

    #[test]
    fn test_is_overdue() {
        let q = quote();
        assert!(!q.is_overdue(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()));
        assert!(q.is_overdue(NaiveDate::from_ymd_opt(2026, 3, 11).unwrap()));
    }

    #[test]
    fn test_mark_paid_records_payment_data() {
        let mut q = quote();
        let at = Utc::now();
        q.mark_paid("MP_1", Some("98765"), Some("mercadopago"), at).unwrap();

        assert_eq!(q.status, QuoteStatus::Paid);
        assert_eq!(q.paid_date, Some(at));
        assert_eq!(q.payment_reference.as_deref(), Some("MP_1"));
        assert_eq!(q.payment_data["transaction_id"], json!("MP_1"));
        assert_eq!(q.payment_data["external_id"], json!("98765"));
        assert_eq!(q.payment_data["gateway"], json!("mercadopago"));
        assert!(!q.is_payable());
    }

    #[test]
    fn test_mark_paid_twice_is_refused() {
        let mut q = quote();
        q.mark_paid("MP_1", None, None, Utc::now()).unwrap();
        let second = q.mark_paid("MP_2", None, None, Utc::now());
        assert!(matches!(second, Err(PaymentError::Validation(_))));
        assert_eq!(q.payment_reference.as_deref(), Some("MP_1"));
    }

    #[test]
    fn test_mark_paid_refuses_cancelled_quote() {
        let mut q = quote();
        q.status = QuoteStatus::Cancelled;
        let result = q.mark_paid("MP_1", None, Some("mercadopago"), Utc::now());
        assert!(matches!(result, Err(PaymentError::Validation(_))));
        assert_eq!(q.status, QuoteStatus::Cancelled);
        assert!(q.paid_date.is_none());
        assert!(q.payment_reference.is_none());
    }

    #[test]
    fn test_cancelled_quote_not_payable() {
        let mut q = quote();
        q.status = QuoteStatus::Cancelled;
        assert!(matches!(q.ensure_payable(), Err(PaymentError::Validation(_))));
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            QuoteStatus::Pending,
            QuoteStatus::Paid,
            QuoteStatus::Overdue,
            QuoteStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<QuoteStatus>().unwrap(), status);
        }
    }
}
