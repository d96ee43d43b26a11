//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for payment types that give
//! more meaningful error messages than standard assertions.

use core_kernel::Money;
use domain_payments::{
    PaymentTransaction, Quote, QuoteStatus, TransactionStatus, WebhookOutcome,
};

/// Asserts that two Money values are equal in amount and currency
pub fn assert_money_eq(actual: &Money, expected: &Money) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );
    assert_eq!(
        actual.amount(),
        expected.amount(),
        "Amount mismatch: actual={}, expected={}",
        actual,
        expected
    );
}

/// Asserts a transaction's status
pub fn assert_transaction_status(tx: &PaymentTransaction, expected: TransactionStatus) {
    assert_eq!(
        tx.status, expected,
        "Transaction {} is {}, expected {}",
        tx.transaction_id, tx.status, expected
    );
}

/// Asserts a transaction is still pending and carries a payment detail
pub fn assert_pending_with_detail(tx: &PaymentTransaction, key: &str) {
    assert_transaction_status(tx, TransactionStatus::Pending);
    assert!(
        tx.payment_details.contains_key(key),
        "Transaction {} has no '{}' in payment_details: {:?}",
        tx.transaction_id,
        key,
        tx.payment_details.keys().collect::<Vec<_>>()
    );
}

/// Asserts a quote was paid by the given transaction
pub fn assert_quote_paid_by(quote: &Quote, transaction_id: &str) {
    assert_eq!(
        quote.status,
        QuoteStatus::Paid,
        "Quote {} is {}, expected PAID",
        quote.id,
        quote.status.as_str()
    );
    assert_eq!(
        quote.payment_reference.as_deref(),
        Some(transaction_id),
        "Quote {} paid by {:?}, expected {}",
        quote.id,
        quote.payment_reference,
        transaction_id
    );
    assert!(quote.paid_date.is_some(), "Quote {} has no paid_date", quote.id);
}

/// Asserts a quote has not been paid
pub fn assert_quote_unpaid(quote: &Quote) {
    assert_ne!(
        quote.status,
        QuoteStatus::Paid,
        "Quote {} unexpectedly PAID by {:?}",
        quote.id,
        quote.payment_reference
    );
}

/// Asserts the label of a webhook outcome (`processed`, `replayed`, ...)
pub fn assert_webhook_outcome(outcome: &WebhookOutcome, expected_label: &str) {
    assert_eq!(
        outcome.label(),
        expected_label,
        "Unexpected webhook outcome: {:?}",
        outcome
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{TestQuoteBuilder, TestTransactionBuilder};
    use crate::fixtures::MoneyFixtures;
    use chrono::Utc;

    #[test]
    fn test_assert_money_eq_passes() {
        assert_money_eq(&MoneyFixtures::clp_500(), &MoneyFixtures::clp_500());
    }

    #[test]
    #[should_panic(expected = "Currency mismatch")]
    fn test_assert_money_eq_fails_on_currency() {
        assert_money_eq(&MoneyFixtures::clp_500(), &MoneyFixtures::usd_100());
    }

    #[test]
    fn test_assert_quote_paid_by() {
        let mut quote = TestQuoteBuilder::new().build();
        assert_quote_unpaid(&quote);
        quote.mark_paid("MP_1", Some("ext"), Some("mercadopago"), Utc::now()).unwrap();
        assert_quote_paid_by(&quote, "MP_1");
    }

    #[test]
    #[should_panic(expected = "has no 'creation_error'")]
    fn test_assert_pending_with_detail_fails_without_key() {
        let tx = TestTransactionBuilder::new().build();
        assert_pending_with_detail(&tx, "creation_error");
    }
}
