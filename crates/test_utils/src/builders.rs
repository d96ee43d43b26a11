//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else. Free-text fields default to `fake` values.

use chrono::{DateTime, NaiveDate, Utc};
use core_kernel::Money;
use domain_payments::{
    PaymentGateway, PaymentMethod, PaymentTransaction, Quote, QuoteStatus, TransactionStatus,
};
use fake::faker::address::en::BuildingNumber;
use fake::faker::internet::en::SafeEmail;
use fake::faker::lorem::en::Sentence;
use fake::Fake;

use crate::fixtures::{CatalogFixtures, MoneyFixtures, TemporalFixtures};

/// Builder for quotes
pub struct TestQuoteBuilder {
    house_code: String,
    description: String,
    resident_email: Option<String>,
    amount: Money,
    due_date: NaiveDate,
    status: QuoteStatus,
}

impl Default for TestQuoteBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestQuoteBuilder {
    /// Creates a new builder with default values
    pub fn new() -> Self {
        let number: String = BuildingNumber().fake();
        Self {
            house_code: format!("H-{}", number),
            description: Sentence(2..5).fake(),
            resident_email: Some(SafeEmail().fake()),
            amount: MoneyFixtures::clp_500(),
            due_date: TemporalFixtures::future_due_date(),
            status: QuoteStatus::Pending,
        }
    }

    pub fn with_house_code(mut self, code: impl Into<String>) -> Self {
        self.house_code = code.into();
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = due_date;
        self
    }

    pub fn with_status(mut self, status: QuoteStatus) -> Self {
        self.status = status;
        self
    }

    pub fn without_resident_email(mut self) -> Self {
        self.resident_email = None;
        self
    }

    pub fn build(self) -> Quote {
        let mut quote = Quote::new(self.house_code, self.description, self.amount, self.due_date);
        quote.resident_email = self.resident_email;
        quote.status = self.status;
        quote
    }
}

/// Builder for payment transactions in any status
pub struct TestTransactionBuilder {
    quote: Quote,
    method: PaymentMethod,
    gateway: Option<PaymentGateway>,
    status: TransactionStatus,
    external_id: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl Default for TestTransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTransactionBuilder {
    /// Pending MercadoPago card transaction for a fresh quote
    pub fn new() -> Self {
        Self {
            quote: TestQuoteBuilder::new().build(),
            method: CatalogFixtures::card_method(),
            gateway: Some(CatalogFixtures::mercadopago_gateway()),
            status: TransactionStatus::Pending,
            external_id: None,
            expires_at: None,
        }
    }

    pub fn for_quote(mut self, quote: &Quote) -> Self {
        self.quote = quote.clone();
        self
    }

    pub fn with_method(mut self, method: &PaymentMethod) -> Self {
        self.method = method.clone();
        self
    }

    pub fn with_gateway(mut self, gateway: Option<&PaymentGateway>) -> Self {
        self.gateway = gateway.cloned();
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn build(self) -> PaymentTransaction {
        let mut tx = PaymentTransaction::new(
            &self.quote,
            &self.method,
            self.gateway.as_ref(),
            self.expires_at,
        );
        if let Some(external_id) = &self.external_id {
            tx.assign_external_id(external_id);
        }
        let now = Utc::now();
        match self.status {
            TransactionStatus::Pending => {}
            TransactionStatus::Approved => {
                tx.approve(now).unwrap();
            }
            TransactionStatus::Rejected => {
                tx.reject("test rejection", now).unwrap();
            }
        }
        tx
    }
}
