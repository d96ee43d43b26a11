//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for common entities across the payments
//! system. These fixtures are consistent and predictable for unit tests.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use core_kernel::{Currency, Money};
use domain_payments::{catalog, GatewayType, PaymentGateway, PaymentMethod, PaymentStore};
use rust_decimal_macros::dec;
use serde_json::json;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// The 500 CLP fee used across lifecycle tests
    pub fn clp_500() -> Money {
        Money::new(dec!(500), Currency::CLP)
    }

    /// A typical monthly common expense
    pub fn clp_monthly_fee() -> Money {
        Money::new(dec!(45000), Currency::CLP)
    }

    /// A two-decimal currency amount
    pub fn usd_100() -> Money {
        Money::new(dec!(100.00), Currency::USD)
    }

    pub fn clp_zero() -> Money {
        Money::zero(Currency::CLP)
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Due date far enough ahead that links never fall back to the TTL
    pub fn future_due_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2099, 12, 31).unwrap()
    }

    /// Due date already in the past
    pub fn past_due_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 10).unwrap()
    }

    /// Fixed timestamp for deterministic signatures
    pub fn webhook_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 14, 30, 0).unwrap()
    }
}

/// Fixture for string test data
pub struct StringFixtures;

impl StringFixtures {
    pub fn house_code() -> &'static str {
        "Q123"
    }

    pub fn payer_email() -> &'static str {
        "resident@example.com"
    }

    pub fn admin_email() -> &'static str {
        "admin@example.com"
    }

    /// Shared token for `MockGatewayAdapter` callbacks
    pub fn mock_webhook_token() -> &'static str {
        "mock-webhook-token"
    }

    pub fn webhook_secret() -> &'static str {
        "whsec_test_secret"
    }
}

/// Fixture for catalog records
pub struct CatalogFixtures;

impl CatalogFixtures {
    pub fn card_method() -> PaymentMethod {
        PaymentMethod::new(catalog::CARD, "Tarjeta", true, false)
    }

    pub fn cash_method() -> PaymentMethod {
        PaymentMethod::new(catalog::CASH, "Efectivo", false, true)
    }

    pub fn bank_transfer_method() -> PaymentMethod {
        PaymentMethod::new(catalog::BANK_TRANSFER, "Transferencia", true, true)
    }

    /// Active MercadoPago gateway with test credentials
    pub fn mercadopago_gateway() -> PaymentGateway {
        PaymentGateway::new("MercadoPago", GatewayType::MercadoPago)
            .with_config("access_token", "TEST-access-token")
            .with_config("public_key", "TEST-public-key")
            .with_config("webhook_secret", StringFixtures::webhook_secret())
    }

    /// Active Stripe gateway with test credentials
    pub fn stripe_gateway() -> PaymentGateway {
        PaymentGateway::new("Stripe", GatewayType::Stripe)
            .with_config("secret_key", "sk_test_123")
            .with_config("publishable_key", "pk_test_123")
            .with_config("webhook_secret", StringFixtures::webhook_secret())
            .with_config("success_url", "https://condo.example.com/pagos/ok")
    }

    /// Active bank transfer gateway with account details
    pub fn bank_gateway() -> PaymentGateway {
        let bank_info = json!({
            "bank_name": "Banco Nacional",
            "account_number": "123-456-789",
            "account_type": "Cuenta Corriente",
            "holder_name": "Condominio Los Álamos",
        });
        let bank_info = bank_info.as_object().cloned().unwrap_or_default();
        PaymentGateway::new("Banco Condominio", GatewayType::BankTransfer)
            .with_config("instructions", "Enviar comprobante por email")
            .with_bank_info(bank_info)
    }

    /// Stores the three methods and the MercadoPago and bank gateways
    pub async fn seed(store: &dyn PaymentStore) {
        for method in [Self::card_method(), Self::cash_method(), Self::bank_transfer_method()] {
            store.insert_payment_method(&method).await.unwrap();
        }
        store.insert_gateway(&Self::mercadopago_gateway()).await.unwrap();
        store.insert_gateway(&Self::bank_gateway()).await.unwrap();
    }
}
