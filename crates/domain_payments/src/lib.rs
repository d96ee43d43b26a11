//! Condominium Payments Domain
//!
//! This crate owns the life of a payment against a quote (a monthly fee
//! owed by one house):
//!
//! - **Catalog**: payment methods (cash, bank transfer, card, wallet) and
//!   gateway records holding provider configuration
//! - **Checkout**: hosted payment links created through a [`GatewayAdapter`]
//!   (MercadoPago preferences, Stripe Checkout Sessions)
//! - **Webhooks**: signed provider callbacks that approve or reject the
//!   pending transaction they reference
//! - **Manual verification**: cash and bank transfers approved by an
//!   administrator
//!
//! # Transaction Lifecycle
//!
//! ```text
//!            ┌──────────► approved ──► quote PAID
//!  pending ──┤
//!            └──────────► rejected
//! ```
//!
//! Both targets are terminal. Repeated webhooks for a terminal transaction
//! are acknowledged and change nothing.
//!
//! # Examples
//!
//! ```rust
//! use domain_payments::{PaymentMethod, PaymentTransaction, Quote, TransactionStatus};
//! use core_kernel::{Currency, Money};
//! use rust_decimal_macros::dec;
//! use chrono::{NaiveDate, Utc};
//!
//! let quote = Quote::new(
//!     "A-101",
//!     "Gasto común marzo",
//!     Money::new(dec!(45000), Currency::CLP),
//!     NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
//! );
//! let cash = PaymentMethod::new("Efectivo", "Pago en efectivo", false, true);
//!
//! let mut tx = PaymentTransaction::new(&quote, &cash, None, None);
//! assert!(tx.transaction_id.starts_with("CASH_"));
//!
//! tx.approve(Utc::now()).unwrap();
//! assert_eq!(tx.status, TransactionStatus::Approved);
//! assert!(tx.approve(Utc::now()).is_err());
//! ```

pub mod adapters;
pub mod catalog;
pub mod error;
pub mod gateway;
pub mod method;
pub mod ports;
pub mod quote;
pub mod service;
pub mod transaction;
pub mod webhook;

pub use adapters::{
    CheckoutRequest, CheckoutSession, GatewayAdapter, GatewayRegistry,
    MercadoPagoAdapter, MercadoPagoConfig, StripeAdapter, StripeConfig,
};
#[cfg(any(test, feature = "mock"))]
pub use adapters::mock::MockGatewayAdapter;
pub use catalog::BootstrapReport;
pub use error::PaymentError;
pub use gateway::{GatewayType, JsonMap, PaymentGateway, PublicGateway};
pub use method::{PaymentMethod, PaymentMethodChanges};
pub use ports::{PaymentStore, TransactionFilter, TransitionResult};
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::MockPaymentStore;
pub use quote::{Quote, QuoteStatus};
pub use service::{
    BankTransferInstructions, CreateLinkRequest, ManualPaymentRequest, ManualVerification,
    PaymentLink, PaymentService, PaymentServiceConfig,
};
pub use transaction::{PaymentTransaction, TransactionStatus};
pub use webhook::{
    GatewayNotification, NotificationOutcome, ReportedAmount, WebhookOutcome, WebhookRequest,
};
