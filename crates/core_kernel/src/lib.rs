//! Core Kernel - Foundational types for the condominium payments system
//!
//! This crate provides the building blocks shared by every other crate:
//! - Money types with precise decimal arithmetic
//! - Strongly-typed identifiers
//! - Port infrastructure (errors, health checks) for hexagonal adapters

pub mod money;
pub mod identifiers;
pub mod ports;

pub use money::{Money, Currency, MoneyError};
pub use identifiers::{QuoteId, PaymentMethodId, PaymentGatewayId, PaymentTransactionId};
pub use ports::{PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth};
