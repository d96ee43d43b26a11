//! Repository implementations
//!
//! Repositories encapsulate SQL and map between database rows and plain row
//! structs. Queries are built at runtime with `sqlx::query_as` and
//! `FromRow` rows, so the crate builds without a live database.

pub mod payments;

pub use payments::PaymentRepository;
