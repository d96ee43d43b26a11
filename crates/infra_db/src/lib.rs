//! Infrastructure Database Layer
//!
//! This crate provides the PostgreSQL persistence for the condominium
//! payments system using SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern: [`repositories`] holds row types
//! and SQL, [`adapters`] implements the domain's `PaymentStore` port on top of
//! them and translates [`DatabaseError`] into `PortError`.
//!
//! # Transitions
//!
//! Transaction status changes are conditional updates
//! (`WHERE status = 'pending'`) committed in the same database transaction as
//! the quote update (`WHERE status NOT IN ('PAID', 'CANCELLED')`), so concurrent webhook
//! deliveries settle a payment at most once.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresPaymentStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/condominium")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresPaymentStore::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, run_migrations, DatabaseConfig};
pub use error::DatabaseError;
pub use repositories::PaymentRepository;
pub use adapters::PostgresPaymentStore;
