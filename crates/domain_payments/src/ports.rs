//! Payments Domain Ports
//!
//! `PaymentStore` is everything the payment service needs from persistence:
//! the quote view, the method and gateway catalogs, and the transaction
//! ledger. Implementations:
//!
//! - **Internal Adapter**: PostgreSQL (`infra_db::PostgresPaymentStore`)
//! - **Mock Adapter**: in-memory, behind the `mock` feature
//!
//! # Transitions
//!
//! A status change is committed through [`PaymentStore::commit_transition`],
//! which must apply it only while the stored row is still `pending` and, for
//! approvals, flip the quote to PAID in the same unit of work. A writer that
//! loses a race gets [`TransitionResult::AlreadyFinal`] back instead of an
//! error.

use async_trait::async_trait;

use core_kernel::{
    DomainPort, HealthCheckable, PaymentGatewayId, PaymentMethodId, PortError, QuoteId,
};

use crate::gateway::{GatewayType, PaymentGateway};
use crate::method::PaymentMethod;
use crate::quote::Quote;
use crate::transaction::{PaymentTransaction, TransactionStatus};

/// Filter for listing transactions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub quote_id: Option<QuoteId>,
    pub status: Option<TransactionStatus>,
}

impl TransactionFilter {
    pub fn for_quote(quote_id: QuoteId) -> Self {
        Self {
            quote_id: Some(quote_id),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, tx: &PaymentTransaction) -> bool {
        self.quote_id.map_or(true, |q| tx.quote_id == q)
            && self.status.map_or(true, |s| tx.status == s)
    }
}

/// Outcome of a conditional status update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    Applied {
        /// False when the quote was already PAID by another transaction
        quote_marked_paid: bool,
    },
    /// The row had already left `pending`; carries the stored status
    AlreadyFinal(TransactionStatus),
}

#[async_trait]
pub trait PaymentStore: DomainPort + HealthCheckable {
    // ========================================================================
    // Quotes
    // ========================================================================

    async fn get_quote(&self, id: QuoteId) -> Result<Quote, PortError>;

    // ========================================================================
    // Payment methods
    // ========================================================================

    async fn get_payment_method(&self, id: PaymentMethodId) -> Result<PaymentMethod, PortError>;

    /// Methods ordered by name
    async fn list_payment_methods(&self, active_only: bool) -> Result<Vec<PaymentMethod>, PortError>;

    async fn find_payment_method_by_name(
        &self,
        name: &str,
    ) -> Result<Option<PaymentMethod>, PortError>;

    /// Fails with `Conflict` if the name is taken
    async fn insert_payment_method(&self, method: &PaymentMethod) -> Result<(), PortError>;

    /// Overwrites the stored method with the same id
    ///
    /// Fails with `NotFound` for an unknown id and `Conflict` if the new name
    /// belongs to another method.
    async fn update_payment_method(&self, method: &PaymentMethod) -> Result<(), PortError>;

    /// Number of transactions still `pending` under this method
    async fn count_pending_for_method(&self, id: PaymentMethodId) -> Result<u64, PortError>;

    // ========================================================================
    // Gateways
    // ========================================================================

    async fn get_gateway(&self, id: PaymentGatewayId) -> Result<PaymentGateway, PortError>;

    /// Gateways ordered by name, optionally restricted to one type
    async fn list_gateways(
        &self,
        gateway_type: Option<GatewayType>,
        active_only: bool,
    ) -> Result<Vec<PaymentGateway>, PortError>;

    async fn find_gateway_by_name(&self, name: &str) -> Result<Option<PaymentGateway>, PortError>;

    /// Fails with `Conflict` if another gateway of the same type is active
    async fn insert_gateway(&self, gateway: &PaymentGateway) -> Result<(), PortError>;

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Fails with `Conflict` on a duplicate `transaction_id`
    async fn insert_transaction(&self, transaction: &PaymentTransaction) -> Result<(), PortError>;

    async fn find_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, PortError>;

    async fn find_transaction_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<PaymentTransaction>, PortError>;

    /// Matching transactions ordered by creation time, oldest first
    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<PaymentTransaction>, PortError>;

    /// Persists details, external id and last response of a pending row
    ///
    /// Returns false if the row is no longer pending (nothing written).
    async fn update_pending(&self, transaction: &PaymentTransaction) -> Result<bool, PortError>;

    /// Commits an approval or rejection computed on `transaction`
    ///
    /// `paid_quote` is the quote already marked paid in memory; it is written
    /// only if the transition applies and the stored quote is not yet PAID.
    async fn commit_transition(
        &self,
        transaction: &PaymentTransaction,
        paid_quote: Option<&Quote>,
    ) -> Result<TransitionResult, PortError>;
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use chrono::Utc;
    use core_kernel::{AdapterHealth, HealthCheckResult};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use crate::quote::QuoteStatus;

    #[derive(Debug, Default)]
    struct State {
        quotes: HashMap<QuoteId, Quote>,
        methods: HashMap<PaymentMethodId, PaymentMethod>,
        gateways: HashMap<PaymentGatewayId, PaymentGateway>,
        /// Insertion order doubles as creation order
        transactions: Vec<PaymentTransaction>,
        quote_paid_writes: usize,
    }

    /// In-memory mock implementation of PaymentStore
    ///
    /// All state sits behind one lock so conditional updates behave like
    /// the database's single-row checks.
    #[derive(Debug, Default, Clone)]
    pub struct MockPaymentStore {
        state: Arc<RwLock<State>>,
    }

    impl MockPaymentStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn insert_quote(&self, quote: Quote) {
            self.state.write().await.quotes.insert(quote.id, quote);
        }

        pub async fn quote(&self, id: QuoteId) -> Option<Quote> {
            self.state.read().await.quotes.get(&id).cloned()
        }

        pub async fn transactions(&self) -> Vec<PaymentTransaction> {
            self.state.read().await.transactions.clone()
        }

        /// Number of times a quote row was flipped to PAID
        pub async fn quote_paid_writes(&self) -> usize {
            self.state.read().await.quote_paid_writes
        }
    }

    impl DomainPort for MockPaymentStore {}

    #[async_trait]
    impl HealthCheckable for MockPaymentStore {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult {
                adapter_id: "mock-payment-store".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms: 0,
                message: Some("Mock adapter always healthy".to_string()),
                checked_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl PaymentStore for MockPaymentStore {
        async fn get_quote(&self, id: QuoteId) -> Result<Quote, PortError> {
            self.state
                .read()
                .await
                .quotes
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Quote", id))
        }

        async fn get_payment_method(&self, id: PaymentMethodId) -> Result<PaymentMethod, PortError> {
            self.state
                .read()
                .await
                .methods
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("PaymentMethod", id))
        }

        async fn list_payment_methods(&self, active_only: bool) -> Result<Vec<PaymentMethod>, PortError> {
            let state = self.state.read().await;
            let mut methods: Vec<_> = state
                .methods
                .values()
                .filter(|m| !active_only || m.is_active)
                .cloned()
                .collect();
            methods.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(methods)
        }

        async fn find_payment_method_by_name(
            &self,
            name: &str,
        ) -> Result<Option<PaymentMethod>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .methods
                .values()
                .find(|m| m.name == name)
                .cloned())
        }

        async fn insert_payment_method(&self, method: &PaymentMethod) -> Result<(), PortError> {
            let mut state = self.state.write().await;
            if state.methods.values().any(|m| m.name == method.name) {
                return Err(PortError::conflict(format!(
                    "Payment method '{}' already exists",
                    method.name
                )));
            }
            state.methods.insert(method.id, method.clone());
            Ok(())
        }

        async fn update_payment_method(&self, method: &PaymentMethod) -> Result<(), PortError> {
            let mut state = self.state.write().await;
            if !state.methods.contains_key(&method.id) {
                return Err(PortError::not_found("PaymentMethod", method.id));
            }
            if state
                .methods
                .values()
                .any(|m| m.id != method.id && m.name == method.name)
            {
                return Err(PortError::conflict(format!(
                    "Payment method '{}' already exists",
                    method.name
                )));
            }
            state.methods.insert(method.id, method.clone());
            Ok(())
        }

        async fn count_pending_for_method(&self, id: PaymentMethodId) -> Result<u64, PortError> {
            let state = self.state.read().await;
            Ok(state
                .transactions
                .iter()
                .filter(|t| t.payment_method_id == id && t.status == TransactionStatus::Pending)
                .count() as u64)
        }

        async fn get_gateway(&self, id: PaymentGatewayId) -> Result<PaymentGateway, PortError> {
            self.state
                .read()
                .await
                .gateways
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("PaymentGateway", id))
        }

        async fn list_gateways(
            &self,
            gateway_type: Option<GatewayType>,
            active_only: bool,
        ) -> Result<Vec<PaymentGateway>, PortError> {
            let state = self.state.read().await;
            let mut gateways: Vec<_> = state
                .gateways
                .values()
                .filter(|g| gateway_type.map_or(true, |t| g.gateway_type == t))
                .filter(|g| !active_only || g.is_active)
                .cloned()
                .collect();
            gateways.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(gateways)
        }

        async fn find_gateway_by_name(&self, name: &str) -> Result<Option<PaymentGateway>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .gateways
                .values()
                .find(|g| g.name == name)
                .cloned())
        }

        async fn insert_gateway(&self, gateway: &PaymentGateway) -> Result<(), PortError> {
            let mut state = self.state.write().await;
            if gateway.is_active
                && state
                    .gateways
                    .values()
                    .any(|g| g.is_active && g.gateway_type == gateway.gateway_type)
            {
                return Err(PortError::conflict(format!(
                    "An active {} gateway already exists",
                    gateway.gateway_type
                )));
            }
            state.gateways.insert(gateway.id, gateway.clone());
            Ok(())
        }

        async fn insert_transaction(&self, transaction: &PaymentTransaction) -> Result<(), PortError> {
            let mut state = self.state.write().await;
            if state
                .transactions
                .iter()
                .any(|t| t.transaction_id == transaction.transaction_id)
            {
                return Err(PortError::conflict(format!(
                    "Duplicate transaction_id {}",
                    transaction.transaction_id
                )));
            }
            state.transactions.push(transaction.clone());
            Ok(())
        }

        async fn find_transaction(
            &self,
            transaction_id: &str,
        ) -> Result<Option<PaymentTransaction>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .transactions
                .iter()
                .find(|t| t.transaction_id == transaction_id)
                .cloned())
        }

        async fn find_transaction_by_external_id(
            &self,
            external_id: &str,
        ) -> Result<Option<PaymentTransaction>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .transactions
                .iter()
                .find(|t| t.external_id.as_deref() == Some(external_id))
                .cloned())
        }

        async fn list_transactions(
            &self,
            filter: &TransactionFilter,
        ) -> Result<Vec<PaymentTransaction>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .transactions
                .iter()
                .filter(|t| filter.matches(t))
                .cloned()
                .collect())
        }

        async fn update_pending(&self, transaction: &PaymentTransaction) -> Result<bool, PortError> {
            let mut state = self.state.write().await;
            let stored = state
                .transactions
                .iter_mut()
                .find(|t| t.transaction_id == transaction.transaction_id)
                .ok_or_else(|| PortError::not_found("PaymentTransaction", &transaction.transaction_id))?;

            if stored.status != TransactionStatus::Pending {
                return Ok(false);
            }
            if stored.external_id.is_none() {
                stored.external_id = transaction.external_id.clone();
            }
            stored.payment_details = transaction.payment_details.clone();
            stored.gateway_response = transaction.gateway_response.clone();
            stored.processed_at = transaction.processed_at;
            stored.updated_at = transaction.updated_at;
            Ok(true)
        }

        async fn commit_transition(
            &self,
            transaction: &PaymentTransaction,
            paid_quote: Option<&Quote>,
        ) -> Result<TransitionResult, PortError> {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            let stored = state
                .transactions
                .iter_mut()
                .find(|t| t.transaction_id == transaction.transaction_id)
                .ok_or_else(|| PortError::not_found("PaymentTransaction", &transaction.transaction_id))?;

            if stored.status != TransactionStatus::Pending {
                return Ok(TransitionResult::AlreadyFinal(stored.status));
            }

            let external_id = stored.external_id.clone().or_else(|| transaction.external_id.clone());
            *stored = PaymentTransaction {
                external_id,
                ..transaction.clone()
            };

            let mut quote_marked_paid = false;
            if let Some(quote) = paid_quote {
                if let Some(stored_quote) = state.quotes.get_mut(&quote.id) {
                    if !matches!(stored_quote.status, QuoteStatus::Paid | QuoteStatus::Cancelled) {
                        *stored_quote = quote.clone();
                        state.quote_paid_writes += 1;
                        quote_marked_paid = true;
                    }
                }
            }

            Ok(TransitionResult::Applied { quote_marked_paid })
        }
    }
}
