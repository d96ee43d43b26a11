//! PostgreSQL Payment Store
//!
//! Internal (database) adapter for the payments domain, implementing
//! `PaymentStore` on top of [`PaymentRepository`].
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresPaymentStore;
//! use domain_payments::{PaymentService, GatewayRegistry};
//! use std::sync::Arc;
//!
//! let store = Arc::new(PostgresPaymentStore::new(pool));
//! let service = PaymentService::new(store, GatewayRegistry::new());
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, instrument, warn};

use core_kernel::{
    AdapterHealth, Currency, DomainPort, HealthCheckResult, HealthCheckable, Money,
    PaymentGatewayId, PaymentMethodId, PaymentTransactionId, PortError, QuoteId,
};
use domain_payments::{
    GatewayType, PaymentGateway, PaymentMethod, PaymentStore, PaymentTransaction, Quote,
    QuoteStatus, TransactionFilter, TransactionStatus, TransitionResult,
};

use crate::error::DatabaseError;
use crate::repositories::payments::{
    CommitOutcome, PaymentGatewayRow, PaymentMethodRow, PaymentRepository,
    PaymentTransactionRow, QuoteRow,
};

const ADAPTER_ID: &str = "postgres-payment-store";

/// PostgreSQL-backed implementation of `PaymentStore`
///
/// Database errors are translated to `PortError` (unique violations become
/// `Conflict`). Rows that cannot be mapped back to domain types surface as
/// `PortError::Internal`.
#[derive(Debug, Clone)]
pub struct PostgresPaymentStore {
    repository: PaymentRepository,
}

impl PostgresPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: PaymentRepository::new(pool),
        }
    }

    pub fn repository(&self) -> &PaymentRepository {
        &self.repository
    }

    /// Stores a quote; used for seeding and tests
    pub async fn insert_quote(&self, quote: &Quote) -> Result<(), PortError> {
        self.repository.insert_quote(&quote_to_row(quote)).await?;
        Ok(())
    }
}

impl DomainPort for PostgresPaymentStore {}

#[async_trait]
impl HealthCheckable for PostgresPaymentStore {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(self.repository.pool())
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Healthy,
                latency_ms,
                message: None,
                checked_at: Utc::now(),
            },
            Err(e) => HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Unhealthy,
                latency_ms,
                message: Some(format!("Database error: {}", e)),
                checked_at: Utc::now(),
            },
        }
    }
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    #[instrument(skip(self), fields(quote_id = %id))]
    async fn get_quote(&self, id: QuoteId) -> Result<Quote, PortError> {
        let row = self.repository.get_quote(*id.as_uuid()).await?;
        row_to_quote(row)
    }

    async fn get_payment_method(&self, id: PaymentMethodId) -> Result<PaymentMethod, PortError> {
        let row = self.repository.get_method(*id.as_uuid()).await?;
        Ok(row_to_method(row))
    }

    async fn list_payment_methods(&self, active_only: bool) -> Result<Vec<PaymentMethod>, PortError> {
        let rows = self.repository.list_methods(active_only).await?;
        Ok(rows.into_iter().map(row_to_method).collect())
    }

    async fn find_payment_method_by_name(
        &self,
        name: &str,
    ) -> Result<Option<PaymentMethod>, PortError> {
        Ok(self.repository.find_method_by_name(name).await?.map(row_to_method))
    }

    #[instrument(skip(self, method), fields(name = %method.name))]
    async fn insert_payment_method(&self, method: &PaymentMethod) -> Result<(), PortError> {
        self.repository.insert_method(&method_to_row(method)).await?;
        debug!("Payment method stored");
        Ok(())
    }

    #[instrument(skip(self, method), fields(method_id = %method.id))]
    async fn update_payment_method(&self, method: &PaymentMethod) -> Result<(), PortError> {
        if !self.repository.update_method(&method_to_row(method)).await? {
            return Err(PortError::not_found("PaymentMethod", method.id));
        }
        debug!(is_active = method.is_active, "Payment method updated");
        Ok(())
    }

    async fn count_pending_for_method(&self, id: PaymentMethodId) -> Result<u64, PortError> {
        let count = self.repository.count_pending_for_method(*id.as_uuid()).await?;
        Ok(count.max(0) as u64)
    }

    async fn get_gateway(&self, id: PaymentGatewayId) -> Result<PaymentGateway, PortError> {
        let row = self.repository.get_gateway(*id.as_uuid()).await?;
        row_to_gateway(row)
    }

    async fn list_gateways(
        &self,
        gateway_type: Option<GatewayType>,
        active_only: bool,
    ) -> Result<Vec<PaymentGateway>, PortError> {
        let rows = self
            .repository
            .list_gateways(gateway_type.map(|t| t.as_str()), active_only)
            .await?;
        rows.into_iter().map(row_to_gateway).collect()
    }

    async fn find_gateway_by_name(&self, name: &str) -> Result<Option<PaymentGateway>, PortError> {
        self.repository
            .find_gateway_by_name(name)
            .await?
            .map(row_to_gateway)
            .transpose()
    }

    #[instrument(skip(self, gateway), fields(name = %gateway.name, gateway_type = %gateway.gateway_type))]
    async fn insert_gateway(&self, gateway: &PaymentGateway) -> Result<(), PortError> {
        self.repository.insert_gateway(&gateway_to_row(gateway)).await?;
        debug!("Payment gateway stored");
        Ok(())
    }

    #[instrument(skip(self, transaction), fields(transaction_id = %transaction.transaction_id))]
    async fn insert_transaction(&self, transaction: &PaymentTransaction) -> Result<(), PortError> {
        self.repository
            .insert_transaction(&transaction_to_row(transaction))
            .await?;
        debug!("Payment transaction stored");
        Ok(())
    }

    async fn find_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, PortError> {
        self.repository
            .find_transaction(transaction_id)
            .await?
            .map(row_to_transaction)
            .transpose()
    }

    async fn find_transaction_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<PaymentTransaction>, PortError> {
        self.repository
            .find_transaction_by_external_id(external_id)
            .await?
            .map(row_to_transaction)
            .transpose()
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<PaymentTransaction>, PortError> {
        let rows = self
            .repository
            .list_transactions(
                filter.quote_id.map(|id| *id.as_uuid()),
                filter.status.map(|s| s.as_str()),
            )
            .await?;
        rows.into_iter().map(row_to_transaction).collect()
    }

    #[instrument(skip(self, transaction), fields(transaction_id = %transaction.transaction_id))]
    async fn update_pending(&self, transaction: &PaymentTransaction) -> Result<bool, PortError> {
        let written = self
            .repository
            .update_pending(&transaction_to_row(transaction))
            .await?;
        if !written {
            debug!("Transaction no longer pending; update skipped");
        }
        Ok(written)
    }

    #[instrument(
        skip(self, transaction, paid_quote),
        fields(transaction_id = %transaction.transaction_id, status = %transaction.status)
    )]
    async fn commit_transition(
        &self,
        transaction: &PaymentTransaction,
        paid_quote: Option<&Quote>,
    ) -> Result<TransitionResult, PortError> {
        let quote_row = paid_quote.map(quote_to_row);
        let outcome = self
            .repository
            .commit_transition(&transaction_to_row(transaction), quote_row.as_ref())
            .await?;

        match outcome {
            CommitOutcome::Applied { quote_marked_paid } => {
                Ok(TransitionResult::Applied { quote_marked_paid })
            }
            CommitOutcome::AlreadyFinal(status) => {
                warn!(stored_status = %status, "Transition lost to a concurrent writer");
                let status = status
                    .parse::<TransactionStatus>()
                    .map_err(|e| decode_error("status", e))?;
                Ok(TransitionResult::AlreadyFinal(status))
            }
        }
    }
}

// ============================================================================
// Row conversions
// ============================================================================

fn decode_error(column: &str, error: impl std::fmt::Display) -> PortError {
    DatabaseError::serialization(format!("Invalid value in column {}: {}", column, error)).into()
}

fn parse_currency(code: &str) -> Result<Currency, PortError> {
    code.parse::<Currency>().map_err(|e| decode_error("currency", e))
}

fn row_to_quote(row: QuoteRow) -> Result<Quote, PortError> {
    let currency = parse_currency(&row.currency)?;
    let status = row
        .status
        .parse::<QuoteStatus>()
        .map_err(|e| decode_error("quotes.status", e))?;

    Ok(Quote {
        id: QuoteId::from_uuid(row.quote_id),
        house_code: row.house_code,
        resident_email: row.resident_email,
        description: row.description,
        amount: Money::new(row.amount_due, currency),
        due_date: row.due_date,
        status,
        paid_date: row.paid_date,
        payment_reference: row.payment_reference,
        payment_data: row.payment_data.0,
        period_month: row.period_month.and_then(|m| u32::try_from(m).ok()),
        period_year: row.period_year,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn quote_to_row(quote: &Quote) -> QuoteRow {
    QuoteRow {
        quote_id: *quote.id.as_uuid(),
        house_code: quote.house_code.clone(),
        resident_email: quote.resident_email.clone(),
        description: quote.description.clone(),
        amount_due: quote.amount.amount(),
        currency: quote.amount.currency().code().to_string(),
        due_date: quote.due_date,
        status: quote.status.as_str().to_string(),
        paid_date: quote.paid_date,
        payment_reference: quote.payment_reference.clone(),
        payment_data: Json(quote.payment_data.clone()),
        period_month: quote.period_month.and_then(|m| i32::try_from(m).ok()),
        period_year: quote.period_year,
        created_at: quote.created_at,
        updated_at: quote.updated_at,
    }
}

fn row_to_method(row: PaymentMethodRow) -> PaymentMethod {
    PaymentMethod {
        id: PaymentMethodId::from_uuid(row.method_id),
        name: row.name,
        description: row.description,
        requires_gateway: row.requires_gateway,
        manual_verification: row.manual_verification,
        is_active: row.is_active,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn method_to_row(method: &PaymentMethod) -> PaymentMethodRow {
    PaymentMethodRow {
        method_id: *method.id.as_uuid(),
        name: method.name.clone(),
        description: method.description.clone(),
        requires_gateway: method.requires_gateway,
        manual_verification: method.manual_verification,
        is_active: method.is_active,
        created_at: method.created_at,
        updated_at: method.updated_at,
    }
}

fn row_to_gateway(row: PaymentGatewayRow) -> Result<PaymentGateway, PortError> {
    let gateway_type = row
        .gateway_type
        .parse::<GatewayType>()
        .map_err(|e| decode_error("gateway_type", e))?;

    Ok(PaymentGateway {
        id: PaymentGatewayId::from_uuid(row.gateway_id),
        name: row.name,
        gateway_type,
        config_data: row.config_data.0,
        bank_info: row.bank_info.0,
        is_test_mode: row.is_test_mode,
        is_active: row.is_active,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn gateway_to_row(gateway: &PaymentGateway) -> PaymentGatewayRow {
    PaymentGatewayRow {
        gateway_id: *gateway.id.as_uuid(),
        name: gateway.name.clone(),
        gateway_type: gateway.gateway_type.as_str().to_string(),
        config_data: Json(gateway.config_data.clone()),
        bank_info: Json(gateway.bank_info.clone()),
        is_test_mode: gateway.is_test_mode,
        is_active: gateway.is_active,
        created_at: gateway.created_at,
        updated_at: gateway.updated_at,
    }
}

fn row_to_transaction(row: PaymentTransactionRow) -> Result<PaymentTransaction, PortError> {
    let currency = parse_currency(&row.currency)?;
    let status = row
        .status
        .parse::<TransactionStatus>()
        .map_err(|e| decode_error("payment_transactions.status", e))?;

    Ok(PaymentTransaction {
        id: PaymentTransactionId::from_uuid(row.id),
        quote_id: QuoteId::from_uuid(row.quote_id),
        payment_gateway_id: row.payment_gateway_id.map(PaymentGatewayId::from_uuid),
        payment_method_id: PaymentMethodId::from_uuid(row.payment_method_id),
        transaction_id: row.transaction_id,
        external_id: row.external_id,
        amount: Money::new(row.amount, currency),
        status,
        gateway_response: row.gateway_response.0,
        payment_details: row.payment_details.0,
        expires_at: row.expires_at,
        processed_at: row.processed_at,
        confirmed_at: row.confirmed_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn transaction_to_row(tx: &PaymentTransaction) -> PaymentTransactionRow {
    PaymentTransactionRow {
        id: *tx.id.as_uuid(),
        quote_id: *tx.quote_id.as_uuid(),
        payment_gateway_id: tx.payment_gateway_id.map(|id| *id.as_uuid()),
        payment_method_id: *tx.payment_method_id.as_uuid(),
        transaction_id: tx.transaction_id.clone(),
        external_id: tx.external_id.clone(),
        amount: tx.amount.amount(),
        currency: tx.amount.currency().code().to_string(),
        status: tx.status.as_str().to_string(),
        gateway_response: Json(tx.gateway_response.clone()),
        payment_details: Json(tx.payment_details.clone()),
        expires_at: tx.expires_at,
        processed_at: tx.processed_at,
        confirmed_at: tx.confirmed_at,
        created_at: tx.created_at,
        updated_at: tx.updated_at,
    }
}
