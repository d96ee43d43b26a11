//! Payments repository implementation
//!
//! Row-level access to quotes, the payment catalog and the transaction
//! ledger. Status transitions are conditional updates committed together
//! with the quote update in one database transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DatabaseError;

pub type JsonObject = Map<String, Value>;

// ============================================================================
// ROW TYPES
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct QuoteRow {
    pub quote_id: Uuid,
    pub house_code: String,
    pub resident_email: Option<String>,
    pub description: String,
    pub amount_due: Decimal,
    pub currency: String,
    pub due_date: NaiveDate,
    pub status: String,
    pub paid_date: Option<DateTime<Utc>>,
    pub payment_reference: Option<String>,
    pub payment_data: Json<JsonObject>,
    pub period_month: Option<i32>,
    pub period_year: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentMethodRow {
    pub method_id: Uuid,
    pub name: String,
    pub description: String,
    pub requires_gateway: bool,
    pub manual_verification: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentGatewayRow {
    pub gateway_id: Uuid,
    pub name: String,
    pub gateway_type: String,
    pub config_data: Json<JsonObject>,
    pub bank_info: Json<JsonObject>,
    pub is_test_mode: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentTransactionRow {
    pub id: Uuid,
    pub quote_id: Uuid,
    pub payment_gateway_id: Option<Uuid>,
    pub payment_method_id: Uuid,
    pub transaction_id: String,
    pub external_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub gateway_response: Json<JsonObject>,
    pub payment_details: Json<JsonObject>,
    pub expires_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a conditional status update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied { quote_marked_paid: bool },
    /// The row had already left `pending`; carries the stored status
    AlreadyFinal(String),
}

const QUOTE_COLUMNS: &str = r#"
    quote_id, house_code, resident_email, description, amount_due, currency,
    due_date, status, paid_date, payment_reference, payment_data,
    period_month, period_year, created_at, updated_at
"#;

const METHOD_COLUMNS: &str = r#"
    method_id, name, description, requires_gateway, manual_verification,
    is_active, created_at, updated_at
"#;

const GATEWAY_COLUMNS: &str = r#"
    gateway_id, name, gateway_type, config_data, bank_info, is_test_mode,
    is_active, created_at, updated_at
"#;

const TRANSACTION_COLUMNS: &str = r#"
    id, quote_id, payment_gateway_id, payment_method_id, transaction_id,
    external_id, amount, currency, status, gateway_response, payment_details,
    expires_at, processed_at, confirmed_at, created_at, updated_at
"#;

/// Repository for the payment tables
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ========================================================================
    // Quotes
    // ========================================================================

    pub async fn get_quote(&self, quote_id: Uuid) -> Result<QuoteRow, DatabaseError> {
        sqlx::query_as::<_, QuoteRow>(&format!(
            "SELECT {} FROM quotes WHERE quote_id = $1",
            QUOTE_COLUMNS
        ))
        .bind(quote_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Quote", quote_id))
    }

    /// Inserts a quote; quotes are owned by billing, this exists for seeding
    pub async fn insert_quote(&self, row: &QuoteRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO quotes (
                quote_id, house_code, resident_email, description, amount_due,
                currency, due_date, status, paid_date, payment_reference,
                payment_data, period_month, period_year, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(row.quote_id)
        .bind(&row.house_code)
        .bind(&row.resident_email)
        .bind(&row.description)
        .bind(row.amount_due)
        .bind(&row.currency)
        .bind(row.due_date)
        .bind(&row.status)
        .bind(row.paid_date)
        .bind(&row.payment_reference)
        .bind(&row.payment_data)
        .bind(row.period_month)
        .bind(row.period_year)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Payment methods
    // ========================================================================

    pub async fn get_method(&self, method_id: Uuid) -> Result<PaymentMethodRow, DatabaseError> {
        sqlx::query_as::<_, PaymentMethodRow>(&format!(
            "SELECT {} FROM payment_methods WHERE method_id = $1",
            METHOD_COLUMNS
        ))
        .bind(method_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("PaymentMethod", method_id))
    }

    pub async fn list_methods(&self, active_only: bool) -> Result<Vec<PaymentMethodRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, PaymentMethodRow>(&format!(
            "SELECT {} FROM payment_methods WHERE (NOT $1 OR is_active) ORDER BY name",
            METHOD_COLUMNS
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn find_method_by_name(&self, name: &str) -> Result<Option<PaymentMethodRow>, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentMethodRow>(&format!(
            "SELECT {} FROM payment_methods WHERE name = $1",
            METHOD_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn insert_method(&self, row: &PaymentMethodRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO payment_methods (
                method_id, name, description, requires_gateway,
                manual_verification, is_active, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(row.method_id)
        .bind(&row.name)
        .bind(&row.description)
        .bind(row.requires_gateway)
        .bind(row.manual_verification)
        .bind(row.is_active)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns false when no row has this id
    pub async fn update_method(&self, row: &PaymentMethodRow) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_methods
            SET name = $2,
                description = $3,
                requires_gateway = $4,
                manual_verification = $5,
                is_active = $6,
                updated_at = $7
            WHERE method_id = $1
            "#,
        )
        .bind(row.method_id)
        .bind(&row.name)
        .bind(&row.description)
        .bind(row.requires_gateway)
        .bind(row.manual_verification)
        .bind(row.is_active)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_pending_for_method(&self, method_id: Uuid) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM payment_transactions WHERE payment_method_id = $1 AND status = 'pending'",
        )
        .bind(method_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // ========================================================================
    // Gateways
    // ========================================================================

    pub async fn get_gateway(&self, gateway_id: Uuid) -> Result<PaymentGatewayRow, DatabaseError> {
        sqlx::query_as::<_, PaymentGatewayRow>(&format!(
            "SELECT {} FROM payment_gateways WHERE gateway_id = $1",
            GATEWAY_COLUMNS
        ))
        .bind(gateway_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("PaymentGateway", gateway_id))
    }

    pub async fn list_gateways(
        &self,
        gateway_type: Option<&str>,
        active_only: bool,
    ) -> Result<Vec<PaymentGatewayRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, PaymentGatewayRow>(&format!(
            r#"
            SELECT {} FROM payment_gateways
            WHERE ($1::text IS NULL OR gateway_type = $1)
              AND (NOT $2 OR is_active)
            ORDER BY name
            "#,
            GATEWAY_COLUMNS
        ))
        .bind(gateway_type)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn find_gateway_by_name(&self, name: &str) -> Result<Option<PaymentGatewayRow>, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentGatewayRow>(&format!(
            "SELECT {} FROM payment_gateways WHERE name = $1",
            GATEWAY_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Fails with `DuplicateEntry` on a taken name or a second active row
    /// of the same type
    pub async fn insert_gateway(&self, row: &PaymentGatewayRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO payment_gateways (
                gateway_id, name, gateway_type, config_data, bank_info,
                is_test_mode, is_active, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(row.gateway_id)
        .bind(&row.name)
        .bind(&row.gateway_type)
        .bind(&row.config_data)
        .bind(&row.bank_info)
        .bind(row.is_test_mode)
        .bind(row.is_active)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    pub async fn insert_transaction(&self, row: &PaymentTransactionRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                id, quote_id, payment_gateway_id, payment_method_id, transaction_id,
                external_id, amount, currency, status, gateway_response,
                payment_details, expires_at, processed_at, confirmed_at,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(row.id)
        .bind(row.quote_id)
        .bind(row.payment_gateway_id)
        .bind(row.payment_method_id)
        .bind(&row.transaction_id)
        .bind(&row.external_id)
        .bind(row.amount)
        .bind(&row.currency)
        .bind(&row.status)
        .bind(&row.gateway_response)
        .bind(&row.payment_details)
        .bind(row.expires_at)
        .bind(row.processed_at)
        .bind(row.confirmed_at)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentTransactionRow>, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentTransactionRow>(&format!(
            "SELECT {} FROM payment_transactions WHERE transaction_id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Oldest transaction carrying the provider id
    pub async fn find_transaction_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<PaymentTransactionRow>, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentTransactionRow>(&format!(
            r#"
            SELECT {} FROM payment_transactions
            WHERE external_id = $1
            ORDER BY created_at, id
            LIMIT 1
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_transactions(
        &self,
        quote_id: Option<Uuid>,
        status: Option<&str>,
    ) -> Result<Vec<PaymentTransactionRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, PaymentTransactionRow>(&format!(
            r#"
            SELECT {} FROM payment_transactions
            WHERE ($1::uuid IS NULL OR quote_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at, id
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(quote_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Writes the mutable columns of a row that is still pending
    ///
    /// Returns false when the row has already left `pending`.
    pub async fn update_pending(&self, row: &PaymentTransactionRow) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET external_id = COALESCE(external_id, $2),
                gateway_response = $3,
                payment_details = $4,
                processed_at = $5,
                updated_at = $6
            WHERE transaction_id = $1 AND status = 'pending'
            "#,
        )
        .bind(&row.transaction_id)
        .bind(&row.external_id)
        .bind(&row.gateway_response)
        .bind(&row.payment_details)
        .bind(row.processed_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a settled row from a missing one
            self.status_of(&row.transaction_id).await?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Applies a terminal status and, for approvals, the quote payment
    ///
    /// Both updates are conditional: the transaction must still be pending
    /// and the quote must not be PAID yet. They share one database
    /// transaction, so a quote is never paid for a transaction that lost
    /// the race.
    pub async fn commit_transition(
        &self,
        row: &PaymentTransactionRow,
        paid_quote: Option<&QuoteRow>,
    ) -> Result<CommitOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = $2,
                external_id = COALESCE(external_id, $3),
                gateway_response = $4,
                payment_details = $5,
                processed_at = $6,
                confirmed_at = $7,
                updated_at = $8
            WHERE transaction_id = $1 AND status = 'pending'
            "#,
        )
        .bind(&row.transaction_id)
        .bind(&row.status)
        .bind(&row.external_id)
        .bind(&row.gateway_response)
        .bind(&row.payment_details)
        .bind(row.processed_at)
        .bind(row.confirmed_at)
        .bind(row.updated_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            let status = self.status_of(&row.transaction_id).await?;
            return Ok(CommitOutcome::AlreadyFinal(status));
        }

        let mut quote_marked_paid = false;
        if let Some(quote) = paid_quote {
            let paid = sqlx::query(
                r#"
                UPDATE quotes
                SET status = 'PAID',
                    paid_date = $2,
                    payment_reference = $3,
                    payment_data = $4,
                    updated_at = $5
                WHERE quote_id = $1 AND status NOT IN ('PAID', 'CANCELLED')
                "#,
            )
            .bind(quote.quote_id)
            .bind(quote.paid_date)
            .bind(&quote.payment_reference)
            .bind(&quote.payment_data)
            .bind(quote.updated_at)
            .execute(&mut *tx)
            .await?;
            quote_marked_paid = paid.rows_affected() > 0;
        }

        tx.commit().await?;
        Ok(CommitOutcome::Applied { quote_marked_paid })
    }

    async fn status_of(&self, transaction_id: &str) -> Result<String, DatabaseError> {
        sqlx::query_scalar::<_, String>(
            "SELECT status FROM payment_transactions WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("PaymentTransaction", transaction_id))
    }
}
