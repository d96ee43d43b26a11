//! Transaction handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};

use domain_payments::{TransactionFilter, TransactionStatus};

use crate::dto::payments::*;
use crate::{error::ApiError, AppState};

/// Lists transactions, oldest first
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<TransactionResponse>>, ApiError> {
    let filter = TransactionFilter {
        quote_id: query.quote_id.map(Into::into),
        status: query
            .status
            .as_deref()
            .map(str::parse::<TransactionStatus>)
            .transpose()?,
    };

    let transactions = state.service.list_transactions(filter).await?;
    Ok(Json(transactions.into_iter().map(Into::into).collect()))
}

/// Gets a transaction by its public id (e.g. `MP_...`)
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let transaction = state.service.get_transaction(&transaction_id).await?;
    Ok(Json(transaction.into()))
}
